//! Bijective mapping between logical keys and store keys.
//!
//! A store key is a namespace followed by `:`-separated components. Variable
//! components are percent-encoded so they never contain the separator. Keys
//! that embed another key as a suffix (fetch status, last seen, read status)
//! append the embedded key verbatim.

use std::borrow::Cow;

use crate::app::{NanorssError, Result};
use crate::domain::{FeeditemKey, UserPagemonitor};

pub const SEPARATOR: char = ':';

pub const USER: &str = "user";
pub const FEEDITEM: &str = "feeditem";
pub const PAGEMONITOR: &str = "pagemonitor";
pub const FEED: &str = "feed";
pub const FETCH_STATUS: &str = "fetchstatus";
pub const LAST_SEEN: &str = "lastseen";
pub const READ_STATUS: &str = "readstatus";
pub const SERVER_CONFIG: &str = "serverconfig";
pub const TX: &str = "tx";

/// Reference list of every username.
pub const USERS_INDEX: &[u8] = b"user";

/// `<namespace>:`, the scan prefix of a namespace.
pub fn namespace(name: &str) -> Vec<u8> {
    let mut key = name.as_bytes().to_vec();
    key.push(SEPARATOR as u8);
    key
}

fn encode_part(part: &str) -> Cow<'_, str> {
    urlencoding::encode(part)
}

fn decode_part(part: &str) -> Result<String> {
    if part.contains(SEPARATOR) {
        return Err(NanorssError::InvalidKey(format!(
            "unexpected separator in component {:?}",
            part
        )));
    }
    urlencoding::decode(part)
        .map(Cow::into_owned)
        .map_err(|e| NanorssError::InvalidKey(e.to_string()))
}

fn join(name: &str, parts: &[&str]) -> Vec<u8> {
    let mut key = name.to_string();
    for part in parts {
        key.push(SEPARATOR);
        key.push_str(&encode_part(part));
    }
    key.into_bytes()
}

/// Splits `key` into exactly `count` decoded components after `name`.
fn split(key: &[u8], name: &str, count: usize) -> Result<Vec<String>> {
    let text = std::str::from_utf8(key)
        .map_err(|_| NanorssError::InvalidKey(String::from_utf8_lossy(key).into_owned()))?;
    let rest = text
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix(SEPARATOR))
        .ok_or_else(|| NanorssError::InvalidKey(format!("{} is not a {} key", text, name)))?;

    let parts: Vec<&str> = rest.splitn(count, SEPARATOR).collect();
    if parts.len() != count {
        return Err(NanorssError::InvalidKey(format!(
            "{} has {} components, expected {}",
            text,
            parts.len(),
            count
        )));
    }
    parts.into_iter().map(decode_part).collect()
}

fn strip_namespace<'a>(key: &'a [u8], name: &str) -> Result<&'a [u8]> {
    key.strip_prefix(namespace(name).as_slice()).ok_or_else(|| {
        NanorssError::InvalidKey(format!(
            "{} is not a {} key",
            String::from_utf8_lossy(key),
            name
        ))
    })
}

fn with_suffix(name: &str, suffix: &[u8]) -> Vec<u8> {
    let mut key = namespace(name);
    key.extend_from_slice(suffix);
    key
}

pub fn user_key(username: &str) -> Vec<u8> {
    join(USER, &[username])
}

pub fn decode_user_key(key: &[u8]) -> Result<String> {
    Ok(split(key, USER, 1)?.remove(0))
}

impl FeeditemKey {
    pub fn encode(&self) -> Vec<u8> {
        join(FEEDITEM, &[&self.feed_url, &self.guid])
    }

    pub fn decode(key: &[u8]) -> Result<Self> {
        let mut parts = split(key, FEEDITEM, 2)?;
        let guid = parts.remove(1);
        let feed_url = parts.remove(0);
        Ok(Self { feed_url, guid })
    }
}

impl UserPagemonitor {
    pub fn encode_key(&self) -> Vec<u8> {
        join(
            PAGEMONITOR,
            &[&self.url, &self.match_pattern, &self.replace_pattern],
        )
    }

    /// The title is not part of the key and comes back empty.
    pub fn decode_key(key: &[u8]) -> Result<Self> {
        let mut parts = split(key, PAGEMONITOR, 3)?.into_iter();
        Ok(Self {
            url: parts.next().unwrap_or_default(),
            match_pattern: parts.next().unwrap_or_default(),
            replace_pattern: parts.next().unwrap_or_default(),
            title: String::new(),
        })
    }
}

/// Feed index key, also the subject key for a feed's fetch status.
pub fn feed_key(feed_url: &str) -> Vec<u8> {
    join(FEED, &[feed_url])
}

pub fn decode_feed_key(key: &[u8]) -> Result<String> {
    Ok(split(key, FEED, 1)?.remove(0))
}

pub fn fetch_status_key(subject: &[u8]) -> Vec<u8> {
    with_suffix(FETCH_STATUS, subject)
}

pub fn decode_fetch_status_key(key: &[u8]) -> Result<Vec<u8>> {
    strip_namespace(key, FETCH_STATUS).map(<[u8]>::to_vec)
}

pub fn last_seen_key(subject: &[u8]) -> Vec<u8> {
    with_suffix(LAST_SEEN, subject)
}

pub fn decode_last_seen_key(key: &[u8]) -> Result<Vec<u8>> {
    strip_namespace(key, LAST_SEEN).map(<[u8]>::to_vec)
}

/// Reference list of the items `username` has read.
pub fn read_status_index_key(username: &str) -> Vec<u8> {
    join(READ_STATUS, &[username])
}

pub fn read_status_key(username: &str, item_key: &[u8]) -> Vec<u8> {
    let mut key = read_status_index_key(username);
    key.push(SEPARATOR as u8);
    key.extend_from_slice(item_key);
    key
}

pub fn decode_read_status_key(key: &[u8]) -> Result<(String, Vec<u8>)> {
    let rest = strip_namespace(key, READ_STATUS)?;
    let split_at = rest
        .iter()
        .position(|&b| b == SEPARATOR as u8)
        .ok_or_else(|| {
            NanorssError::InvalidKey(format!(
                "{} has no item component",
                String::from_utf8_lossy(key)
            ))
        })?;
    let username = std::str::from_utf8(&rest[..split_at])
        .map_err(|_| NanorssError::InvalidKey(String::from_utf8_lossy(key).into_owned()))?;
    Ok((decode_part(username)?, rest[split_at + 1..].to_vec()))
}

pub fn config_key(name: &str) -> Vec<u8> {
    join(SERVER_CONFIG, &[name])
}

pub fn decode_config_key(key: &[u8]) -> Result<String> {
    Ok(split(key, SERVER_CONFIG, 1)?.remove(0))
}

pub fn tx_key(name: &[u8]) -> Vec<u8> {
    with_suffix(TX, name)
}

/// A subject key that names something a user can read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKey {
    Feeditem(FeeditemKey),
    Page(UserPagemonitor),
}

impl ItemKey {
    pub fn decode(key: &[u8]) -> Result<Self> {
        if key.starts_with(&namespace(FEEDITEM)) {
            FeeditemKey::decode(key).map(ItemKey::Feeditem)
        } else if key.starts_with(&namespace(PAGEMONITOR)) {
            UserPagemonitor::decode_key(key).map(ItemKey::Page)
        } else {
            Err(NanorssError::InvalidKey(format!(
                "{} is not an item key",
                String::from_utf8_lossy(key)
            )))
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            ItemKey::Feeditem(key) => key.encode(),
            ItemKey::Page(config) => config.encode_key(),
        }
    }
}
