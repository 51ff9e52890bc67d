//! Per-user read markers.
//!
//! A read item has both a marker at `readstatus:<user>:<item key>` and an entry
//! in the user's reference list at `readstatus:<user>`. Both are always
//! written in the same transaction.

use crate::app::{ErrorCollector, NanorssError, Result};
use crate::store::index::ReferenceList;
use crate::store::keys;
use crate::store::tx::Transaction;
use crate::store::{index, Database};

impl Database {
    pub fn get_read_status(&self, username: &str, item_key: &[u8]) -> Result<bool> {
        Ok(self
            .kv
            .get(&keys::read_status_key(username, item_key))?
            .is_some())
    }

    /// Keys of every item `username` has read, in the order they were read.
    pub fn get_read_items(&self, username: &str) -> Result<Vec<Vec<u8>>> {
        let raw = self.kv.get(&keys::read_status_index_key(username))?;
        Ok(ReferenceList::decode(raw.as_deref())?.into_vec())
    }

    /// Marks `item_key` read or unread for `username`. Fails with
    /// [`NanorssError::NotFound`] when the user does not exist.
    pub fn set_read_status(&self, username: &str, item_key: &[u8], read: bool) -> Result<()> {
        let user_key = keys::user_key(username);
        let lock_keys = [user_key.clone(), keys::read_status_index_key(username)];

        self.in_transaction(&lock_keys, |tx| {
            if !tx.contains(&user_key)? {
                return Err(NanorssError::NotFound(format!("user {}", username)));
            }
            stage_read_status(tx, username, item_key, read)
        })
    }

    /// Applies [`Database::set_read_status`] for every user. Users renamed or
    /// removed during the pass are skipped.
    pub fn set_read_status_for_all(&self, item_key: &[u8], read: bool) -> Result<()> {
        let mut errors = ErrorCollector::new();
        for username in self.usernames()? {
            match self.set_read_status(&username, item_key, read) {
                Err(NanorssError::NotFound(_)) => {}
                result => {
                    errors.record(result);
                }
            }
        }
        errors.finish()
    }

    pub(crate) fn usernames(&self) -> Result<Vec<String>> {
        let raw = self.kv.get(keys::USERS_INDEX)?;
        ReferenceList::decode(raw.as_deref())?
            .into_vec()
            .into_iter()
            .map(|name| String::from_utf8(name).map_err(|e| NanorssError::InvalidKey(e.to_string())))
            .collect()
    }
}

/// Stages the marker and list entry for one item. The caller must hold the
/// user's read-status list key.
pub(crate) fn stage_read_status(
    tx: &mut Transaction<'_>,
    username: &str,
    item_key: &[u8],
    read: bool,
) -> Result<()> {
    let list_key = keys::read_status_index_key(username);
    let marker = keys::read_status_key(username, item_key);
    if read {
        if !tx.contains(&marker)? {
            tx.put(marker, Vec::new());
        }
        index::add(tx, &list_key, item_key)
    } else {
        if tx.contains(&marker)? {
            tx.delete(marker);
        }
        index::remove(tx, &list_key, item_key)
    }
}
