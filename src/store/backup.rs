//! Full-image snapshot of the store as human-readable JSON.

use std::collections::{BTreeMap, HashMap};
use std::ops::ControlFlow;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::app::{ErrorCollector, Result};
use crate::domain::timestamp;
use crate::domain::{Feeditem, FeeditemKey, PagemonitorPage, User, UserPagemonitor};
use crate::store::Database;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Backup {
    #[serde(default)]
    pub users: Vec<BackupUser>,
    #[serde(default)]
    pub feeds: Vec<BackupFeeditem>,
    #[serde(default)]
    pub pagemonitor: Vec<BackupPage>,
    #[serde(default)]
    pub server_config: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackupUser {
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub opml: String,
    #[serde(default)]
    pub pagemonitor: String,
    #[serde(default)]
    pub read_items: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackupFeeditem {
    #[serde(rename = "FeedURL")]
    pub feed_url: String,
    #[serde(rename = "GUID")]
    pub guid: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "URL", default)]
    pub url: String,
    #[serde(
        default,
        serialize_with = "timestamp::serialize_utc",
        deserialize_with = "timestamp::deserialize_fixed"
    )]
    pub date: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub contents: String,
    #[serde(
        default,
        serialize_with = "timestamp::serialize_utc",
        deserialize_with = "timestamp::deserialize"
    )]
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackupPage {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "Match", default)]
    pub match_pattern: String,
    #[serde(rename = "Replace", default)]
    pub replace_pattern: String,
    #[serde(default)]
    pub contents: String,
    #[serde(default)]
    pub delta: String,
    #[serde(
        default,
        serialize_with = "timestamp::serialize_utc",
        deserialize_with = "timestamp::deserialize"
    )]
    pub updated: Option<DateTime<Utc>>,
}

impl From<Feeditem> for BackupFeeditem {
    fn from(item: Feeditem) -> Self {
        Self {
            feed_url: item.key.feed_url,
            guid: item.key.guid,
            title: item.title,
            url: item.url,
            date: item.date,
            contents: item.contents,
            updated: item.updated,
        }
    }
}

impl From<BackupFeeditem> for Feeditem {
    fn from(record: BackupFeeditem) -> Self {
        Self {
            title: record.title,
            url: record.url,
            date: record.date,
            contents: record.contents,
            updated: record.updated,
            key: FeeditemKey::new(record.feed_url, record.guid),
        }
    }
}

impl From<PagemonitorPage> for BackupPage {
    fn from(page: PagemonitorPage) -> Self {
        Self {
            url: page.config.url,
            title: page.config.title,
            match_pattern: page.config.match_pattern,
            replace_pattern: page.config.replace_pattern,
            contents: page.contents,
            delta: page.delta,
            updated: page.updated,
        }
    }
}

impl From<BackupPage> for PagemonitorPage {
    fn from(record: BackupPage) -> Self {
        Self {
            contents: record.contents,
            delta: record.delta,
            updated: record.updated,
            config: UserPagemonitor {
                url: record.url,
                match_pattern: record.match_pattern,
                replace_pattern: record.replace_pattern,
                title: record.title,
            },
        }
    }
}

impl Backup {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Database {
    /// Collects every user, item, page and config variable.
    ///
    /// Unreadable records are left out and reported as one aggregate error
    /// after the walk.
    pub fn backup(&self) -> Result<Backup> {
        let mut errors = ErrorCollector::new();
        let mut backup = Backup::default();

        // Titles only live in the users' pagemonitor documents.
        let mut page_titles: HashMap<Vec<u8>, String> = HashMap::new();

        if let Some(users) = errors.record(self.read_all_users()) {
            for user in users {
                if let Ok(pages) = user.pages() {
                    for config in pages {
                        page_titles
                            .entry(config.encode_key())
                            .or_insert(config.title);
                    }
                }
                let Some(read_items) = errors.record(self.get_read_items(&user.username)) else {
                    continue;
                };
                backup.users.push(BackupUser {
                    username: user.username,
                    password: user.password,
                    opml: user.opml,
                    pagemonitor: user.pagemonitor,
                    read_items: read_items
                        .iter()
                        .map(|key| String::from_utf8_lossy(key).into_owned())
                        .collect(),
                });
            }
        }

        errors.record(self.read_all_feeditems(|item| {
            backup.feeds.push(item.into());
            ControlFlow::Continue(())
        }));

        errors.record(self.read_all_pages(|mut page| {
            if let Some(title) = page_titles.get(&page.config.encode_key()) {
                page.config.title = title.clone();
            }
            backup.pagemonitor.push(page.into());
            ControlFlow::Continue(())
        }));

        if let Some(variables) = errors.record(self.get_all_config_variables()) {
            backup.server_config = variables;
        }

        errors.finish()?;
        tracing::info!(
            "Backed up {} users, {} feed items, {} pages",
            backup.users.len(),
            backup.feeds.len(),
            backup.pagemonitor.len()
        );
        Ok(backup)
    }

    /// Loads a snapshot through the regular save operations.
    ///
    /// Not atomic: every record is attempted and failures are reported
    /// together at the end.
    pub fn restore(&self, backup: &Backup) -> Result<()> {
        let mut errors = ErrorCollector::new();

        for (name, value) in &backup.server_config {
            errors.record(self.set_config_variable(name, value));
        }

        for record in &backup.users {
            errors.record(self.restore_user(record));
        }

        for record in &backup.feeds {
            let item = Feeditem::from(record.clone());
            errors.record(self.save_feeditems(std::slice::from_ref(&item)));
        }

        for record in &backup.pagemonitor {
            errors.record(self.save_page(&PagemonitorPage::from(record.clone())));
        }

        tracing::info!(
            "Restored {} users, {} feed items, {} pages ({} failures)",
            backup.users.len(),
            backup.feeds.len(),
            backup.pagemonitor.len(),
            errors.failed()
        );
        errors.finish()
    }

    /// [`Database::backup`] as pretty-printed JSON.
    pub fn backup_json(&self) -> Result<String> {
        self.backup()?.to_json()
    }

    /// Parses `json` and passes it to [`Database::restore`].
    pub fn restore_json(&self, json: &str) -> Result<()> {
        self.restore(&Backup::from_json(json)?)
    }

    fn restore_user(&self, record: &BackupUser) -> Result<()> {
        let mut user = User::new(&record.username)?;
        user.password = record.password.clone();
        user.opml = record.opml.clone();
        user.pagemonitor = record.pagemonitor.clone();
        self.save_user(&mut user)?;

        let mut errors = ErrorCollector::new();
        for item_key in &record.read_items {
            errors.record(self.set_read_status(&user.username, item_key.as_bytes(), true));
        }
        errors.finish()
    }
}
