use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use similar::TextDiff;

use crate::domain::timestamp;

/// A page watch configured in a user's pagemonitor document.
///
/// `(url, match_pattern, replace_pattern)` is the identity; the title is
/// display-only and is not part of the key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UserPagemonitor {
    pub url: String,
    pub match_pattern: String,
    pub replace_pattern: String,
    pub title: String,
}

impl UserPagemonitor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.url
        } else {
            &self.title
        }
    }

    pub fn same_identity(&self, other: &UserPagemonitor) -> bool {
        self.url == other.url
            && self.match_pattern == other.match_pattern
            && self.replace_pattern == other.replace_pattern
    }
}

/// The filtered text of a monitored page and the diff of its last change.
///
/// `config` is derived from the store key on read and is never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PagemonitorPage {
    #[serde(default)]
    pub contents: String,
    #[serde(default)]
    pub delta: String,
    #[serde(
        default,
        serialize_with = "timestamp::serialize",
        deserialize_with = "timestamp::deserialize"
    )]
    pub updated: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub config: UserPagemonitor,
}

impl PagemonitorPage {
    pub fn new(config: UserPagemonitor) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn same_content(&self, other: &PagemonitorPage) -> bool {
        self.contents == other.contents && self.delta == other.delta && self.updated == other.updated
    }

    /// Replaces the contents, recording the diff from the old text and the
    /// update time.
    pub fn record_change(&mut self, contents: String, now: DateTime<Utc>) {
        self.delta = unified_diff(&self.contents, &contents);
        self.contents = contents;
        self.updated = Some(now);
    }
}

pub fn unified_diff(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut unified = diff.unified_diff();
    unified.context_radius(3).header("previous", "current");
    unified.to_string()
}
