use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::timestamp;

/// Identity of a feed item: the feed it came from and its GUID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeeditemKey {
    pub feed_url: String,
    pub guid: String,
}

impl FeeditemKey {
    pub fn new(feed_url: impl Into<String>, guid: impl Into<String>) -> Self {
        Self {
            feed_url: feed_url.into(),
            guid: guid.into(),
        }
    }
}

/// A feed entry as last observed by the fetcher.
///
/// `key` is derived from the store key on read and is never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feeditem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(
        default,
        serialize_with = "timestamp::serialize",
        deserialize_with = "timestamp::deserialize_fixed"
    )]
    pub date: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub contents: String,
    #[serde(
        default,
        serialize_with = "timestamp::serialize",
        deserialize_with = "timestamp::deserialize"
    )]
    pub updated: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub key: FeeditemKey,
}

impl Feeditem {
    pub fn new(key: FeeditemKey) -> Self {
        Self {
            key,
            ..Default::default()
        }
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "(Untitled)"
        } else {
            &self.title
        }
    }

    /// Whether the user-visible part of the item differs from `other`.
    pub fn same_content(&self, other: &Feeditem) -> bool {
        self.title == other.title && self.url == other.url && self.contents == other.contents
    }
}
