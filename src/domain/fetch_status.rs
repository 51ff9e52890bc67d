use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::timestamp;

/// Outcome of the latest fetches of a feed or page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchStatus {
    #[serde(
        default,
        serialize_with = "timestamp::serialize",
        deserialize_with = "timestamp::deserialize"
    )]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(
        default,
        serialize_with = "timestamp::serialize",
        deserialize_with = "timestamp::deserialize"
    )]
    pub last_failure: Option<DateTime<Utc>>,
}

impl FetchStatus {
    pub fn success(at: DateTime<Utc>) -> Self {
        Self {
            last_success: Some(at),
            last_failure: None,
        }
    }

    pub fn failure(at: DateTime<Utc>) -> Self {
        Self {
            last_success: None,
            last_failure: Some(at),
        }
    }

    /// Overlays the set instants of `update`; unset ones keep their value.
    pub fn merge(&mut self, update: &FetchStatus) {
        if update.last_success.is_some() {
            self.last_success = update.last_success;
        }
        if update.last_failure.is_some() {
            self.last_failure = update.last_failure;
        }
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_success.max(self.last_failure)
    }

    /// True when the latest attempt succeeded.
    pub fn is_healthy(&self) -> bool {
        match (self.last_success, self.last_failure) {
            (Some(success), Some(failure)) => success >= failure,
            (Some(_), None) => true,
            _ => false,
        }
    }
}
