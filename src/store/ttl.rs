//! Last-seen bookkeeping and expiry of items nobody fetches anymore.

use chrono::{DateTime, Utc};

use crate::app::{ErrorCollector, NanorssError, Result};
use crate::domain::timestamp;
use crate::domain::{FeeditemKey, FetchStatus};
use crate::store::keys;
use crate::store::tx::Transaction;
use crate::store::{index, read_status, Database};

/// Counts of records removed by one [`Database::gc`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    pub expired_items: usize,
    pub stale_fetch_statuses: usize,
    pub stale_read_statuses: usize,
}

impl Database {
    pub fn get_last_seen(&self, subject: &[u8]) -> Result<Option<DateTime<Utc>>> {
        match self.kv.get(&keys::last_seen_key(subject))? {
            Some(raw) => parse_last_seen(&raw),
            None => Ok(None),
        }
    }

    /// Records that `subject` was just observed at its source.
    pub fn set_last_seen(&self, subject: &[u8]) -> Result<()> {
        let now = self.now();
        self.in_transaction(&[keys::last_seen_key(subject)], |tx| {
            self.touch_last_seen(tx, subject, now)
        })
    }

    /// Stages a last-seen write unless the stored stamp is younger than the
    /// skip window. The caller must hold the last-seen key.
    pub(crate) fn touch_last_seen(
        &self,
        tx: &mut Transaction<'_>,
        subject: &[u8],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let key = keys::last_seen_key(subject);
        let previous = match tx.get(&key)? {
            Some(raw) => parse_last_seen(&raw).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable last-seen stamp: {}", e);
                None
            }),
            None => None,
        };

        if let Some(previous) = previous {
            if now < previous + self.config.skip_update_ttl() {
                return Ok(());
            }
        }
        tx.put(key, timestamp::format(&Some(now)).into_bytes());
        Ok(())
    }

    /// Deletes feed items and pages whose last-seen stamp is missing or at
    /// least `item_ttl` old. Returns how many were deleted.
    pub fn delete_expired_items(&self) -> Result<usize> {
        let cutoff = self.now() - self.config.item_ttl;
        let mut errors = ErrorCollector::new();
        let mut deleted = 0;

        for namespace in [keys::FEEDITEM, keys::PAGEMONITOR] {
            let subjects = self.kv.keys_with_prefix(&keys::namespace(namespace))?;
            for subject in subjects {
                if let Some(true) = errors.record(self.expire_item(&subject, cutoff)) {
                    deleted += 1;
                }
            }
        }

        if deleted > 0 {
            tracing::info!("Deleted {} expired items", deleted);
        }
        errors.finish()?;
        Ok(deleted)
    }

    fn expire_item(&self, subject: &[u8], cutoff: DateTime<Utc>) -> Result<bool> {
        let last_seen_key = keys::last_seen_key(subject);
        let feed_index = if subject.starts_with(&keys::namespace(keys::FEEDITEM)) {
            let key = FeeditemKey::decode(subject)?;
            Some(keys::feed_key(&key.feed_url))
        } else {
            None
        };

        let mut lock_keys = vec![subject.to_vec(), last_seen_key.clone()];
        lock_keys.extend(feed_index.clone());

        self.in_transaction(&lock_keys, |tx| {
            if !tx.contains(subject)? {
                return Ok(false);
            }
            let last_seen = match tx.get(&last_seen_key)? {
                Some(raw) => parse_last_seen(&raw).unwrap_or(None),
                None => None,
            };
            if matches!(last_seen, Some(seen) if seen > cutoff) {
                return Ok(false);
            }

            tracing::debug!("Expiring {}", String::from_utf8_lossy(subject));
            tx.delete(subject.to_vec());
            tx.delete(last_seen_key.clone());
            if let Some(feed_index) = &feed_index {
                index::remove(tx, feed_index, subject)?;
            }
            Ok(true)
        })
    }

    /// Deletes fetch statuses with no activity within `item_ttl`.
    pub fn delete_stale_fetch_statuses(&self) -> Result<usize> {
        let cutoff = self.now() - self.config.item_ttl;
        let mut errors = ErrorCollector::new();
        let mut deleted = 0;

        let status_keys = self
            .kv
            .keys_with_prefix(&keys::namespace(keys::FETCH_STATUS))?;
        for key in status_keys {
            let result = self.in_transaction(&[key.clone()], |tx| {
                let Some(raw) = tx.get(&key)? else {
                    return Ok(false);
                };
                let status: FetchStatus = serde_json::from_slice(&raw)?;
                match status.last_activity() {
                    Some(activity) if activity >= cutoff => Ok(false),
                    _ => {
                        tx.delete(key.clone());
                        Ok(true)
                    }
                }
            });
            if let Some(true) = errors.record(result) {
                deleted += 1;
            }
        }

        if deleted > 0 {
            tracing::info!("Deleted {} stale fetch statuses", deleted);
        }
        errors.finish()?;
        Ok(deleted)
    }

    /// Clears read markers that point at items which no longer exist.
    pub fn delete_stale_read_statuses(&self) -> Result<usize> {
        let mut errors = ErrorCollector::new();
        let mut deleted = 0;

        for username in self.usernames()? {
            let Some(read_items) = errors.record(self.get_read_items(&username)) else {
                continue;
            };
            for item_key in read_items {
                let result = self.delete_stale_read_status(&username, &item_key);
                if let Some(true) = errors.record(result) {
                    deleted += 1;
                }
            }
        }

        if deleted > 0 {
            tracing::info!("Deleted {} stale read statuses", deleted);
        }
        errors.finish()?;
        Ok(deleted)
    }

    /// Clears one marker if its item is gone. The item key is locked with the
    /// user's list so a concurrent save of the item keeps the marker.
    fn delete_stale_read_status(&self, username: &str, item_key: &[u8]) -> Result<bool> {
        let user_key = keys::user_key(username);
        let lock_keys = [
            item_key.to_vec(),
            user_key.clone(),
            keys::read_status_index_key(username),
        ];

        self.in_transaction(&lock_keys, |tx| {
            if tx.contains(item_key)? || !tx.contains(&user_key)? {
                return Ok(false);
            }
            read_status::stage_read_status(tx, username, item_key, false)?;
            Ok(true)
        })
    }

    /// Runs every cleanup pass, even when an earlier one fails.
    pub fn gc(&self) -> Result<GcReport> {
        let mut errors = ErrorCollector::new();
        let report = GcReport {
            expired_items: errors.record(self.delete_expired_items()).unwrap_or(0),
            stale_fetch_statuses: errors.record(self.delete_stale_fetch_statuses()).unwrap_or(0),
            stale_read_statuses: errors.record(self.delete_stale_read_statuses()).unwrap_or(0),
        };
        errors.finish()?;
        Ok(report)
    }
}

fn parse_last_seen(raw: &[u8]) -> Result<Option<DateTime<Utc>>> {
    let text = std::str::from_utf8(raw).map_err(|e| NanorssError::Invalid(e.to_string()))?;
    let parsed = timestamp::parse(text).map_err(|e| NanorssError::Invalid(e.to_string()))?;
    Ok(parsed.map(|dt| dt.with_timezone(&Utc)))
}
