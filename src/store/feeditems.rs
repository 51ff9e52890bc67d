use std::ops::ControlFlow;

use crate::app::{ErrorCollector, Result};
use crate::domain::{Feeditem, FeeditemKey};
use crate::store::keys;
use crate::store::{index, Database};

impl Database {
    pub fn get_feeditem(&self, key: &FeeditemKey) -> Result<Option<Feeditem>> {
        let item: Option<Feeditem> = self.get_json(&key.encode())?;
        Ok(item.map(|mut item| {
            item.key = key.clone();
            item
        }))
    }

    /// Items of one feed, in the order they were first saved.
    pub fn get_feeditems(&self, feed_url: &str) -> Result<Vec<Feeditem>> {
        let raw = self.kv.get(&keys::feed_key(feed_url))?;
        let item_keys = index::ReferenceList::decode(raw.as_deref())?;

        let mut errors = ErrorCollector::new();
        let mut items = Vec::with_capacity(item_keys.len());
        for item_key in item_keys.iter() {
            let item = FeeditemKey::decode(item_key).and_then(|key| self.get_feeditem(&key));
            if let Some(Some(item)) = errors.record(item) {
                items.push(item);
            }
        }
        errors.finish()?;
        Ok(items)
    }

    /// Saves freshly fetched items in one transaction.
    ///
    /// An item that already exists keeps the UTC offset of its first-seen
    /// date, and keeps its `updated` stamp when title, url and contents are
    /// unchanged. Every item's last-seen stamp is touched, but the item itself
    /// is only rewritten when its serialized form changes.
    pub fn save_feeditems(&self, items: &[Feeditem]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut lock_keys = Vec::with_capacity(items.len() * 3);
        for item in items {
            let key = item.key.encode();
            lock_keys.push(keys::last_seen_key(&key));
            lock_keys.push(key);
            lock_keys.push(keys::feed_key(&item.key.feed_url));
        }

        let now = self.now();
        let written = self.in_transaction(&lock_keys, |tx| {
            let mut written = 0;
            for incoming in items {
                let key = incoming.key.encode();
                let mut item = incoming.clone();

                let previous_raw = tx.get(&key)?;
                let previous = previous_raw.as_deref().and_then(|raw| {
                    serde_json::from_slice::<Feeditem>(raw)
                        .map_err(|e| {
                            tracing::warn!(
                                "Overwriting unreadable item {}: {}",
                                String::from_utf8_lossy(&key),
                                e
                            )
                        })
                        .ok()
                });

                if let Some(previous) = &previous {
                    if let (Some(date), Some(previous_date)) = (item.date, previous.date) {
                        item.date = Some(date.with_timezone(previous_date.offset()));
                    }
                    if item.same_content(previous) {
                        item.updated = previous.updated;
                    }
                }

                self.touch_last_seen(tx, &key, now)?;

                let value = serde_json::to_vec(&item)?;
                if previous_raw.as_deref() != Some(value.as_slice()) {
                    tx.put(key.clone(), value);
                    written += 1;
                }
                index::add(tx, &keys::feed_key(&item.key.feed_url), &key)?;
            }
            Ok(written)
        })?;

        tracing::debug!("Saved {} of {} feed items", written, items.len());
        Ok(())
    }

    /// Visits every stored feed item until `visitor` breaks.
    ///
    /// Records that cannot be decoded are skipped and reported together once
    /// the walk ends.
    pub fn read_all_feeditems<F>(&self, mut visitor: F) -> Result<()>
    where
        F: FnMut(Feeditem) -> ControlFlow<()>,
    {
        let mut errors = ErrorCollector::new();
        for (key, value) in self.kv.scan_prefix(&keys::namespace(keys::FEEDITEM))? {
            let item = FeeditemKey::decode(&key).and_then(|key| {
                let mut item: Feeditem = serde_json::from_slice(&value)?;
                item.key = key;
                Ok(item)
            });
            if let Some(item) = errors.record(item) {
                if visitor(item).is_break() {
                    break;
                }
            }
        }
        errors.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::NanorssError;
    use crate::domain::timestamp;
    use crate::store::testing::{counted_db, start_time};
    use chrono::Duration;

    fn item(feed: &str, guid: &str, title: &str) -> Feeditem {
        let mut item = Feeditem::new(FeeditemKey::new(feed, guid));
        item.title = title.into();
        item.url = format!("{}/{}", feed, guid);
        item
    }

    #[test]
    fn test_save_and_get() {
        let db = Database::in_memory().unwrap();
        db.save_feeditems(&[
            item("http://feed1", "g1", "First"),
            item("http://feed1", "g2", "Second"),
            item("http://feed2", "g1", "Other"),
        ])
        .unwrap();

        let key = FeeditemKey::new("http://feed1", "g2");
        let loaded = db.get_feeditem(&key).unwrap().unwrap();
        assert_eq!(loaded.title, "Second");
        assert_eq!(loaded.key, key);

        let titles: Vec<_> = db
            .get_feeditems("http://feed1")
            .unwrap()
            .into_iter()
            .map(|i| i.title)
            .collect();
        assert_eq!(titles, vec!["First", "Second"]);
        assert_eq!(db.get_feeditems("http://feed2").unwrap().len(), 1);
        assert!(db.get_feeditems("http://feed3").unwrap().is_empty());
    }

    #[test]
    fn test_identical_refetch_skips_primary_write() {
        let (db, kv, clock) = counted_db();
        let mut fetched = item("http://feed1", "g1", "Title");
        fetched.updated = Some(start_time());
        let key = fetched.key.encode();

        db.save_feeditems(&[fetched.clone()]).unwrap();
        assert_eq!(kv.writes_to(&key), 1);
        assert_eq!(kv.writes_to(&keys::last_seen_key(&key)), 1);

        // Within the skip window nothing is written at all.
        kv.reset();
        clock.advance(Duration::hours(1));
        fetched.updated = Some(db.now());
        db.save_feeditems(&[fetched.clone()]).unwrap();
        assert_eq!(kv.writes_to(&key), 0);
        assert_eq!(kv.writes_to(&keys::last_seen_key(&key)), 0);
        assert_eq!(kv.batches.load(std::sync::atomic::Ordering::SeqCst), 0);

        // Past it only the last-seen stamp moves.
        clock.advance(Duration::days(8));
        fetched.updated = Some(db.now());
        db.save_feeditems(&[fetched]).unwrap();
        assert_eq!(kv.writes_to(&key), 0);
        assert_eq!(kv.writes_to(&keys::last_seen_key(&key)), 1);
    }

    #[test]
    fn test_updated_carried_when_content_unchanged() {
        let db = Database::in_memory().unwrap();
        let t0 = start_time();
        let mut fetched = item("http://feed1", "g1", "Title");
        fetched.updated = Some(t0);
        db.save_feeditems(&[fetched.clone()]).unwrap();

        fetched.updated = Some(t0 + Duration::hours(1));
        db.save_feeditems(&[fetched.clone()]).unwrap();
        let loaded = db.get_feeditem(&fetched.key).unwrap().unwrap();
        assert_eq!(loaded.updated, Some(t0));

        fetched.contents = "changed".into();
        fetched.updated = Some(t0 + Duration::hours(2));
        db.save_feeditems(&[fetched.clone()]).unwrap();
        let loaded = db.get_feeditem(&fetched.key).unwrap().unwrap();
        assert_eq!(loaded.updated, Some(t0 + Duration::hours(2)));
        assert_eq!(loaded.contents, "changed");
    }

    #[test]
    fn test_first_seen_timezone_is_kept() {
        let db = Database::in_memory().unwrap();
        let mut fetched = item("http://feed1", "g1", "Title");
        fetched.date = timestamp::parse("2024-03-01T10:00:00+02:00").unwrap();
        db.save_feeditems(&[fetched.clone()]).unwrap();

        fetched.date = timestamp::parse("2024-03-01T08:00:00Z").unwrap();
        db.save_feeditems(&[fetched.clone()]).unwrap();

        let loaded = db.get_feeditem(&fetched.key).unwrap().unwrap();
        let date = loaded.date.unwrap();
        assert_eq!(date.offset().local_minus_utc(), 2 * 3600);
        assert_eq!(date, fetched.date.unwrap());
    }

    #[test]
    fn test_read_all_feeditems_visits_and_stops() {
        let db = Database::in_memory().unwrap();
        db.save_feeditems(&[
            item("http://feed1", "g1", "a"),
            item("http://feed1", "g2", "b"),
            item("http://feed2", "g1", "c"),
        ])
        .unwrap();

        let mut all = Vec::new();
        db.read_all_feeditems(|item| {
            all.push(item.key);
            ControlFlow::Continue(())
        })
        .unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.contains(&FeeditemKey::new("http://feed2", "g1")));

        let mut visited = 0;
        db.read_all_feeditems(|_| {
            visited += 1;
            ControlFlow::Break(())
        })
        .unwrap();
        assert_eq!(visited, 1);
    }

    #[test]
    fn test_read_all_feeditems_reports_bad_records() {
        let db = Database::in_memory().unwrap();
        db.save_feeditems(&[item("http://feed1", "g1", "a")]).unwrap();
        db.kv.put(b"feeditem:broken", b"{}").unwrap();
        db.kv
            .put(&FeeditemKey::new("http://feed1", "g2").encode(), b"not json")
            .unwrap();

        let mut visited = 0;
        let result = db.read_all_feeditems(|_| {
            visited += 1;
            ControlFlow::Continue(())
        });
        assert_eq!(visited, 1);
        assert!(matches!(result, Err(NanorssError::Aggregate { failed: 2, .. })));
    }
}
