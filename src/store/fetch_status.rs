use crate::app::Result;
use crate::domain::FetchStatus;
use crate::store::keys;
use crate::store::Database;

impl Database {
    pub fn get_fetch_status(&self, subject: &[u8]) -> Result<Option<FetchStatus>> {
        self.get_json(&keys::fetch_status_key(subject))
    }

    /// Merges the non-empty fields of `status` onto the stored record.
    ///
    /// Always writes: the fetch status is itself a clock, so there is no
    /// last-seen gate here.
    pub fn set_fetch_status(&self, subject: &[u8], status: &FetchStatus) -> Result<()> {
        let key = keys::fetch_status_key(subject);
        self.in_transaction(&[key.clone()], |tx| {
            let mut merged: FetchStatus = match tx.get(&key)? {
                Some(raw) => serde_json::from_slice(&raw).unwrap_or_else(|e| {
                    tracing::warn!("Replacing unreadable fetch status: {}", e);
                    FetchStatus::default()
                }),
                None => FetchStatus::default(),
            };
            merged.merge(status);
            tx.put(key.clone(), serde_json::to_vec(&merged)?);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{counted_db, start_time};
    use chrono::Duration;

    #[test]
    fn test_merge_keeps_prior_fields() {
        let (db, _kv, _clock) = counted_db();
        let subject = keys::feed_key("http://feed1");
        let t0 = start_time();
        let t1 = t0 + Duration::minutes(15);

        db.set_fetch_status(&subject, &FetchStatus::success(t0)).unwrap();
        db.set_fetch_status(&subject, &FetchStatus::failure(t1)).unwrap();

        let status = db.get_fetch_status(&subject).unwrap().unwrap();
        assert_eq!(status.last_success, Some(t0));
        assert_eq!(status.last_failure, Some(t1));
    }

    #[test]
    fn test_writes_are_unconditional() {
        let (db, kv, _clock) = counted_db();
        let subject = keys::feed_key("http://feed1");
        let status = FetchStatus::success(start_time());

        db.set_fetch_status(&subject, &status).unwrap();
        db.set_fetch_status(&subject, &status).unwrap();
        assert_eq!(kv.writes_to(&keys::fetch_status_key(&subject)), 2);
    }

    #[test]
    fn test_missing_status() {
        let db = Database::in_memory().unwrap();
        assert!(db.get_fetch_status(b"feed:nothing").unwrap().is_none());
    }
}
