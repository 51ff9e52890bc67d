pub mod backup;
pub mod feeditems;
pub mod fetch_status;
pub mod index;
pub mod keys;
pub mod kv;
pub mod locker;
pub mod pages;
pub mod read_status;
pub mod server_config;
pub mod sqlite;
pub mod ttl;
pub mod tx;
pub mod users;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;

use crate::app::Result;
use crate::domain::{Feeditem, FetchStatus, User, UserPagemonitor};

pub use backup::Backup;
pub use kv::{BatchOp, KvBackend};
pub use locker::KeyLocker;
pub use sqlite::SqliteKv;
pub use tx::Transaction;

pub const DATABASE_FILE: &str = "nanorss.db";

/// Source of "now" for every time-dependent store operation.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Items not seen by a fetcher for this long are deleted.
    pub item_ttl: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            item_ttl: Duration::days(14),
        }
    }
}

impl StoreConfig {
    pub fn with_ttl_days(days: i64) -> Self {
        Self {
            item_ttl: Duration::days(days),
        }
    }

    /// A last-seen stamp younger than this is not rewritten.
    pub fn skip_update_ttl(&self) -> Duration {
        self.item_ttl / 2
    }
}

/// Typed persistence over a [`KvBackend`].
pub struct Database {
    kv: Arc<dyn KvBackend>,
    locker: KeyLocker,
    config: StoreConfig,
    clock: Clock,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Opens (creating if needed) the store under `dir` and replays any
    /// interrupted transactions.
    pub fn open<P: AsRef<Path>>(dir: P, config: StoreConfig) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let kv = SqliteKv::new(dir.join(DATABASE_FILE))?;
        tracing::info!("Opened database in {}", dir.display());
        Self::with_backend(Arc::new(kv), config)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_backend(Arc::new(SqliteKv::in_memory()?), StoreConfig::default())
    }

    pub fn with_backend(kv: Arc<dyn KvBackend>, config: StoreConfig) -> Result<Self> {
        let db = Self {
            kv,
            locker: KeyLocker::new(),
            config,
            clock: Arc::new(Utc::now),
        };
        let replayed = db.complete_transactions()?;
        if replayed > 0 {
            tracing::info!("Completed {} interrupted transactions", replayed);
        }
        Ok(db)
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn close(&self) -> Result<()> {
        self.kv.close()
    }

    fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.kv.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }
}

/// Persistence operations the fetcher depends on.
pub trait Store: Send + Sync {
    fn read_all_users(&self) -> Result<Vec<User>>;
    fn get_user(&self, username: &str) -> Result<Option<User>>;

    // Content
    fn save_feeditems(&self, items: &[Feeditem]) -> Result<()>;
    fn update_page(&self, config: &UserPagemonitor, contents: String) -> Result<bool>;

    // Bookkeeping
    fn set_fetch_status(&self, subject: &[u8], status: &FetchStatus) -> Result<()>;
    fn set_read_status_for_all(&self, item_key: &[u8], read: bool) -> Result<()>;

    fn now(&self) -> DateTime<Utc>;
}

impl Store for Database {
    fn read_all_users(&self) -> Result<Vec<User>> {
        Database::read_all_users(self)
    }

    fn get_user(&self, username: &str) -> Result<Option<User>> {
        Database::get_user(self, username)
    }

    fn save_feeditems(&self, items: &[Feeditem]) -> Result<()> {
        Database::save_feeditems(self, items)
    }

    fn update_page(&self, config: &UserPagemonitor, contents: String) -> Result<bool> {
        Database::update_page(self, config, contents)
    }

    fn set_fetch_status(&self, subject: &[u8], status: &FetchStatus) -> Result<()> {
        Database::set_fetch_status(self, subject, status)
    }

    fn set_read_status_for_all(&self, item_key: &[u8], read: bool) -> Result<()> {
        Database::set_read_status_for_all(self, item_key, read)
    }

    fn now(&self) -> DateTime<Utc> {
        Database::now(self)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_update_ttl_is_half_of_item_ttl() {
        let config = StoreConfig::default();
        assert_eq!(config.item_ttl, Duration::days(14));
        assert_eq!(config.skip_update_ttl(), Duration::days(7));
        assert_eq!(StoreConfig::with_ttl_days(2).skip_update_ttl(), Duration::days(1));
    }

    #[test]
    fn test_open_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("nanorss");
        let db = Database::open(&root, StoreConfig::default()).unwrap();
        assert!(root.join(DATABASE_FILE).exists());
        db.close().unwrap();
    }

    #[test]
    fn test_store_trait_is_object_safe() {
        let db: Arc<dyn Store> = Arc::new(Database::in_memory().unwrap());
        assert!(db.read_all_users().unwrap().is_empty());
    }
}
