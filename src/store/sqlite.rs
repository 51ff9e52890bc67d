use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use rusqlite_migration::{Migrations, M};

use crate::app::{NanorssError, Result};
use crate::store::kv::{prefix_upper_bound, BatchOp, Key, KvBackend, KvPair, Value};

/// [`KvBackend`] over a single SQLite table of blob keys and values.
pub struct SqliteKv {
    conn: Mutex<Option<Connection>>,
}

impl SqliteKv {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(Some(conn)),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(Some(conn)),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        self.with_conn(|conn| {
            conn.pragma_update(None, "synchronous", "FULL")?;
            Ok(())
        })?;

        let mut guard = self.lock()?;
        let conn = guard
            .as_mut()
            .ok_or(NanorssError::Closed)?;
        migrations
            .to_latest(conn)
            .map_err(|e| NanorssError::Store(format!("migration failed: {}", e)))?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|e| NanorssError::Store(e.to_string()))
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>) -> Result<T> {
        let mut guard = self.lock()?;
        let conn = guard
            .as_mut()
            .ok_or(NanorssError::Closed)?;
        Ok(f(conn)?)
    }
}

impl KvBackend for SqliteKv {
    fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
        })
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
    }

    fn put_if_absent(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
            Ok(inserted > 0)
        })
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            Ok(())
        })
    }

    fn write_batch(&self, ops: &[BatchOp]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for op in ops {
                match op {
                    BatchOp::Put { key, value } => {
                        tx.execute(
                            "INSERT INTO kv (key, value) VALUES (?1, ?2)
                             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                            params![key, value],
                        )?;
                    }
                    BatchOp::Delete { key } => {
                        tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
                    }
                }
            }
            tx.commit()
        })
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>> {
        self.with_conn(|conn| {
            let read = |row: &rusqlite::Row<'_>| -> rusqlite::Result<KvPair> {
                Ok((row.get(0)?, row.get(1)?))
            };
            match prefix_upper_bound(prefix) {
                Some(end) => {
                    let mut stmt = conn.prepare(
                        "SELECT key, value FROM kv WHERE key >= ?1 AND key < ?2 ORDER BY key",
                    )?;
                    let pairs = stmt
                        .query_map(params![prefix, end], read)?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    Ok(pairs)
                }
                None => {
                    let mut stmt =
                        conn.prepare("SELECT key, value FROM kv WHERE key >= ?1 ORDER BY key")?;
                    let pairs = stmt
                        .query_map(params![prefix], read)?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    Ok(pairs)
                }
            }
        })
    }

    fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Key>> {
        self.with_conn(|conn| match prefix_upper_bound(prefix) {
            Some(end) => {
                let mut stmt =
                    conn.prepare("SELECT key FROM kv WHERE key >= ?1 AND key < ?2 ORDER BY key")?;
                let keys = stmt
                    .query_map(params![prefix, end], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(keys)
            }
            None => {
                let mut stmt = conn.prepare("SELECT key FROM kv WHERE key >= ?1 ORDER BY key")?;
                let keys = stmt
                    .query_map(params![prefix], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(keys)
            }
        })
    }

    fn close(&self) -> Result<()> {
        let conn = self.lock()?.take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| NanorssError::Database(e))?;
        }
        Ok(())
    }
}
