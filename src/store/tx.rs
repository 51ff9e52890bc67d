//! Crash-safe multi-key transactions.
//!
//! A transaction stages its writes in memory while holding the key-locker on
//! its lock keys. The staged batch is first written as a single log record
//! under `tx:<lock keys joined by 0x00>`; once that record is durable the batch
//! is applied and the record removed. Records found at open time are replayed.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::{NanorssError, Result};
use crate::store::keys;
use crate::store::kv::{BatchOp, KvBackend};
use crate::store::Database;

/// Delay between attempts to apply a logged batch.
pub const APPLY_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Staged writes of an open transaction.
///
/// Reads see the staged writes first, then the store.
pub struct Transaction<'a> {
    kv: &'a dyn KvBackend,
    ops: Vec<BatchOp>,
    staged: HashMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> Transaction<'a> {
    fn new(kv: &'a dyn KvBackend) -> Self {
        Self {
            kv,
            ops: Vec::new(),
            staged: HashMap::new(),
        }
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.staged.get(key) {
            Some(value) => Ok(value.clone()),
            None => self.kv.get(key),
        }
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.staged.insert(key.clone(), Some(value.clone()));
        self.ops.push(BatchOp::Put { key, value });
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.staged.insert(key.clone(), None);
        self.ops.push(BatchOp::Delete { key });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TxLogEntry {
    name: Vec<u8>,
    ops: Vec<BatchOp>,
}

impl Database {
    /// Runs `f` as one atomic, crash-safe transaction.
    ///
    /// `lock_keys` must cover every key whose current value `f` reads to
    /// decide what to write. Nothing is written if `f` fails or stages
    /// nothing.
    pub fn in_transaction<T, F>(&self, lock_keys: &[Vec<u8>], f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let guard = self.locker.lock(lock_keys)?;

        let mut tx = Transaction::new(self.kv.as_ref());
        let value = f(&mut tx)?;
        if tx.is_empty() {
            return Ok(value);
        }

        let entry = TxLogEntry {
            name: guard.keys().join(&0u8),
            ops: tx.into_ops(),
        };
        let log_key = keys::tx_key(&entry.name);
        self.kv.put(&log_key, &bincode::serialize(&entry)?)?;

        self.apply_logged(&log_key, &entry.ops)?;
        drop(guard);
        Ok(value)
    }

    /// Applies a logged batch, retrying until it sticks. A closed backend ends
    /// the retries; the log record then stays for the next open to replay.
    fn apply_logged(&self, log_key: &[u8], ops: &[BatchOp]) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            let result = self
                .kv
                .write_batch(ops)
                .and_then(|_| self.kv.delete(log_key));
            match result {
                Ok(()) => return Ok(()),
                Err(NanorssError::Closed) => {
                    tracing::error!(
                        "Store closed before transaction {} was applied, leaving it for replay",
                        String::from_utf8_lossy(log_key)
                    );
                    return Err(NanorssError::Closed);
                }
                Err(e) => {
                    attempt += 1;
                    tracing::warn!(
                        "Failed to apply transaction {} (attempt {}): {}",
                        String::from_utf8_lossy(log_key),
                        attempt,
                        e
                    );
                    thread::sleep(APPLY_RETRY_DELAY);
                }
            }
        }
    }

    /// Replays every transaction left behind by an interrupted process.
    pub(crate) fn complete_transactions(&self) -> Result<usize> {
        let log_keys = self.kv.keys_with_prefix(&keys::namespace(keys::TX))?;
        let mut replayed = 0;

        for log_key in log_keys {
            let Some(raw) = self.kv.get(&log_key)? else {
                continue;
            };
            let entry: TxLogEntry = bincode::deserialize(&raw)?;
            tracing::info!(
                "Replaying transaction {} ({} operations)",
                String::from_utf8_lossy(&log_key),
                entry.ops.len()
            );
            self.kv.write_batch(&entry.ops)?;
            self.kv.delete(&log_key)?;
            replayed += 1;
        }

        Ok(replayed)
    }

    /// Writes the log record of a transaction without applying it, leaving the
    /// store as a crash right after the linearization point would.
    #[cfg(test)]
    pub(crate) fn log_without_applying(
        &self,
        lock_keys: &[Vec<u8>],
        ops: Vec<BatchOp>,
    ) -> Result<()> {
        let name = crate::store::locker::canonical_order(lock_keys).join(&0u8);
        let log_key = keys::tx_key(&name);
        let entry = TxLogEntry { name, ops };
        self.kv.put(&log_key, &bincode::serialize(&entry)?)
    }
}
