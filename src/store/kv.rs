//! Flat byte-keyed storage engine underneath the typed stores.

use serde::{Deserialize, Serialize};

use crate::app::Result;

pub type Key = Vec<u8>;
pub type Value = Vec<u8>;
pub type KvPair = (Key, Value);

/// A single staged mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOp {
    Put { key: Key, value: Value },
    Delete { key: Key },
}

impl BatchOp {
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// Durable ordered key-value engine.
///
/// Every successful write must be durable when the call returns; the
/// transaction log depends on it.
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Value>>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Inserts only when `key` is absent. Returns whether the write happened.
    fn put_if_absent(&self, key: &[u8], value: &[u8]) -> Result<bool>;

    /// Deleting an absent key is not an error.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Applies `ops` in order, atomically.
    fn write_batch(&self, ops: &[BatchOp]) -> Result<()>;

    /// All pairs whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>>;

    fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Key>>;

    fn close(&self) -> Result<()>;
}

/// Smallest key greater than every key starting with `prefix`.
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_upper_bound() {
        assert_eq!(prefix_upper_bound(b"tx:"), Some(b"tx;".to_vec()));
        assert_eq!(prefix_upper_bound(&[b'a', 0xFF]), Some(vec![b'b']));
        assert_eq!(prefix_upper_bound(&[0xFF, 0xFF]), None);
        assert_eq!(prefix_upper_bound(b""), None);
    }
}
