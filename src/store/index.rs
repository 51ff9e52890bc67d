//! Reference lists: an ordered, duplicate-free sequence of keys stored under a
//! single key.
//!
//! All mutation happens through a [`Transaction`] so the read-modify-write is
//! covered by the caller's lock on the list key.

use serde::{Deserialize, Serialize};

use crate::app::Result;
use crate::store::tx::Transaction;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceList(Vec<Vec<u8>>);

impl ReferenceList {
    pub fn decode(raw: Option<&[u8]>) -> Result<Self> {
        match raw {
            None | Some([]) => Ok(Self::default()),
            Some(bytes) => Ok(bincode::deserialize(bytes)?),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.0.iter().any(|m| m == member)
    }

    /// Returns false when `member` was already present.
    pub fn insert(&mut self, member: &[u8]) -> bool {
        if self.contains(member) {
            return false;
        }
        self.0.push(member.to_vec());
        true
    }

    /// Returns false when `member` was absent.
    pub fn remove(&mut self, member: &[u8]) -> bool {
        let before = self.0.len();
        self.0.retain(|m| m != member);
        self.0.len() != before
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Vec<u8>> {
        self.0
    }
}

pub fn load(tx: &Transaction<'_>, list_key: &[u8]) -> Result<ReferenceList> {
    ReferenceList::decode(tx.get(list_key)?.as_deref())
}

pub fn members(tx: &Transaction<'_>, list_key: &[u8]) -> Result<Vec<Vec<u8>>> {
    Ok(load(tx, list_key)?.into_vec())
}

/// Idempotent: nothing is staged when `member` is already listed.
pub fn add(tx: &mut Transaction<'_>, list_key: &[u8], member: &[u8]) -> Result<()> {
    let mut list = load(tx, list_key)?;
    if list.insert(member) {
        tx.put(list_key.to_vec(), list.encode()?);
    }
    Ok(())
}

/// Removing an absent member is a no-op.
pub fn remove(tx: &mut Transaction<'_>, list_key: &[u8], member: &[u8]) -> Result<()> {
    let mut list = load(tx, list_key)?;
    if list.remove(member) {
        tx.put(list_key.to_vec(), list.encode()?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;

    #[test]
    fn test_empty_value_decodes_to_empty_list() {
        assert!(ReferenceList::decode(None).unwrap().is_empty());
        assert!(ReferenceList::decode(Some(&[])).unwrap().is_empty());
        assert!(ReferenceList::decode(Some(&[0xFF, 0x01])).is_err());
    }

    #[test]
    fn test_insert_keeps_order_and_rejects_duplicates() {
        let mut list = ReferenceList::default();
        assert!(list.insert(b"b"));
        assert!(list.insert(b"a"));
        assert!(!list.insert(b"b"));
        assert_eq!(list.clone().into_vec(), vec![b"b".to_vec(), b"a".to_vec()]);

        assert!(list.remove(b"b"));
        assert!(!list.remove(b"b"));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_add_and_remove_through_transactions() {
        let db = Database::in_memory().unwrap();
        let list_key = b"feed:x".to_vec();

        db.in_transaction(&[list_key.clone()], |tx| {
            add(tx, &list_key, b"k1")?;
            add(tx, &list_key, b"k2")?;
            add(tx, &list_key, b"k1")
        })
        .unwrap();

        let found = db
            .in_transaction(&[list_key.clone()], |tx| members(tx, &list_key))
            .unwrap();
        assert_eq!(found, vec![b"k1".to_vec(), b"k2".to_vec()]);

        db.in_transaction(&[list_key.clone()], |tx| {
            remove(tx, &list_key, b"k1")?;
            remove(tx, &list_key, b"missing")
        })
        .unwrap();

        let found = db
            .in_transaction(&[list_key.clone()], |tx| members(tx, &list_key))
            .unwrap();
        assert_eq!(found, vec![b"k2".to_vec()]);
    }

    #[test]
    fn test_redundant_add_stages_nothing() {
        let db = Database::in_memory().unwrap();
        let list_key = b"feed:x".to_vec();
        db.in_transaction(&[list_key.clone()], |tx| add(tx, &list_key, b"k1"))
            .unwrap();

        let staged = db
            .in_transaction(&[list_key.clone()], |tx| {
                add(tx, &list_key, b"k1")?;
                remove(tx, &list_key, b"other")?;
                Ok(tx.is_empty())
            })
            .unwrap();
        assert!(staged);
    }
}
