//! Per-key mutual exclusion for transactions.
//!
//! Keys are acquired in sorted order, so two lockers can never wait on each
//! other in a cycle. Locks are not re-entrant.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex};

use crate::app::{NanorssError, Result};

#[derive(Default)]
pub struct KeyLocker {
    held: Mutex<HashSet<Vec<u8>>>,
    released: Condvar,
}

/// Holds a set of keys until dropped.
pub struct KeyLockGuard<'a> {
    locker: &'a KeyLocker,
    keys: Vec<Vec<u8>>,
}

impl KeyLockGuard<'_> {
    /// The locked keys in acquisition order.
    pub fn keys(&self) -> &[Vec<u8>] {
        &self.keys
    }
}

impl KeyLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until every key in `keys` is held by the caller.
    pub fn lock(&self, keys: &[Vec<u8>]) -> Result<KeyLockGuard<'_>> {
        let keys = canonical_order(keys);
        let mut guard = KeyLockGuard {
            locker: self,
            keys: Vec::with_capacity(keys.len()),
        };

        let mut held = self
            .held
            .lock()
            .map_err(|e| NanorssError::Store(e.to_string()))?;
        for key in keys {
            while held.contains(&key) {
                held = self
                    .released
                    .wait(held)
                    .map_err(|e| NanorssError::Store(e.to_string()))?;
            }
            held.insert(key.clone());
            guard.keys.push(key);
        }

        Ok(guard)
    }

    fn unlock(&self, keys: &[Vec<u8>]) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        for key in keys.iter().rev() {
            held.remove(key);
        }
        drop(held);
        self.released.notify_all();
    }
}

impl Drop for KeyLockGuard<'_> {
    fn drop(&mut self) {
        if !self.keys.is_empty() {
            self.locker.unlock(&self.keys);
        }
    }
}

/// Sorted and deduplicated.
pub fn canonical_order(keys: &[Vec<u8>]) -> Vec<Vec<u8>> {
    let mut keys = keys.to_vec();
    keys.sort();
    keys.dedup();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn k(s: &str) -> Vec<u8> {
        s.as_bytes().to_vec()
    }

    #[test]
    fn test_canonical_order() {
        assert_eq!(
            canonical_order(&[k("b"), k("a"), k("b")]),
            vec![k("a"), k("b")]
        );
    }

    #[test]
    fn test_duplicate_keys_do_not_self_deadlock() {
        let locker = KeyLocker::new();
        let guard = locker.lock(&[k("a"), k("a")]).unwrap();
        assert_eq!(guard.keys(), &[k("a")]);
    }

    #[test]
    fn test_release_on_drop() {
        let locker = KeyLocker::new();
        drop(locker.lock(&[k("a"), k("b")]).unwrap());
        let _again = locker.lock(&[k("b"), k("a")]).unwrap();
    }

    #[test]
    fn test_overlapping_sets_serialize() {
        let locker = Arc::new(KeyLocker::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let locker = locker.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                thread::spawn(move || {
                    // Every set shares "shared" but lists keys in a different order.
                    let keys = if i % 2 == 0 {
                        vec![k("shared"), k(&format!("own-{}", i))]
                    } else {
                        vec![k(&format!("own-{}", i)), k("shared")]
                    };
                    let _guard = locker.lock(&keys).unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disjoint_sets_run_in_parallel() {
        let locker = Arc::new(KeyLocker::new());
        let _a = locker.lock(&[k("a")]).unwrap();

        let other = locker.clone();
        let handle = thread::spawn(move || {
            let _b = other.lock(&[k("b")]).unwrap();
        });
        handle.join().unwrap();
    }
}
