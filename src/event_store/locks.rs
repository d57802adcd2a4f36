//! Per-aggregate async locks
//!
//! Serializes work on the same ids inside one process.
//! Locks are taken in id order so two operations touching the same set
//! cannot deadlock; waiting is bounded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::DomainError;

/// Default bounded wait for a lock
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

/// Guards held for the duration of one operation
#[derive(Debug)]
pub struct LockSet {
    ids: Vec<Uuid>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LockSet {
    pub fn ids(&self) -> &[Uuid] {
        &self.ids
    }
}

/// Registry of per-id mutexes
#[derive(Debug)]
pub struct AccountLocks {
    entries: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    wait: Duration,
}

impl Default for AccountLocks {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_WAIT)
    }
}

impl AccountLocks {
    pub fn new(wait: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            wait,
        }
    }

    /// Lock every id in `ids`. A timeout surfaces as `PersistenceConflict`.
    pub async fn acquire(&self, ids: &[Uuid]) -> Result<LockSet, DomainError> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();

        let handles: Vec<Arc<Mutex<()>>> = {
            let mut entries = self.entries.lock().await;
            // Drop mutexes nobody holds or waits on
            entries.retain(|_, lock| Arc::strong_count(lock) > 1);
            ids.iter()
                .map(|id| entries.entry(*id).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(handles.len());
        for (id, handle) in ids.iter().zip(handles) {
            match tokio::time::timeout(self.wait, handle.lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => {
                    tracing::warn!(lock_id = %id, wait_ms = self.wait.as_millis() as u64, "Lock wait timed out");
                    return Err(DomainError::PersistenceConflict(format!(
                        "timed out waiting for lock on {}",
                        id
                    )));
                }
            }
        }

        Ok(LockSet {
            ids,
            _guards: guards,
        })
    }

    /// Number of tracked mutexes
    pub async fn tracked(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_sorts_and_dedups() {
        let locks = AccountLocks::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let set = locks.acquire(&[b, a, b]).await.unwrap();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(set.ids(), expected.as_slice());
    }

    #[tokio::test]
    async fn test_lock_timeout_is_conflict() {
        let locks = AccountLocks::new(Duration::from_millis(20));
        let id = Uuid::new_v4();

        let _held = locks.acquire(&[id]).await.unwrap();
        let result = locks.acquire(&[id]).await;
        assert!(matches!(result, Err(DomainError::PersistenceConflict(_))));
    }

    #[tokio::test]
    async fn test_released_locks_are_pruned() {
        let locks = AccountLocks::default();
        {
            let _set = locks.acquire(&[Uuid::new_v4(), Uuid::new_v4()]).await.unwrap();
        }
        let _other = locks.acquire(&[Uuid::new_v4()]).await.unwrap();
        assert_eq!(locks.tracked().await, 1);
    }
}
