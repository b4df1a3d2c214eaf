//! Keyed async lock registry.
//!
//! The timer, billing, and payroll engines each need a critical section
//! scoped to one entity: one employee's timer transitions, one project's
//! invoice upsert, one pay period's wipe-and-rebuild. Read-then-write
//! sequencing alone is racy under concurrent requests, so callers take the
//! entity's mutex for the duration of the operation.
//!
//! Locks are created lazily and never removed; the registry grows with the
//! number of distinct entities touched, which is bounded by the dataset.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Identifies the entity a critical section is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    /// Timer transitions for one employee.
    Employee(crate::Id),
    /// Invoice upsert for one project.
    Project(crate::Id),
    /// Payroll rebuild for one pay period.
    Period(String),
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockKey::Employee(id) => write!(f, "employee:{}", id),
            LockKey::Project(id) => write!(f, "project:{}", id),
            LockKey::Period(period) => write!(f, "period:{}", period),
        }
    }
}

/// Registry of per-entity async mutexes.
#[derive(Default)]
pub struct LockRegistry {
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the mutex for `key`, waiting if another task holds it.
    ///
    /// The guard is owned, so it can cross `.await` points and outlive the
    /// registry borrow.
    pub async fn acquire(&self, key: LockKey) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Number of distinct keys seen so far.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_same_key_serializes() {
        let registry = Arc::new(LockRegistry::new());
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let running = running.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.acquire(LockKey::Employee(1)).await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let registry = LockRegistry::new();

        let _employee = registry.acquire(LockKey::Employee(1)).await;
        let _project = registry.acquire(LockKey::Project(1)).await;
        let _period = registry.acquire(LockKey::Period("2024-03".into())).await;

        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn test_key_reuse_returns_same_lock() {
        let registry = LockRegistry::new();

        {
            let _guard = registry.acquire(LockKey::Project(5)).await;
        }
        let _guard = registry.acquire(LockKey::Project(5)).await;

        assert_eq!(registry.len(), 1);
    }
}
