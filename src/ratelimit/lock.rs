//! Distributed mutual exclusion over the shared store.
//!
//! One TTL-bounded exclusive marker per orchestration key serializes whole
//! check-then-record sequences across processes. Acquisition polls at a
//! configured interval until the marker can be set; the TTL makes a marker
//! left behind by a crashed holder expire on its own.

use std::time::Duration;

use tracing::{debug, trace};

use crate::store::{Store, StoreError};

/// Proof of a held (or deliberately skipped) acquisition. Must be given
/// back to [`DistributedLock::release`] on every exit path.
#[derive(Debug)]
pub(crate) struct LockGuard {
    /// The held marker key; `None` when locking is disabled.
    key: Option<String>,
}

/// Poll-based TTL lock bound to a store.
pub(crate) struct DistributedLock<'a, S: ?Sized> {
    store: &'a S,
    ttl_secs: u64,
    poll_interval: Duration,
    enabled: bool,
}

impl<'a, S: Store + ?Sized> DistributedLock<'a, S> {
    pub fn new(store: &'a S, ttl_secs: u64, poll_interval: Duration, enabled: bool) -> Self {
        Self {
            store,
            ttl_secs,
            poll_interval,
            enabled,
        }
    }

    /// Block until the marker at `lock_key` is ours, polling between
    /// attempts, or until the store errors. With locking disabled this
    /// returns immediately with a no-op guard.
    pub async fn acquire(&self, lock_key: &str) -> Result<LockGuard, StoreError> {
        if !self.enabled {
            return Ok(LockGuard { key: None });
        }

        loop {
            if self.store.try_lock(lock_key, self.ttl_secs).await? {
                trace!(lock_key = %lock_key, "Acquired limiter lock");
                return Ok(LockGuard {
                    key: Some(lock_key.to_string()),
                });
            }

            trace!(lock_key = %lock_key, "Lock held elsewhere, polling");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Give the marker back. A guard from a disabled acquisition is a no-op.
    pub async fn release(&self, guard: LockGuard) -> Result<(), StoreError> {
        match guard.key {
            Some(key) => {
                self.store.unlock(&key).await?;
                debug!(lock_key = %key, "Released limiter lock");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    const POLL: Duration = Duration::from_millis(5);

    #[tokio::test]
    async fn test_acquire_and_release() {
        let store = MemoryStore::new();
        let lock = DistributedLock::new(&store, 10, POLL, true);

        let guard = lock.acquire("lock:k").await.unwrap();
        assert!(!store.try_lock("lock:k", 10).await.unwrap());

        lock.release(guard).await.unwrap();
        assert!(store.try_lock("lock:k", 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_contender_waits_for_release() {
        let store = MemoryStore::new();
        let lock = DistributedLock::new(&store, 10, POLL, true);
        let guard = lock.acquire("lock:k").await.unwrap();

        let contender_store = store.clone();
        let contender = tokio::spawn(async move {
            let lock = DistributedLock::new(&contender_store, 10, POLL, true);
            let guard = lock.acquire("lock:k").await.unwrap();
            lock.release(guard).await.unwrap();
        });

        // Give the contender a few poll cycles while we still hold the lock.
        tokio::time::sleep(POLL * 4).await;
        assert!(!contender.is_finished());

        lock.release(guard).await.unwrap();
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_holder_does_not_deadlock() {
        let clock = ManualClock::at(0);
        let store = MemoryStore::with_clock(clock.clone());
        let lock = DistributedLock::new(&store, 10, POLL, true);

        // A holder that dies without releasing.
        let _abandoned = lock.acquire("lock:k").await.unwrap();

        clock.advance(11);
        let guard = lock.acquire("lock:k").await.unwrap();
        lock.release(guard).await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_lock_is_a_no_op() {
        let store = MemoryStore::new();

        // Somebody else holds the marker, but a disabled lock does not care.
        assert!(store.try_lock("lock:k", 10).await.unwrap());

        let lock = DistributedLock::new(&store, 10, POLL, false);
        let guard = lock.acquire("lock:k").await.unwrap();
        lock.release(guard).await.unwrap();

        // The foreign marker is untouched.
        assert!(!store.try_lock("lock:k", 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_error_aborts_acquisition() {
        #[derive(Debug)]
        struct BrokenStore;

        #[async_trait::async_trait]
        impl Store for BrokenStore {
            async fn read_at(&self, _: &str, _: i64) -> Result<Option<i64>, StoreError> {
                Err(StoreError::Backend("down".into()))
            }
            async fn record(&self, _: &[crate::store::RecordOp]) -> Result<(), StoreError> {
                Err(StoreError::Backend("down".into()))
            }
            async fn try_lock(&self, _: &str, _: u64) -> Result<bool, StoreError> {
                Err(StoreError::Backend("down".into()))
            }
            async fn unlock(&self, _: &str) -> Result<(), StoreError> {
                Err(StoreError::Backend("down".into()))
            }
        }

        let store = Arc::new(BrokenStore);
        let lock = DistributedLock::new(store.as_ref(), 10, POLL, true);

        assert!(lock.acquire("lock:k").await.is_err());
    }
}
