//! In-process store implementation.
//!
//! Keeps the same observable semantics as [`RedisStore`](super::RedisStore):
//! newest-first timestamp lists with a TTL, and self-expiring lock markers.
//! State is process-local, so limits are not shared across instances; use it
//! for single-process deployments and for tests.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::{RecordOp, Store, StoreError};
use crate::clock::{Clock, SystemClock};

#[derive(Debug, Clone)]
struct WindowEntry {
    /// Occurrence timestamps, newest first.
    stamps: Vec<i64>,
    /// Unix second at which the whole list expires.
    expires_at: i64,
}

/// Store backend held entirely in process memory.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, WindowEntry>>,
    /// Lock marker -> expiry unix second.
    locks: Arc<DashMap<String, i64>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.entries.len())
            .field("locks", &self.locks.len())
            .finish()
    }
}

impl MemoryStore {
    /// Create an empty store using the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }

    /// Create an empty store with an explicit clock.
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            locks: Arc::new(DashMap::new()),
            clock: Arc::new(clock),
        }
    }

    /// Number of live (unexpired) occurrence lists.
    pub fn len(&self) -> usize {
        let now = self.clock.now_unix();
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    /// Whether no live occurrence list exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all lists and lock markers.
    pub fn clear(&self) {
        self.entries.clear();
        self.locks.clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn read_at(&self, identifier: &str, index: i64) -> Result<Option<i64>, StoreError> {
        let Ok(index) = usize::try_from(index) else {
            return Ok(None);
        };

        let now = self.clock.now_unix();
        match self.entries.get(identifier) {
            Some(entry) if entry.expires_at > now => Ok(entry.stamps.get(index).copied()),
            _ => Ok(None),
        }
    }

    async fn record(&self, ops: &[RecordOp]) -> Result<(), StoreError> {
        let now = self.clock.now_unix();

        for op in ops {
            let mut entry = self
                .entries
                .entry(op.identifier.clone())
                .or_insert_with(|| WindowEntry {
                    stamps: Vec::new(),
                    expires_at: now,
                });

            if entry.expires_at <= now {
                entry.stamps.clear();
            }

            entry.stamps.insert(0, op.timestamp);
            entry.stamps.truncate(op.keep_entries as usize);
            entry.expires_at = now + op.ttl_secs as i64;
        }

        Ok(())
    }

    async fn try_lock(&self, lock_key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let now = self.clock.now_unix();
        let expires_at = now + ttl_secs as i64;

        // The entry API holds the shard lock, making the check-and-set atomic.
        match self.locks.entry(lock_key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut held) => {
                if *held.get() > now {
                    Ok(false)
                } else {
                    held.insert(expires_at);
                    Ok(true)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(expires_at);
                Ok(true)
            }
        }
    }

    async fn unlock(&self, lock_key: &str) -> Result<(), StoreError> {
        self.locks.remove(lock_key);
        Ok(())
    }
}
