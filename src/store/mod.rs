//! Shared-store protocol and backends.
//!
//! The engine only ever talks to the store through the narrow [`Store`]
//! trait: an indexed read from a timestamp list, a batched record of new
//! occurrences, and a TTL-bounded lock marker. [`RedisStore`] implements it
//! against a remote Redis; [`MemoryStore`] implements the same semantics
//! in-process for single-instance deployments and tests.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur talking to the shared store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis transport or protocol failure.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Failure from a non-Redis backend.
    #[error("{0}")]
    Backend(String),
}

/// One identifier's worth of recording work: push `timestamp` to the head
/// of the list at `identifier`, trim the list to `keep_entries`, and set
/// its expiry to `ttl_secs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOp {
    /// Fully-qualified counting key.
    pub identifier: String,
    /// Occurrence timestamp, unix seconds.
    pub timestamp: i64,
    /// Maximum list length to retain (the merged allowed-request count).
    pub keep_entries: u32,
    /// Seconds until the list expires (the merged window span).
    pub ttl_secs: u64,
}

/// Protocol for the shared list-structured, TTL-capable store.
///
/// Implementations do not need to serialize operations across different
/// identifiers; same-identifier races are excluded by the distributed lock
/// upstream of the store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read the entry at zero-based `index` of the list at `identifier`.
    /// Returns `None` when the list is missing, expired, or shorter than
    /// `index + 1`.
    async fn read_at(&self, identifier: &str, index: i64) -> Result<Option<i64>, StoreError>;

    /// Apply all `ops` as a single batched round-trip.
    async fn record(&self, ops: &[RecordOp]) -> Result<(), StoreError>;

    /// Try to set the exclusive marker at `lock_key` with a TTL of
    /// `ttl_secs`. Returns `true` when the marker was absent and is now
    /// held by the caller.
    async fn try_lock(&self, lock_key: &str, ttl_secs: u64) -> Result<bool, StoreError>;

    /// Delete the exclusive marker at `lock_key`.
    async fn unlock(&self, lock_key: &str) -> Result<(), StoreError>;
}
