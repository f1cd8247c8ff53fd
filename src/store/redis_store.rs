//! Redis-backed store implementation.
//!
//! Occurrence lists map onto Redis lists: `read_at` is `LINDEX`, and each
//! [`RecordOp`] becomes an `LPUSH` + `LTRIM` + `EXPIRE` triple, with the
//! whole batch pipelined into one round-trip. The lock marker uses
//! `SET NX EX` and `DEL`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::fmt;

use super::{RecordOp, Store, StoreError};

/// Store backend over a shared Redis instance.
///
/// Cloning is cheap; clones share the underlying multiplexed connection,
/// which reconnects on its own after transient failures.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1/")
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self { connection })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn read_at(&self, identifier: &str, index: i64) -> Result<Option<i64>, StoreError> {
        let mut conn = self.connection.clone();
        let value: Option<i64> = conn.lindex(identifier, index as isize).await?;
        Ok(value)
    }

    async fn record(&self, ops: &[RecordOp]) -> Result<(), StoreError> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for op in ops {
            pipe.lpush(&op.identifier, op.timestamp).ignore();
            pipe.ltrim(&op.identifier, 0, op.keep_entries as isize - 1)
                .ignore();
            pipe.expire(&op.identifier, op.ttl_secs as i64).ignore();
        }

        let mut conn = self.connection.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn try_lock(&self, lock_key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        // SET returns nil when NX fails, so an Option reply doubles as the
        // acquired flag.
        let reply: Option<String> = redis::cmd("SET")
            .arg(lock_key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn unlock(&self, lock_key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: () = conn.del(lock_key).await?;
        Ok(())
    }
}
