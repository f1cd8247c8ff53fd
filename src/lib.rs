//! Floodgate - Distributed Rate Limiting
//!
//! This crate implements a distributed rate-limiting engine for processes
//! that share one Redis-like backing store. Every process embeds its own
//! [`RateLimiter`]; the store holds the counting state, so all of them
//! agree on "how many requests has X made in the last Y seconds" without a
//! central coordinator.
//!
//! Rules are short strings like `"10/s"`, `"5/15m"`, or `"user:100/h"`,
//! optionally combined with [`and`]/[`or`] into a tree. Counting uses an
//! exact sliding window log per identifier, and a TTL-bounded distributed
//! lock makes each check-then-record sequence race-free across processes.
//!
//! ```rust,no_run
//! use floodgate::{or, LimiterConfig, RateLimiter, RedisStore};
//!
//! # async fn example() -> floodgate::Result<()> {
//! let store = RedisStore::connect("redis://127.0.0.1/").await?;
//! let limiter = RateLimiter::with_config(store, LimiterConfig::with_namespace("example.com"));
//!
//! // Allow 100 calls per second overall, or 50 per hour per user.
//! let verdict = limiter
//!     .limit(or(["100/s", "user:50/h"]))
//!     .key("home")
//!     .with("user", "vova")
//!     .check()
//!     .await?;
//!
//! if verdict.is_limited() {
//!     // Reject the operation.
//! }
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LimiterConfig;
pub use error::{FloodgateError, Result};
pub use ratelimit::{and, or, Expr, Limit, RateLimiter, Rule, Selector, SelectorContext, SelectorSource, Verdict};
pub use store::{MemoryStore, RecordOp, RedisStore, Store, StoreError};
