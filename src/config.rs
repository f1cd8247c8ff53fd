//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{FloodgateError, Result};

/// Configuration for a [`RateLimiter`](crate::RateLimiter) instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Prefix applied to every identifier and lock key, to avoid collisions
    /// with other tenants sharing the same store.
    #[serde(default)]
    pub namespace: String,

    /// Disable the distributed lock around check-then-record. Improves
    /// latency while making rate limiting less accurate under concurrency.
    #[serde(default)]
    pub disable_locks: bool,

    /// Seconds after which an unreleased lock expires on its own.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    /// How often to poll, in milliseconds, while waiting for a lock.
    /// A shorter interval means more round-trips to the store.
    #[serde(default = "default_lock_poll_interval_ms")]
    pub lock_poll_interval_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            disable_locks: false,
            lock_ttl_secs: default_lock_ttl_secs(),
            lock_poll_interval_ms: default_lock_poll_interval_ms(),
        }
    }
}

fn default_lock_ttl_secs() -> u64 {
    10
}

fn default_lock_poll_interval_ms() -> u64 {
    100
}

impl LimiterConfig {
    /// Create a configuration with the given namespace and defaults for
    /// everything else.
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| FloodgateError::Config(e.to_string()))?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| FloodgateError::Config(e.to_string()))
    }

    /// Lock time-to-live as a [`Duration`].
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    /// Lock polling interval as a [`Duration`].
    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }
}
