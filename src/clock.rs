//! Wall-clock abstraction for window timestamps.
//!
//! Occurrence timestamps are compared across processes through the shared
//! store, so they must come from the wall clock, not a process-local
//! monotonic clock. The trait exists so tests can advance time without
//! sleeping.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Source of the current time as unix seconds.
pub trait Clock: Send + Sync {
    /// Current unix timestamp in whole seconds.
    fn now_unix(&self) -> i64;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// A clock that only moves when told to. Intended for tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a manual clock starting at the given unix timestamp.
    pub fn at(now: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now)),
        }
    }

    /// Advance the clock by `secs` seconds.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at(1_000);
        assert_eq!(clock.now_unix(), 1_000);

        clock.advance(7);
        assert_eq!(clock.now_unix(), 1_007);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::at(50);
        let other = clock.clone();

        clock.advance(10);
        assert_eq!(other.now_unix(), 60);
    }

    #[test]
    fn test_system_clock_is_sane() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock::new().now_unix() > 1_577_836_800);
    }
}
