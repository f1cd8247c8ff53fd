//! Sliding-window-log counting against the shared store.
//!
//! Per identifier the store holds the timestamps of past occurrences,
//! newest first, trimmed to the quota size. The limit test reads exactly
//! one slot: if the `allowed_requests`-th newest occurrence is still inside
//! the window, the quota is spent. This is an exact test, not an
//! approximation over coarse counters.

use std::collections::HashMap;

use tracing::trace;

use super::rule::Rule;
use crate::clock::Clock;
use crate::store::{RecordOp, Store, StoreError};

/// Merged per-identifier recording parameters.
///
/// When several rules map to the same identifier the list must be long
/// enough and live long enough for the most generous of them, so each field
/// takes its maximum across the rules independently. Recomputed on every
/// invocation; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Quota {
    pub allowed_requests: u32,
    pub window_secs: u64,
}

impl Quota {
    pub fn merge(&mut self, rule: &Rule) {
        self.allowed_requests = self.allowed_requests.max(rule.allowed_requests);
        self.window_secs = self.window_secs.max(rule.window_secs);
    }
}

impl From<&Rule> for Quota {
    fn from(rule: &Rule) -> Self {
        Self {
            allowed_requests: rule.allowed_requests,
            window_secs: rule.window_secs,
        }
    }
}

/// The counting algorithm, bound to a store and a clock for one invocation.
pub(crate) struct SlidingWindow<'a, S: ?Sized> {
    store: &'a S,
    clock: &'a dyn Clock,
}

impl<'a, S: Store + ?Sized> SlidingWindow<'a, S> {
    pub fn new(store: &'a S, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Whether `identifier` has already used up `rule`'s quota.
    ///
    /// Reads the slot at position `allowed_requests - 1`. No entry there
    /// means fewer occurrences than allowed (or an expired window); an
    /// entry within the last `window_secs` means the budget is spent.
    pub async fn is_limit_reached(&self, identifier: &str, rule: &Rule) -> Result<bool, StoreError> {
        let boundary = i64::from(rule.allowed_requests) - 1;

        let reached = match self.store.read_at(identifier, boundary).await? {
            Some(stamp) => self.clock.now_unix() - stamp < rule.window_secs as i64,
            None => false,
        };

        trace!(
            identifier = %identifier,
            allowed = rule.allowed_requests,
            window_secs = rule.window_secs,
            reached = reached,
            "Checked sliding window"
        );

        Ok(reached)
    }

    /// Record one occurrence for every identifier in `quotas`, as a single
    /// batched store round-trip.
    pub async fn record(&self, quotas: &HashMap<String, Quota>) -> Result<(), StoreError> {
        let now = self.clock.now_unix();
        let ops: Vec<RecordOp> = quotas
            .iter()
            .map(|(identifier, quota)| RecordOp {
                identifier: identifier.clone(),
                timestamp: now,
                keep_entries: quota.allowed_requests,
                ttl_secs: quota.window_secs,
            })
            .collect();

        self.store.record(&ops).await
    }
}
