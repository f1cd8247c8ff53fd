//! Limit orchestration.
//!
//! [`RateLimiter`] owns the store, the clock, the configuration, and the
//! registry of named rule sets. Each call to [`RateLimiter::limit`] (or
//! [`RateLimiter::limit_for`]) yields a [`Limit`], whose [`Limit::check`]
//! drives one invocation: acquire the key's lock, evaluate the rule tree,
//! record occurrences when allowed, release the lock, report the verdict.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use super::expr::{Expr, LeafPredicate};
use super::lock::DistributedLock;
use super::rule::Rule;
use super::selector::{Resolution, SelectorContext, SelectorSource};
use super::window::{Quota, SlidingWindow};
use crate::clock::{Clock, SystemClock};
use crate::config::LimiterConfig;
use crate::error::{FloodgateError, Result};
use crate::store::Store;

/// Outcome of one rate limit check.
///
/// `Limited` is an expected result the caller branches on, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The operation may proceed; its occurrence has been recorded.
    Allowed,
    /// The quota is spent; nothing was recorded.
    Limited,
}

impl Verdict {
    /// Whether the operation may proceed.
    pub fn is_allowed(self) -> bool {
        matches!(self, Verdict::Allowed)
    }

    /// Whether the quota was exceeded.
    pub fn is_limited(self) -> bool {
        matches!(self, Verdict::Limited)
    }
}

/// Distributed rate limiter over a shared store.
///
/// Many processes can each hold their own `RateLimiter` against the same
/// store and will agree on every quota; the limiter itself keeps no
/// cross-invocation counting state in process.
pub struct RateLimiter<S> {
    store: S,
    clock: Arc<dyn Clock>,
    config: LimiterConfig,
    /// Named rule sets, keyed by orchestration key.
    registry: RwLock<HashMap<String, Expr>>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for RateLimiter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: Store> RateLimiter<S> {
    /// Create a limiter with default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, LimiterConfig::default())
    }

    /// Create a limiter with the given configuration.
    pub fn with_config(store: S, config: LimiterConfig) -> Self {
        Self::with_clock(store, config, SystemClock::new())
    }

    /// Create a limiter with an explicit clock. Mostly useful in tests.
    pub fn with_clock(store: S, config: LimiterConfig, clock: impl Clock + 'static) -> Self {
        Self {
            store,
            clock: Arc::new(clock),
            config,
            registry: RwLock::new(HashMap::new()),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Register `rules` under `key` for later [`limit_for`](Self::limit_for)
    /// calls. Registering a key twice is a configuration error, never a
    /// silent overwrite.
    pub fn register(&self, key: impl Into<String>, rules: impl Into<Expr>) -> Result<()> {
        let key = key.into();
        let mut registry = self.registry.write();

        if registry.contains_key(&key) {
            return Err(FloodgateError::RulesAlreadyRegistered(key));
        }

        registry.insert(key, rules.into());
        Ok(())
    }

    /// Start building a check against `rules`.
    pub fn limit(&self, rules: impl Into<Expr>) -> Limit<'_, S> {
        Limit {
            limiter: self,
            rules: rules.into(),
            key: String::new(),
            context: SelectorContext::new(),
        }
    }

    /// Start building a check against the rules registered under `key`.
    /// All callers of the same key share its counters and its lock.
    pub fn limit_for(&self, key: &str) -> Result<Limit<'_, S>> {
        let rules = self
            .registry
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| FloodgateError::NoRulesForKey(key.to_string()))?;

        Ok(Limit {
            limiter: self,
            rules,
            key: key.to_string(),
            context: SelectorContext::new(),
        })
    }

    fn lock(&self) -> DistributedLock<'_, S> {
        DistributedLock::new(
            &self.store,
            self.config.lock_ttl_secs,
            self.config.lock_poll_interval(),
            !self.config.disable_locks,
        )
    }

    fn window(&self) -> SlidingWindow<'_, S> {
        SlidingWindow::new(&self.store, self.clock.as_ref())
    }
}

/// One rule set bound to an orchestration key and a selector context,
/// ready to be checked. Building it performs no I/O.
pub struct Limit<'a, S> {
    limiter: &'a RateLimiter<S>,
    rules: Expr,
    key: String,
    context: SelectorContext,
}

impl<'a, S: Store> Limit<'a, S> {
    /// Set the orchestration key. Checks sharing a key share counters and
    /// are serialized by one lock.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Override one selector with a ready value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.context = self.context.with(name, value);
        self
    }

    /// Override one selector with a provider invoked at resolution time.
    pub fn with_provider(
        mut self,
        name: impl Into<String>,
        provider: impl Fn() -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.context = self.context.with_provider(name, provider);
        self
    }

    /// Mark one selector as explicitly absent for this check.
    pub fn without(mut self, name: impl Into<String>) -> Self {
        self.context = self.context.without(name);
        self
    }

    /// Set the primary selector source (e.g. the current session).
    pub fn selectors(mut self, source: impl SelectorSource + 'static) -> Self {
        self.context = self.context.source(source);
        self
    }

    /// Set the fallback selector source, consulted when neither an
    /// override nor the primary source knows a name.
    pub fn fallback(mut self, source: impl SelectorSource + 'static) -> Self {
        self.context = self.context.fallback(source);
        self
    }

    /// Run one full check-and-record invocation.
    ///
    /// Returns [`Verdict::Limited`] when any governing rule's window is
    /// exhausted, otherwise records one occurrence for every governed
    /// identifier and returns [`Verdict::Allowed`]. The key's lock is
    /// released on every path out of this function.
    pub async fn check(&self) -> Result<Verdict> {
        // Surface grammar violations before any store round-trip.
        for leaf in self.rules.leaves() {
            leaf.parse::<Rule>()?;
        }

        trace!(key = %self.key, "Checking rate limit");

        let lock = self.limiter.lock();
        let guard = lock.acquire(&self.lock_key()).await?;

        let outcome = self.check_and_record().await;
        let released = lock.release(guard).await;

        match outcome {
            Ok(verdict) => {
                released?;
                Ok(verdict)
            }
            Err(err) => {
                // The primary failure wins; a release failure on top of it
                // is only worth a warning. The lock TTL covers the marker.
                if let Err(release_err) = released {
                    warn!(
                        key = %self.key,
                        error = %release_err,
                        "Failed to release limiter lock"
                    );
                }
                Err(err)
            }
        }
    }

    /// CHECKING and RECORDING, run under the key's lock.
    async fn check_and_record(&self) -> Result<Verdict> {
        if self.limit_reached().await? {
            debug!(key = %self.key, "Rate limit reached");
            return Ok(Verdict::Limited);
        }

        let quotas = self.relevant_quotas()?;
        if !quotas.is_empty() {
            self.limiter.window().record(&quotas).await?;
        }

        Ok(Verdict::Allowed)
    }

    /// Evaluate the rule tree; true means some governing rule is exhausted.
    async fn limit_reached(&self) -> Result<bool> {
        let predicate: &LeafPredicate<'_, FloodgateError> =
            &|text| Box::pin(self.rule_limited(text));
        self.rules.evaluate(predicate).await
    }

    /// Predicate for a single leaf: vacuous rules are never limited.
    async fn rule_limited(&self, text: &str) -> Result<bool> {
        let rule: Rule = text.parse()?;

        match self.context.resolve(rule.selector.as_deref())? {
            Resolution::Vacuous => Ok(false),
            resolution => {
                let identifier = self.identifier(rule.selector.as_deref(), resolution.value());
                let reached = self
                    .limiter
                    .window()
                    .is_limit_reached(&identifier, &rule)
                    .await?;
                Ok(reached)
            }
        }
    }

    /// Merged quotas for every declared rule, across the whole tree and
    /// regardless of which branch evaluation visited. Vacuous rules are
    /// excluded.
    fn relevant_quotas(&self) -> Result<HashMap<String, Quota>> {
        let mut quotas: HashMap<String, Quota> = HashMap::new();

        for leaf in self.rules.leaves() {
            let rule: Rule = leaf.parse()?;
            let resolution = self.context.resolve(rule.selector.as_deref())?;

            if resolution == Resolution::Vacuous {
                continue;
            }

            match quotas.entry(self.identifier(rule.selector.as_deref(), resolution.value())) {
                Entry::Occupied(mut occupied) => occupied.get_mut().merge(&rule),
                Entry::Vacant(vacant) => {
                    vacant.insert(Quota::from(&rule));
                }
            }
        }

        Ok(quotas)
    }

    /// The fully-qualified counting key: namespace, orchestration key,
    /// selector name, and selector value, with empty parts skipped.
    fn identifier(&self, selector: Option<&str>, value: Option<&str>) -> String {
        join_non_empty(
            ":",
            &[
                self.limiter.config.namespace.as_str(),
                self.key.as_str(),
                selector.unwrap_or(""),
                value.unwrap_or(""),
            ],
        )
    }

    /// The exclusion marker key for this orchestration key.
    fn lock_key(&self) -> String {
        format!(
            "lock:{}",
            join_non_empty(
                ":",
                &[self.limiter.config.namespace.as_str(), self.key.as_str()]
            )
        )
    }
}

/// Join the non-empty parts with `delimiter`.
fn join_non_empty(delimiter: &str, parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(delimiter)
}
