//! Error types for the Floodgate library.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for Floodgate operations.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// Configuration-related errors
    #[error("configuration error: {0}")]
    Config(String),

    /// A rule's textual form violates the grammar. Raised at parse time,
    /// before any store round-trip is made.
    #[error("malformed rule: {0:?}")]
    MalformedRule(String),

    /// A rule names a selector that no resolution source provides.
    #[error("selector {0:?} was specified but not found")]
    SelectorNotFound(String),

    /// `register` was called for a key that already has rules.
    #[error("rules already registered for key {0:?}")]
    RulesAlreadyRegistered(String),

    /// `limit_for` was called with a key that was never registered.
    #[error("no rules registered for key {0:?}")]
    NoRulesForKey(String),

    /// Any failure communicating with the shared store. Never interpreted
    /// as allowed or limited; always propagated.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
