//! Selector resolution.
//!
//! A rule like `user:5/m` is scoped to a named dimension, the selector.
//! Resolution turns that name into a concrete value for the current
//! invocation by consulting, in order: explicit per-call overrides, an
//! optional primary [`SelectorSource`], and an optional fallback source.
//! The first source that knows the name wins, even when the value it holds
//! is "absent".

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{FloodgateError, Result};

/// A selector value as held by a resolution source.
#[derive(Clone)]
pub enum Selector {
    /// A ready value.
    Value(String),
    /// A provider invoked at resolution time; returning `None` means the
    /// selector has no value for this invocation.
    Provider(Arc<dyn Fn() -> Option<String> + Send + Sync>),
    /// Explicitly no value. Rules scoped to this selector become vacuous.
    Absent,
}

impl Selector {
    /// Wrap a provider closure.
    pub fn provider(f: impl Fn() -> Option<String> + Send + Sync + 'static) -> Self {
        Selector::Provider(Arc::new(f))
    }

    /// Materialize the value, invoking a provider if needed.
    fn value(&self) -> Option<String> {
        match self {
            Selector::Value(v) => Some(v.clone()),
            Selector::Provider(f) => f(),
            Selector::Absent => None,
        }
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Selector::Provider(_) => f.write_str("Provider(..)"),
            Selector::Absent => f.write_str("Absent"),
        }
    }
}

impl From<&str> for Selector {
    fn from(value: &str) -> Self {
        Selector::Value(value.to_string())
    }
}

impl From<String> for Selector {
    fn from(value: String) -> Self {
        Selector::Value(value)
    }
}

/// A lookup source for selector values, typically implemented on the
/// caller's request, session, or user object.
pub trait SelectorSource: Send + Sync {
    /// Return the selector named `name`, or `None` if this source does not
    /// know it at all. Knowing the name but having no value for it is
    /// expressed as `Some(Selector::Absent)`.
    fn get(&self, name: &str) -> Option<Selector>;
}

impl SelectorSource for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<Selector> {
        HashMap::get(self, name).map(|v| Selector::Value(v.clone()))
    }
}

impl SelectorSource for HashMap<String, Selector> {
    fn get(&self, name: &str) -> Option<Selector> {
        HashMap::get(self, name).cloned()
    }
}

/// Outcome of resolving one rule's selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// The rule has no selector; it counts against the bare identifier.
    Unselected,
    /// The selector resolved to nothing (absent or empty). The rule is
    /// vacuously not limited and is excluded from recording.
    Vacuous,
    /// The selector resolved to this value.
    Value(String),
}

impl Resolution {
    /// The resolved value, if there is one.
    pub(crate) fn value(&self) -> Option<&str> {
        match self {
            Resolution::Value(value) => Some(value),
            _ => None,
        }
    }
}

/// Per-invocation bundle of selector sources.
#[derive(Default)]
pub struct SelectorContext {
    overrides: HashMap<String, Selector>,
    source: Option<Box<dyn SelectorSource>>,
    fallback: Option<Box<dyn SelectorSource>>,
}

impl fmt::Debug for SelectorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorContext")
            .field("overrides", &self.overrides)
            .field("source", &self.source.is_some())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl SelectorContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override `name` with a ready value. Overrides win over both sources.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(name.into(), Selector::Value(value.into()));
        self
    }

    /// Override `name` with a provider invoked at resolution time.
    pub fn with_provider(
        mut self,
        name: impl Into<String>,
        provider: impl Fn() -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.overrides.insert(name.into(), Selector::provider(provider));
        self
    }

    /// Override `name` as explicitly absent, making rules scoped to it
    /// vacuous even when a source could resolve it.
    pub fn without(mut self, name: impl Into<String>) -> Self {
        self.overrides.insert(name.into(), Selector::Absent);
        self
    }

    /// Set the primary source, consulted after overrides.
    pub fn source(mut self, source: impl SelectorSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Set the fallback source, consulted last.
    pub fn fallback(mut self, source: impl SelectorSource + 'static) -> Self {
        self.fallback = Some(Box::new(source));
        self
    }

    /// Resolve a rule's selector name for this invocation.
    pub(crate) fn resolve(&self, name: Option<&str>) -> Result<Resolution> {
        let Some(name) = name else {
            return Ok(Resolution::Unselected);
        };

        let selector = self
            .overrides
            .get(name)
            .cloned()
            .or_else(|| self.source.as_deref().and_then(|s| s.get(name)))
            .or_else(|| self.fallback.as_deref().and_then(|s| s.get(name)))
            .ok_or_else(|| FloodgateError::SelectorNotFound(name.to_string()))?;

        Ok(match selector.value() {
            Some(value) if !value.is_empty() => Resolution::Value(value),
            _ => Resolution::Vacuous,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_no_selector_resolves_without_lookup() {
        let ctx = SelectorContext::new();
        assert_eq!(ctx.resolve(None).unwrap(), Resolution::Unselected);
    }

    #[test]
    fn test_override_value_and_provider() {
        let ctx = SelectorContext::new()
            .with("api_key", "pita")
            .with_provider("username", || Some("misha".to_string()));

        assert_eq!(
            ctx.resolve(Some("api_key")).unwrap(),
            Resolution::Value("pita".into())
        );
        assert_eq!(
            ctx.resolve(Some("username")).unwrap(),
            Resolution::Value("misha".into())
        );
    }

    #[test]
    fn test_source_map_lookup() {
        let ctx = SelectorContext::new().source(map(&[("foo", "vova"), ("bar", "liron")]));

        assert_eq!(ctx.resolve(Some("foo")).unwrap(), Resolution::Value("vova".into()));
        assert_eq!(ctx.resolve(Some("bar")).unwrap(), Resolution::Value("liron".into()));
    }

    #[test]
    fn test_source_object_lookup() {
        struct Session {
            apikey: String,
        }

        impl SelectorSource for Session {
            fn get(&self, name: &str) -> Option<Selector> {
                match name {
                    "apikey" => Some(Selector::Value(self.apikey.clone())),
                    "username" => Some(Selector::provider(|| Some("vova".to_string()))),
                    _ => None,
                }
            }
        }

        let ctx = SelectorContext::new().source(Session {
            apikey: "kitties".to_string(),
        });

        assert_eq!(
            ctx.resolve(Some("apikey")).unwrap(),
            Resolution::Value("kitties".into())
        );
        assert_eq!(
            ctx.resolve(Some("username")).unwrap(),
            Resolution::Value("vova".into())
        );
    }

    #[test]
    fn test_override_wins_over_source() {
        let ctx = SelectorContext::new()
            .with("user", "override")
            .source(map(&[("user", "from_source")]));

        assert_eq!(
            ctx.resolve(Some("user")).unwrap(),
            Resolution::Value("override".into())
        );
    }

    #[test]
    fn test_absent_override_shadows_source() {
        // An explicit "no value" wins over a source that could resolve it.
        let ctx = SelectorContext::new()
            .without("api_key")
            .source(map(&[("api_key", "vova")]));

        assert_eq!(ctx.resolve(Some("api_key")).unwrap(), Resolution::Vacuous);
    }

    #[test]
    fn test_fallback_is_consulted_last() {
        let ctx = SelectorContext::new()
            .source(map(&[("user", "primary")]))
            .fallback(map(&[("user", "fallback"), ("tenant", "acme")]));

        assert_eq!(
            ctx.resolve(Some("user")).unwrap(),
            Resolution::Value("primary".into())
        );
        assert_eq!(
            ctx.resolve(Some("tenant")).unwrap(),
            Resolution::Value("acme".into())
        );
    }

    #[test]
    fn test_empty_and_none_values_are_vacuous() {
        let ctx = SelectorContext::new()
            .with("empty", "")
            .with_provider("nothing", || None);

        assert_eq!(ctx.resolve(Some("empty")).unwrap(), Resolution::Vacuous);
        assert_eq!(ctx.resolve(Some("nothing")).unwrap(), Resolution::Vacuous);
    }

    #[test]
    fn test_unknown_selector_errors() {
        let ctx = SelectorContext::new().source(map(&[("user", "vova")]));

        match ctx.resolve(Some("no_selector")) {
            Err(FloodgateError::SelectorNotFound(name)) => assert_eq!(name, "no_selector"),
            other => panic!("expected SelectorNotFound, got {:?}", other),
        }
    }
}
