use crate::error::{ExpandError, Result};
use std::collections::HashMap;

/// Name to value lookup used when expanding placeholders.
///
/// Returning `Some("")` is allowed; the expander treats an empty value the
/// same as a missing one.
pub trait Resolver {
    fn lookup(&self, name: &str) -> Option<String>;
}

impl<F> Resolver for F
where
    F: Fn(&str) -> Option<String>,
{
    fn lookup(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Resolves names against the process environment at lookup time
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvResolver;

impl Resolver for EnvResolver {
    fn lookup(&self, name: &str) -> Option<String> {
        // not valid environment keys, never set
        if name.is_empty() || name.contains(['=', '\0']) {
            return None;
        }
        std::env::var(name).ok()
    }
}

/// In-memory variables, e.g. `-D KEY=VALUE` definitions or test fixtures
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapResolver {
    vars: HashMap<String, String>,
}

impl MapResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, returning the previous value if any
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.vars.insert(name.into(), value.into())
    }

    /// Parses a `KEY=VALUE` definition and inserts it.
    ///
    /// Only the first `=` separates; the value may itself contain `=` or be empty.
    ///
    /// # Errors
    ///
    /// Returns `ExpandError::InvalidDefinition` if there is no `=` or the key is empty.
    pub fn define(&mut self, definition: &str) -> Result<()> {
        match definition.split_once('=') {
            Some((name, value)) if !name.is_empty() => {
                self.insert(name, value);
                Ok(())
            }
            _ => Err(ExpandError::InvalidDefinition {
                definition: definition.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl Resolver for MapResolver {
    fn lookup(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

impl<K, V> FromIterator<(K, V)> for MapResolver
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Consults `primary` first and falls back to `fallback` when it has no entry
#[derive(Debug, Clone, Default)]
pub struct Layered<P, F> {
    pub primary: P,
    pub fallback: F,
}

impl<P, F> Layered<P, F> {
    pub const fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: Resolver, F: Resolver> Resolver for Layered<P, F> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.primary
            .lookup(name)
            .or_else(|| self.fallback.lookup(name))
    }
}
