//! Cache key namespacing.
//!
//! A logical key plus an optional sub-key map to one physical key, so
//! sub-keyed entries never collide and can be cleared as a family.

use std::fmt;

/// Separates a logical key from its sub-key in the physical key.
pub const SUBKEY_SEPARATOR: &str = "::";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    key: String,
    subkey: Option<String>,
}

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            subkey: None,
        }
    }

    pub fn with_subkey(key: impl Into<String>, subkey: impl fmt::Display) -> Self {
        Self {
            key: key.into(),
            subkey: Some(subkey.to_string()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn subkey(&self) -> Option<&str> {
        self.subkey.as_deref()
    }

    /// The key a backend stores under.
    pub fn physical(&self) -> String {
        match &self.subkey {
            Some(subkey) => format!("{}{}{}", self.key, SUBKEY_SEPARATOR, subkey),
            None => self.key.clone(),
        }
    }

    /// Prefix shared by every sub-keyed entry of `key`.
    pub fn family_prefix(key: &str) -> String {
        format!("{}{}", key, SUBKEY_SEPARATOR)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.physical())
    }
}

/// Whether `physical` matches a clear pattern.
///
/// The pattern is a prefix; a trailing `*` is accepted and ignored, and an
/// empty pattern matches everything.
pub fn matches_pattern(physical: &str, pattern: &str) -> bool {
    physical.starts_with(pattern.strip_suffix('*').unwrap_or(pattern))
}
