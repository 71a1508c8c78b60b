//! Namespace-scoped cache keys.
//!
//! `CacheKey` can only be built through [`CacheKey::resolve`] (or its typed
//! shorthands), so every key the stage stores touch carries the namespace
//! literal of its kind.

use stagecache_core::{KeySpace, Namespace};
use std::fmt;

/// A byte store key scoped to one namespace.
///
/// # String Format
///
/// - Keyed namespaces: `<prefix><identifier>`, e.g. `raw:notes/a.md`
/// - Singleton namespaces: the fixed literal, e.g. `consolidated-index`
///
/// Prefixes end in `:` and no namespace literal is a prefix of another, so
/// keys are injective within a namespace and disjoint across namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    inner: CacheKeyInner,
}

/// Private inner struct - prevents external construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct CacheKeyInner {
    namespace: Namespace,
    identifier: Option<String>,
    encoded: String,
}

impl CacheKey {
    /// Map `(namespace, identifier)` to a key.
    ///
    /// Total over its domain: singleton namespaces ignore the identifier and a
    /// keyed namespace without one maps to the bare prefix (empty identifier).
    pub fn resolve(namespace: Namespace, identifier: Option<&str>) -> Self {
        match namespace.key_space() {
            KeySpace::Prefixed(prefix) => {
                let identifier = identifier.unwrap_or_default();
                Self {
                    inner: CacheKeyInner {
                        namespace,
                        identifier: Some(identifier.to_string()),
                        encoded: format!("{}{}", prefix, identifier),
                    },
                }
            }
            KeySpace::Fixed(literal) => Self {
                inner: CacheKeyInner {
                    namespace,
                    identifier: None,
                    encoded: literal.to_string(),
                },
            },
        }
    }

    /// Key for an identifier in a keyed namespace.
    pub fn keyed(namespace: Namespace, identifier: &str) -> Self {
        Self::resolve(namespace, Some(identifier))
    }

    /// Key of a singleton namespace.
    pub fn singleton(namespace: Namespace) -> Self {
        Self::resolve(namespace, None)
    }

    /// Parse a raw byte store key back into a `CacheKey`.
    ///
    /// Returns `None` for keys outside every namespace.
    pub fn decode(key: &str) -> Option<Self> {
        let namespace = Namespace::classify(key)?;
        match namespace.key_space() {
            KeySpace::Prefixed(prefix) => {
                let identifier = key.strip_prefix(prefix)?;
                Some(Self::keyed(namespace, identifier))
            }
            KeySpace::Fixed(_) => Some(Self::singleton(namespace)),
        }
    }

    /// Strip a namespace's prefix from a raw key, if the key belongs to it.
    pub fn strip_namespace(namespace: Namespace, key: &str) -> Option<&str> {
        match namespace.key_space() {
            KeySpace::Prefixed(prefix) => key.strip_prefix(prefix),
            KeySpace::Fixed(_) => None,
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.inner.namespace
    }

    /// The identifier, for keyed namespaces.
    pub fn identifier(&self) -> Option<&str> {
        self.inner.identifier.as_deref()
    }

    /// The string handed to the byte store.
    pub fn as_str(&self) -> &str {
        &self.inner.encoded
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
