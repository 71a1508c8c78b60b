//! Record namespaces and their key spaces.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Record kind discriminator. Each kind owns a disjoint slice of the key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Namespace {
    /// Items extracted straight from a source document.
    Raw,
    /// Resolved project reference and enhanced metadata for a source.
    Project,
    /// Fully augmented items (location + metadata) for a source.
    Augmented,
    /// The whole-corpus consolidated index (singleton).
    Consolidated,
    /// The event collection (singleton).
    Events,
    /// Small arbitrary JSON values under caller-chosen keys.
    Meta,
}

/// How a namespace maps onto byte store keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpace {
    /// One key per identifier: `prefix + identifier`.
    Prefixed(&'static str),
    /// Exactly one key, no identifier.
    Fixed(&'static str),
}

impl KeySpace {
    /// The literal used for key construction and classification.
    pub fn literal(&self) -> &'static str {
        match self {
            KeySpace::Prefixed(prefix) => prefix,
            KeySpace::Fixed(key) => key,
        }
    }

    /// Whether `key` belongs to this key space.
    pub fn contains(&self, key: &str) -> bool {
        match self {
            KeySpace::Prefixed(prefix) => key.starts_with(prefix),
            KeySpace::Fixed(fixed) => key == *fixed,
        }
    }
}

impl Namespace {
    /// Every namespace, in a stable order.
    pub const ALL: [Namespace; 6] = [
        Namespace::Raw,
        Namespace::Project,
        Namespace::Augmented,
        Namespace::Consolidated,
        Namespace::Events,
        Namespace::Meta,
    ];

    /// The key space owned by this namespace.
    ///
    /// None of these literals is a prefix of another, so a key classifies
    /// into at most one namespace.
    pub const fn key_space(self) -> KeySpace {
        match self {
            Namespace::Raw => KeySpace::Prefixed("raw:"),
            Namespace::Project => KeySpace::Prefixed("project:"),
            Namespace::Augmented => KeySpace::Prefixed("augmented:"),
            Namespace::Consolidated => KeySpace::Fixed("consolidated-index"),
            Namespace::Events => KeySpace::Fixed("event-collection"),
            Namespace::Meta => KeySpace::Prefixed("meta:"),
        }
    }

    /// Whether records of this kind are keyed by an identifier.
    pub const fn is_keyed(self) -> bool {
        matches!(self.key_space(), KeySpace::Prefixed(_))
    }

    /// Whether the source modification time participates in validity.
    pub const fn has_mtime_gate(self) -> bool {
        matches!(self, Namespace::Raw)
    }

    /// Whether records of this kind live in the byte store's singleton tier.
    pub const fn uses_singleton_tier(self) -> bool {
        matches!(self, Namespace::Consolidated)
    }

    /// The namespaces that hold one record per source document.
    pub const fn per_source() -> [Namespace; 3] {
        [Namespace::Raw, Namespace::Project, Namespace::Augmented]
    }

    /// Find the namespace a byte store key belongs to, if any.
    pub fn classify(key: &str) -> Option<Namespace> {
        Self::ALL
            .into_iter()
            .find(|ns| ns.key_space().contains(key))
    }
}

fn normalize_token(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Namespace::Raw => "raw",
            Namespace::Project => "project",
            Namespace::Augmented => "augmented",
            Namespace::Consolidated => "consolidated",
            Namespace::Events => "events",
            Namespace::Meta => "meta",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for Namespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "raw" => Ok(Namespace::Raw),
            "project" => Ok(Namespace::Project),
            "augmented" => Ok(Namespace::Augmented),
            "consolidated" | "consolidatedindex" => Ok(Namespace::Consolidated),
            "events" | "eventcollection" => Ok(Namespace::Events),
            "meta" => Ok(Namespace::Meta),
            _ => Err(format!("Invalid Namespace: {}", s)),
        }
    }
}
