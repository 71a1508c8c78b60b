//! Validity checks and lookup outcomes.
//!
//! Three independent staleness gates decide whether an envelope may be
//! reused: exact version/schema match, source modification time (raw kind
//! only) and content fingerprint. Gates run in that order and the first
//! failure wins.

use stagecache_core::{fingerprint_content, EpochMillis, Fingerprint, VersionStamp};
use std::fmt;

use super::envelope::Envelope;

/// Fresh inputs a caller can offer to tighten a validity check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreshnessProbe<'a> {
    /// Current source content; its fingerprint must match the stored one.
    pub content: Option<&'a str>,
    /// Current source modification time; must match on kinds with an mtime gate.
    pub modified_at: Option<EpochMillis>,
}

impl<'a> FreshnessProbe<'a> {
    /// Probe that checks version and schema only.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_content(mut self, content: &'a str) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_modified_at(mut self, modified_at: EpochMillis) -> Self {
        self.modified_at = Some(modified_at);
        self
    }

    /// Fingerprint of the offered content, if any.
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.content.map(fingerprint_content)
    }
}

/// Why an envelope was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    AppVersion,
    SchemaRevision,
    SourceModified,
    Fingerprint,
    /// The blob could not be decoded as an envelope of the expected shape.
    Corrupt,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            EvictionReason::AppVersion => "app_version_mismatch",
            EvictionReason::SchemaRevision => "schema_revision_mismatch",
            EvictionReason::SourceModified => "source_modified",
            EvictionReason::Fingerprint => "fingerprint_mismatch",
            EvictionReason::Corrupt => "corrupt",
        };
        write!(f, "{}", value)
    }
}

/// Result of running the gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Stale(EvictionReason),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

/// Run every applicable gate against an envelope.
///
/// `mtime_gate` says whether the record kind carries a modification-time
/// gate; the gate only fires when both sides supply a time.
pub fn check_validity<T>(
    envelope: &Envelope<T>,
    current: &VersionStamp,
    fresh_fingerprint: Option<&Fingerprint>,
    fresh_modified_at: Option<EpochMillis>,
    mtime_gate: bool,
) -> Verdict {
    if envelope.app_version != current.app_version {
        return Verdict::Stale(EvictionReason::AppVersion);
    }
    if envelope.schema_revision != current.schema_revision {
        return Verdict::Stale(EvictionReason::SchemaRevision);
    }
    if mtime_gate {
        if let (Some(stored), Some(fresh)) = (envelope.source_modified_at, fresh_modified_at) {
            if stored != fresh {
                return Verdict::Stale(EvictionReason::SourceModified);
            }
        }
    }
    if let Some(fresh) = fresh_fingerprint {
        if &envelope.fingerprint != fresh {
            return Verdict::Stale(EvictionReason::Fingerprint);
        }
    }
    Verdict::Valid
}

/// Boolean form of [`check_validity`].
pub fn is_valid<T>(
    envelope: &Envelope<T>,
    current: &VersionStamp,
    fresh_fingerprint: Option<&Fingerprint>,
    fresh_modified_at: Option<EpochMillis>,
    mtime_gate: bool,
) -> bool {
    check_validity(envelope, current, fresh_fingerprint, fresh_modified_at, mtime_gate).is_valid()
}

/// Outcome of a stage store load.
///
/// Keeps "never cached" apart from "cached but discarded".
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    /// A valid envelope.
    Hit(Envelope<T>),
    /// Nothing stored under the key.
    Miss,
    /// Something was stored but failed a gate or could not be decoded; it
    /// has been removed.
    Evicted(EvictionReason),
}

impl<T> CacheLookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, CacheLookup::Miss)
    }

    pub fn is_evicted(&self) -> bool {
        matches!(self, CacheLookup::Evicted(_))
    }

    /// The eviction reason, if the lookup evicted.
    pub fn eviction_reason(&self) -> Option<EvictionReason> {
        match self {
            CacheLookup::Evicted(reason) => Some(*reason),
            _ => None,
        }
    }

    /// The envelope on a hit, `None` otherwise.
    pub fn into_envelope(self) -> Option<Envelope<T>> {
        match self {
            CacheLookup::Hit(envelope) => Some(envelope),
            _ => None,
        }
    }

    /// The payload on a hit, `None` otherwise.
    pub fn into_payload(self) -> Option<T> {
        self.into_envelope().map(Envelope::into_payload)
    }

    /// Map the payload of a hit.
    pub fn map<U, F>(self, f: F) -> CacheLookup<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            CacheLookup::Hit(envelope) => CacheLookup::Hit(envelope.map(f)),
            CacheLookup::Miss => CacheLookup::Miss,
            CacheLookup::Evicted(reason) => CacheLookup::Evicted(reason),
        }
    }
}
