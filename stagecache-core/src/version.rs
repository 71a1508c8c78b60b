//! Application version and payload schema revision.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::EpochMillis;

/// Revision of the in-memory payload shapes. Bump whenever a payload type in
/// [`crate::model`] changes its serialized form.
pub const CURRENT_SCHEMA_REVISION: u32 = 1;

/// The (app version, schema revision) pair envelopes are validated against.
///
/// Validity is an exact match on both fields; there is no compatibility range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionStamp {
    pub app_version: String,
    pub schema_revision: u32,
}

impl VersionStamp {
    pub fn new(app_version: impl Into<String>, schema_revision: u32) -> Self {
        Self {
            app_version: app_version.into(),
            schema_revision,
        }
    }

    /// Stamp for the running build at the compiled-in schema revision.
    pub fn current() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"), CURRENT_SCHEMA_REVISION)
    }

    /// Copy of this stamp with a different app version and, optionally, schema.
    pub fn bumped(&self, app_version: impl Into<String>, schema_revision: Option<u32>) -> Self {
        Self {
            app_version: app_version.into(),
            schema_revision: schema_revision.unwrap_or(self.schema_revision),
        }
    }
}

impl fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@schema{}", self.app_version, self.schema_revision)
    }
}

/// Persisted record of the last stamp the cache ran under.
///
/// Informational only: validity decisions always use the in-memory stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMarker {
    pub app_version: String,
    pub schema_revision: u32,
    pub updated_at: EpochMillis,
}

impl VersionMarker {
    pub fn from_stamp(stamp: &VersionStamp, updated_at: EpochMillis) -> Self {
        Self {
            app_version: stamp.app_version.clone(),
            schema_revision: stamp.schema_revision,
            updated_at,
        }
    }

    pub fn stamp(&self) -> VersionStamp {
        VersionStamp::new(self.app_version.clone(), self.schema_revision)
    }
}

/// Outcome of comparing the persisted marker with the running stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionChange {
    /// No marker has ever been persisted.
    FirstRun,
    /// The marker matches the running stamp.
    Unchanged,
    /// The marker differs from the running stamp.
    Changed {
        previous: VersionStamp,
        current: VersionStamp,
    },
}

impl VersionChange {
    /// Compare an optional persisted marker against the running stamp.
    pub fn between(persisted: Option<&VersionMarker>, current: &VersionStamp) -> Self {
        match persisted {
            None => VersionChange::FirstRun,
            Some(marker) => {
                let previous = marker.stamp();
                if &previous == current {
                    VersionChange::Unchanged
                } else {
                    VersionChange::Changed {
                        previous,
                        current: current.clone(),
                    }
                }
            }
        }
    }

    /// True when the schema revision moved between runs.
    pub fn schema_changed(&self) -> bool {
        match self {
            VersionChange::Changed { previous, current } => {
                previous.schema_revision != current.schema_revision
            }
            _ => false,
        }
    }
}
