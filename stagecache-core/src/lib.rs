//! Stagecache Core - Shared Types
//!
//! Pure data structures shared by the storage layer and its callers: record
//! namespaces, version stamps, fingerprints, pipeline payload shapes, errors
//! and configuration. No I/O happens in this crate.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod model;
pub mod namespace;
pub mod version;

pub use config::CacheConfig;
pub use error::{CacheError, CacheResult, ConfigError, StorageError};
pub use fingerprint::{fingerprint_content, fingerprint_payload, Fingerprint};
pub use model::{
    AugmentedItem, ConsolidatedIndex, EventRecord, ExtractedItem, ItemStatus, ProjectRecord,
    ProjectRef, SourceLocation,
};
pub use namespace::{KeySpace, Namespace};
pub use version::{VersionChange, VersionMarker, VersionStamp, CURRENT_SCHEMA_REVISION};

/// Milliseconds since the Unix epoch, the unit of every timestamp in an envelope.
pub type EpochMillis = i64;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> EpochMillis {
    chrono::Utc::now().timestamp_millis()
}
