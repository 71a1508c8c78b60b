//! Versioned envelope cache for pipeline stage records.
//!
//! Every record is wrapped in an [`Envelope`] stamped with the producing app
//! version, schema revision, a content fingerprint and (raw kind only) the
//! source modification time. A stored envelope is reused only when all of
//! its active gates pass; anything else is deleted on first access.
//!
//! # Key Isolation
//!
//! [`CacheKey`] can only be built from a [`Namespace`](stagecache_core::Namespace),
//! so a stage store never addresses keys outside its own namespace.
//!
//! # Example
//!
//! ```ignore
//! let cache = StageCache::new(Arc::new(InMemoryByteStore::new()), VersionStamp::new("1.0.0", 1));
//!
//! cache.raw().store("a.md", items, FingerprintSource::Content(&text), Some(mtime)).await?;
//!
//! match cache.raw().load_fresh("a.md", FreshnessProbe::none().with_content(&text)).await? {
//!     CacheLookup::Hit(envelope) => reuse(envelope.payload),
//!     CacheLookup::Miss | CacheLookup::Evicted(_) => reparse(),
//! }
//!
//! // Schema bump: every older envelope is evicted lazily on its next load.
//! cache.update_current_version("1.0.0", Some(2)).await?;
//! ```

pub mod envelope;
pub mod lmdb_backend;
pub mod maintenance;
pub mod memory_backend;
pub mod namespace_key;
pub mod snapshot;
pub mod stage_store;
pub mod traits;
pub mod validity;

pub use envelope::{Envelope, FingerprintSource};
pub use lmdb_backend::{LmdbByteStore, LmdbStoreError};
pub use maintenance::VERSION_MARKER_KEY;
pub use memory_backend::InMemoryByteStore;
pub use namespace_key::CacheKey;
pub use snapshot::CacheSnapshot;
pub use stage_store::{
    AugmentedStage, ConsolidatedStage, EventStage, KeyedStore, MetaStage, ProjectStage, RawStage,
    SingletonStore, StageCache, StageKind,
};
pub use traits::{ByteStore, CacheStats, LookupStats};
pub use validity::{check_validity, is_valid, CacheLookup, EvictionReason, FreshnessProbe, Verdict};
