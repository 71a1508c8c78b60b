//! Stagecache Storage - Versioned Stage Cache
//!
//! Persistence and validity layer for pipeline stage records. The durable
//! key/blob layer is abstracted behind [`ByteStore`]; an LMDB-backed and an
//! in-memory implementation are provided.

pub mod cache;

pub use cache::{
    check_validity, is_valid, ByteStore, CacheKey, CacheLookup, CacheSnapshot, CacheStats,
    Envelope, EvictionReason, FingerprintSource, FreshnessProbe, InMemoryByteStore, KeyedStore,
    LmdbByteStore, LmdbStoreError, LookupStats, SingletonStore, StageCache, StageKind, Verdict,
    VERSION_MARKER_KEY,
};

use std::sync::Arc;

use stagecache_core::{CacheConfig, CacheResult};
use tracing::info;

/// Open an LMDB-backed cache at the configured path.
///
/// Returns `Ok(None)` when no LMDB path is configured so callers can fall
/// back to [`open_in_memory`].
pub fn open_lmdb(config: &CacheConfig) -> CacheResult<Option<StageCache<LmdbByteStore>>> {
    config.validate()?;
    let Some(path) = config.lmdb_path.as_deref() else {
        return Ok(None);
    };
    let store = LmdbByteStore::new(path, config.lmdb_map_size_mb)?;
    info!(path = %path.display(), stamp = %config.version_stamp(), "opened lmdb stage cache");
    Ok(Some(StageCache::from_config(Arc::new(store), config)?))
}

/// Open an in-memory cache under the configured version stamp.
pub fn open_in_memory(config: &CacheConfig) -> CacheResult<StageCache<InMemoryByteStore>> {
    StageCache::from_config(Arc::new(InMemoryByteStore::new()), config)
}
