//! Cache Configuration
//!
//! Knobs for the cache layer itself. Values come from environment variables
//! with defaults suitable for local development.

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::version::{VersionStamp, CURRENT_SCHEMA_REVISION};

/// Default LMDB map size in megabytes.
const DEFAULT_LMDB_MAP_SIZE_MB: usize = 64;

const BYTES_PER_MB: usize = 1024 * 1024;

/// Configuration for the staged cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Application version envelopes are stamped with and validated against.
    pub app_version: String,

    /// Payload schema revision envelopes are stamped with and validated against.
    pub schema_revision: u32,

    /// Directory of the LMDB environment. `None` selects the in-memory store.
    pub lmdb_path: Option<PathBuf>,

    /// Maximum LMDB map size in megabytes.
    pub lmdb_map_size_mb: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            schema_revision: CURRENT_SCHEMA_REVISION,
            lmdb_path: None,
            lmdb_map_size_mb: DEFAULT_LMDB_MAP_SIZE_MB,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create CacheConfig from environment variables.
    ///
    /// Environment variables:
    /// - `STAGECACHE_APP_VERSION`: Version stamp (default: crate version)
    /// - `STAGECACHE_SCHEMA_REVISION`: Schema revision (default: compiled-in revision)
    /// - `STAGECACHE_LMDB_PATH`: LMDB directory (default: unset, in-memory)
    /// - `STAGECACHE_LMDB_MAP_SIZE_MB`: LMDB map size (default: 64)
    ///
    /// Unparseable numbers fall back to their defaults; run [`Self::validate`]
    /// to reject values that parse but make no sense.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let app_version = std::env::var("STAGECACHE_APP_VERSION")
            .ok()
            .map(|s| s.trim().to_string())
            .unwrap_or(defaults.app_version);

        let schema_revision = std::env::var("STAGECACHE_SCHEMA_REVISION")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.schema_revision);

        let lmdb_path = std::env::var("STAGECACHE_LMDB_PATH")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let lmdb_map_size_mb = std::env::var("STAGECACHE_LMDB_MAP_SIZE_MB")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.lmdb_map_size_mb);

        Self {
            app_version,
            schema_revision,
            lmdb_path,
            lmdb_map_size_mb,
        }
    }

    pub fn with_app_version(mut self, app_version: impl Into<String>) -> Self {
        self.app_version = app_version.into();
        self
    }

    pub fn with_schema_revision(mut self, schema_revision: u32) -> Self {
        self.schema_revision = schema_revision;
        self
    }

    pub fn with_lmdb_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lmdb_path = Some(path.into());
        self
    }

    pub fn with_map_size_mb(mut self, size_mb: usize) -> Self {
        self.lmdb_map_size_mb = size_mb;
        self
    }

    /// Reject configurations the cache cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_version.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "app_version".to_string(),
            });
        }
        if self.lmdb_map_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "lmdb_map_size_mb".to_string(),
                value: self.lmdb_map_size_mb.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.lmdb_map_size_bytes().is_none() {
            return Err(ConfigError::InvalidValue {
                field: "lmdb_map_size_mb".to_string(),
                value: self.lmdb_map_size_mb.to_string(),
                reason: "exceeds the addressable map size".to_string(),
            });
        }
        Ok(())
    }

    /// The LMDB map size in bytes, or `None` when it overflows `usize`.
    pub fn lmdb_map_size_bytes(&self) -> Option<usize> {
        self.lmdb_map_size_mb.checked_mul(BYTES_PER_MB)
    }

    /// The stamp envelopes are written and validated under.
    pub fn version_stamp(&self) -> VersionStamp {
        VersionStamp::new(self.app_version.clone(), self.schema_revision)
    }
}
