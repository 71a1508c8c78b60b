//! Namespace-wide maintenance and version hooks.

use stagecache_core::{
    now_millis, CacheResult, ConfigError, Namespace, StorageError, VersionChange, VersionMarker,
    VersionStamp,
};
use tracing::{debug, info, warn};

use super::namespace_key::CacheKey;
use super::stage_store::StageCache;
use super::traits::{ByteStore, CacheStats};

/// Reserved key for the persisted version marker. It belongs to no namespace.
pub const VERSION_MARKER_KEY: &str = "stagecache-version";

impl<B: ByteStore> StageCache<B> {
    /// Identifiers stored under a keyed namespace, sorted.
    ///
    /// Singleton namespaces have no identifiers and return an empty list.
    /// Not a snapshot: concurrent writes may or may not be reflected.
    pub async fn list_identifiers(&self, namespace: Namespace) -> CacheResult<Vec<String>> {
        if !namespace.is_keyed() {
            return Ok(Vec::new());
        }
        let mut identifiers: Vec<String> = self
            .byte_store()
            .list_keys()
            .await?
            .iter()
            .filter_map(|key| CacheKey::strip_namespace(namespace, key))
            .map(str::to_string)
            .collect();
        identifiers.sort();
        Ok(identifiers)
    }

    /// Delete every key under `namespace`, returning how many were removed.
    pub async fn clear_namespace(&self, namespace: Namespace) -> CacheResult<u64> {
        let keys = self.byte_store().list_keys().await?;
        let space = namespace.key_space();
        let mut removed = 0u64;
        for key in keys.iter().filter(|key| space.contains(key)) {
            self.byte_store().delete(key).await?;
            removed += 1;
        }
        info!(namespace = %namespace, removed, "cleared cache namespace");
        Ok(removed)
    }

    /// Empty the byte store, version marker included.
    pub async fn clear_all(&self) -> CacheResult<()> {
        self.byte_store().clear_all().await?;
        info!("cleared entire cache");
        Ok(())
    }

    /// Remove the raw, project and augmented envelopes for one identifier.
    pub async fn clear_identifier(&self, identifier: &str) -> CacheResult<()> {
        for namespace in Namespace::per_source() {
            let key = CacheKey::keyed(namespace, identifier);
            self.byte_store().delete(key.as_str()).await?;
        }
        debug!(identifier, "cleared per-source cache entries");
        Ok(())
    }

    /// Key counts in one pass over the byte store.
    ///
    /// Keys matching no namespace count toward `total_keys` only.
    pub async fn stats(&self) -> CacheResult<CacheStats> {
        let keys = self.byte_store().list_keys().await?;
        let mut stats = CacheStats::empty();
        stats.total_keys = keys.len() as u64;
        for namespace in keys.iter().filter_map(|key| Namespace::classify(key)) {
            *stats.per_namespace.entry(namespace).or_insert(0) += 1;
        }
        Ok(stats)
    }

    /// Switch the running version (and optionally schema) and persist it.
    ///
    /// The in-memory stamp changes first and stays changed even if the marker
    /// write fails: validity follows the running code, the marker is
    /// informational. A blank `app_version` is rejected before anything
    /// changes.
    pub async fn update_current_version(
        &self,
        app_version: &str,
        schema_revision: Option<u32>,
    ) -> CacheResult<VersionStamp> {
        if app_version.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "app_version".to_string(),
            }
            .into());
        }
        let previous = self.current_stamp();
        let next = previous.bumped(app_version, schema_revision);
        self.replace_stamp(next.clone());
        self.persist_version_marker(&next).await?;
        info!(previous = %previous, current = %next, "updated cache version");
        Ok(next)
    }

    /// Persist the running stamp as the version marker without changing it.
    pub async fn record_current_version(&self) -> CacheResult<()> {
        let stamp = self.current_stamp();
        self.persist_version_marker(&stamp).await
    }

    /// The marker persisted by a previous run, if any.
    ///
    /// An unreadable marker is reported as absent. The result never feeds a
    /// validity decision.
    pub async fn load_persisted_version(&self) -> CacheResult<Option<VersionMarker>> {
        let Some(bytes) = self.byte_store().get(VERSION_MARKER_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_slice::<VersionMarker>(&bytes) {
            Ok(marker) => Ok(Some(marker)),
            Err(e) => {
                warn!(key = VERSION_MARKER_KEY, error = %e, "ignoring unreadable version marker");
                Ok(None)
            }
        }
    }

    /// Compare the persisted marker with the running stamp.
    pub async fn detect_version_change(&self) -> CacheResult<VersionChange> {
        let persisted = self.load_persisted_version().await?;
        Ok(VersionChange::between(
            persisted.as_ref(),
            &self.current_stamp(),
        ))
    }

    async fn persist_version_marker(&self, stamp: &VersionStamp) -> CacheResult<()> {
        let marker = VersionMarker::from_stamp(stamp, now_millis());
        let bytes = serde_json::to_vec(&marker).map_err(|e| StorageError::Serialization {
            reason: e.to_string(),
        })?;
        self.byte_store().set(VERSION_MARKER_KEY, bytes).await
    }
}
