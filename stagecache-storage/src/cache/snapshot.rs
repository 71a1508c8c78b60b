//! Snapshot export/import for backups.
//!
//! A snapshot embeds every namespaced envelope as a JSON value. Importing
//! writes the blobs back verbatim; imported envelopes still face the normal
//! validity gates on load, so a snapshot from another version is harmless.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stagecache_core::{now_millis, CacheResult, EpochMillis, Namespace, StorageError, VersionStamp};
use tracing::{info, warn};

use super::stage_store::StageCache;
use super::traits::ByteStore;

/// Serializable dump of the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    pub exported_at: EpochMillis,
    /// Stamp of the process that exported the snapshot.
    pub stamp: VersionStamp,
    /// Byte store key -> envelope.
    pub entries: BTreeMap<String, Value>,
}

impl CacheSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<B: ByteStore> StageCache<B> {
    /// Collect every key that belongs to a namespace.
    ///
    /// Blobs that are not valid JSON are skipped. The version marker is not
    /// exported.
    pub async fn export_snapshot(&self) -> CacheResult<CacheSnapshot> {
        let mut entries = BTreeMap::new();
        for key in self.byte_store().list_keys().await? {
            let Some(namespace) = Namespace::classify(&key) else {
                continue;
            };
            let blob = if namespace.uses_singleton_tier() {
                self.byte_store().get_singleton(&key).await?
            } else {
                self.byte_store().get(&key).await?
            };
            let Some(blob) = blob else {
                continue;
            };
            match serde_json::from_slice::<Value>(&blob) {
                Ok(value) => {
                    entries.insert(key, value);
                }
                Err(e) => warn!(key = %key, error = %e, "skipping undecodable entry in snapshot"),
            }
        }
        Ok(CacheSnapshot {
            exported_at: now_millis(),
            stamp: self.current_stamp(),
            entries,
        })
    }

    /// Write every snapshot entry back, overwriting. Returns how many entries
    /// were written; keys outside every namespace are skipped.
    pub async fn import_snapshot(&self, snapshot: &CacheSnapshot) -> CacheResult<u64> {
        let mut written = 0u64;
        for (key, value) in &snapshot.entries {
            let Some(namespace) = Namespace::classify(key) else {
                warn!(key = %key, "skipping snapshot entry outside every namespace");
                continue;
            };
            let bytes = serde_json::to_vec(value).map_err(|e| StorageError::Serialization {
                reason: e.to_string(),
            })?;
            if namespace.uses_singleton_tier() {
                self.byte_store().set_singleton(key, bytes).await?;
            } else {
                self.byte_store().set(key, bytes).await?;
            }
            written += 1;
        }
        info!(written, source = %snapshot.stamp, "imported cache snapshot");
        Ok(written)
    }
}
