//! Byte store trait and cache statistics.
//!
//! The byte store is the durable key/blob layer under the envelope cache. It
//! knows nothing about envelopes, namespaces or versions.

use async_trait::async_trait;
use stagecache_core::{CacheResult, Namespace};
use std::collections::BTreeMap;

/// Durable key -> blob storage consumed by the stage stores.
///
/// # Singleton tier
///
/// `get_singleton`/`set_singleton` address a separate tier meant for large
/// whole-corpus records. Singleton names share the key space with regular
/// keys: `list_keys` reports both tiers, and `delete`/`clear_all` remove from
/// both. The default implementations store singletons in the regular tier.
///
/// # Concurrency
///
/// No compare-and-swap is offered. Concurrent writers to one key resolve as
/// last-write-wins, and `list_keys` is not a snapshot.
#[async_trait]
pub trait ByteStore: Send + Sync {
    /// Read the blob stored under `key`.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Write `bytes` under `key`, replacing any previous blob.
    async fn set(&self, key: &str, bytes: Vec<u8>) -> CacheResult<()>;

    /// Remove `key` from every tier. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Every key currently stored, across tiers.
    async fn list_keys(&self) -> CacheResult<Vec<String>>;

    /// Read a blob from the singleton tier.
    async fn get_singleton(&self, name: &str) -> CacheResult<Option<Vec<u8>>> {
        self.get(name).await
    }

    /// Write a blob to the singleton tier.
    async fn set_singleton(&self, name: &str, bytes: Vec<u8>) -> CacheResult<()> {
        self.set(name, bytes).await
    }

    /// Remove everything from every tier.
    async fn clear_all(&self) -> CacheResult<()>;
}

/// Key counts gathered in one pass over the byte store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Every key in the store, including keys that belong to no namespace.
    pub total_keys: u64,
    /// Keys per namespace. Namespaces with no keys are present with zero.
    pub per_namespace: BTreeMap<Namespace, u64>,
}

impl CacheStats {
    /// Stats with every namespace bucket initialised to zero.
    pub fn empty() -> Self {
        Self {
            total_keys: 0,
            per_namespace: Namespace::ALL.into_iter().map(|ns| (ns, 0)).collect(),
        }
    }

    /// Count for one namespace.
    pub fn count(&self, namespace: Namespace) -> u64 {
        self.per_namespace.get(&namespace).copied().unwrap_or(0)
    }

    /// Keys that matched some namespace.
    pub fn classified_keys(&self) -> u64 {
        self.per_namespace.values().sum()
    }

    /// Keys that matched no namespace (e.g. the version marker).
    pub fn unclassified_keys(&self) -> u64 {
        self.total_keys.saturating_sub(self.classified_keys())
    }
}

/// Process-local lookup counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupStats {
    /// Loads that returned a valid envelope.
    pub hits: u64,
    /// Loads that found nothing stored.
    pub misses: u64,
    /// Loads that found an envelope and evicted it.
    pub evictions: u64,
}

impl LookupStats {
    /// Calculate the hit rate (0.0 to 1.0). Evictions count as misses.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.evictions;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
