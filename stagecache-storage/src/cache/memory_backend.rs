//! In-memory byte store.
//!
//! Used for tests and for runs without a configured LMDB path. Keeps the same
//! two-tier layout as the LMDB backend so singleton semantics match.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use stagecache_core::{CacheResult, StorageError};

use super::traits::ByteStore;

#[derive(Debug, Default)]
struct Tiers {
    records: BTreeMap<String, Vec<u8>>,
    singletons: BTreeMap<String, Vec<u8>>,
}

/// `ByteStore` backed by two ordered maps behind a lock.
#[derive(Debug, Default)]
pub struct InMemoryByteStore {
    tiers: RwLock<Tiers>,
}

impl InMemoryByteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys across both tiers.
    pub fn len(&self) -> usize {
        let tiers = match self.tiers.read() {
            Ok(tiers) => tiers,
            Err(poisoned) => poisoned.into_inner(),
        };
        tiers.records.len() + tiers.singletons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ByteStore for InMemoryByteStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let tiers = self.tiers.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tiers.records.get(key).cloned())
    }

    async fn set(&self, key: &str, bytes: Vec<u8>) -> CacheResult<()> {
        let mut tiers = self.tiers.write().map_err(|_| StorageError::LockPoisoned)?;
        tiers.records.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut tiers = self.tiers.write().map_err(|_| StorageError::LockPoisoned)?;
        tiers.records.remove(key);
        tiers.singletons.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> CacheResult<Vec<String>> {
        let tiers = self.tiers.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tiers
            .records
            .keys()
            .chain(tiers.singletons.keys())
            .cloned()
            .collect())
    }

    async fn get_singleton(&self, name: &str) -> CacheResult<Option<Vec<u8>>> {
        let tiers = self.tiers.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tiers.singletons.get(name).cloned())
    }

    async fn set_singleton(&self, name: &str, bytes: Vec<u8>) -> CacheResult<()> {
        let mut tiers = self.tiers.write().map_err(|_| StorageError::LockPoisoned)?;
        tiers.singletons.insert(name.to_string(), bytes);
        Ok(())
    }

    async fn clear_all(&self) -> CacheResult<()> {
        let mut tiers = self.tiers.write().map_err(|_| StorageError::LockPoisoned)?;
        tiers.records.clear();
        tiers.singletons.clear();
        Ok(())
    }
}
