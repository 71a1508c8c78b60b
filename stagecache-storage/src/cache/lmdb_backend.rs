//! LMDB-backed byte store.
//!
//! Uses the heed crate (Rust bindings for LMDB) for a memory-mapped key/blob
//! store that survives restarts.
//!
//! # Tiers
//!
//! The environment holds three named databases:
//! - `records`: per-identifier envelopes, the event collection, meta values
//!   and the version marker
//! - `singletons`: the consolidated index
//! - `overflow`: entries of either tier whose key exceeds LMDB's key size
//!   limit
//!
//! `list_keys`, `delete` and `clear_all` span all three.
//!
//! # Long Keys
//!
//! LMDB rejects keys longer than [`MAX_KEY_BYTES`]. Such keys are stored in
//! `overflow` under `<tier>:<blake3 hex of the key>`, and the value is framed
//! as `[key length: u32 LE][key][blob]` so the original key can be listed and
//! checked on read.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. Reads use read transactions; every write
//! commits its own write transaction, so concurrent writers to one key
//! resolve as last-write-wins.

use std::borrow::Cow;
use std::path::Path;

use async_trait::async_trait;
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions, RoTxn};
use stagecache_core::{CacheError, CacheResult, StorageError};
use tracing::debug;

use super::traits::ByteStore;

const RECORDS_DB: &str = "records";
const SINGLETONS_DB: &str = "singletons";
const OVERFLOW_DB: &str = "overflow";

/// Longest key LMDB accepts with its default build settings.
pub const MAX_KEY_BYTES: usize = 511;

const FRAME_HEADER_BYTES: usize = 4;

/// Error type for LMDB byte store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// The requested map size does not fit in `usize` bytes.
    #[error("LMDB map size of {size_mb} MB overflows the address space")]
    MapSize { size_mb: usize },

    /// Failed to open a database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// An overflow entry whose frame cannot be decoded.
    #[error("Corrupt overflow entry: {0}")]
    CorruptOverflow(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbStoreError to CacheError.
impl From<LmdbStoreError> for CacheError {
    fn from(e: LmdbStoreError) -> Self {
        CacheError::Storage(StorageError::backend("lmdb", e))
    }
}

fn txn_err(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Transaction(e.to_string())
}

/// Which regular database a key addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Records,
    Singletons,
}

impl Tier {
    fn tag(self) -> &'static str {
        match self {
            Tier::Records => "r",
            Tier::Singletons => "s",
        }
    }
}

/// Overflow database key for a key too long for LMDB.
fn overflow_key(tier: Tier, key: &str) -> String {
    format!("{}:{}", tier.tag(), blake3::hash(key.as_bytes()).to_hex())
}

fn encode_frame(key: &str, blob: &[u8]) -> Result<Vec<u8>, LmdbStoreError> {
    let len = u32::try_from(key.len())
        .map_err(|_| LmdbStoreError::CorruptOverflow(format!("key of {} bytes", key.len())))?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_BYTES + key.len() + blob.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(key.as_bytes());
    frame.extend_from_slice(blob);
    Ok(frame)
}

fn decode_frame(frame: &[u8]) -> Result<(&str, &[u8]), LmdbStoreError> {
    let corrupt = |reason: &str| LmdbStoreError::CorruptOverflow(reason.to_string());
    let header: [u8; FRAME_HEADER_BYTES] = frame
        .get(..FRAME_HEADER_BYTES)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| corrupt("truncated header"))?;
    let key_end = FRAME_HEADER_BYTES + u32::from_le_bytes(header) as usize;
    let key_bytes = frame
        .get(FRAME_HEADER_BYTES..key_end)
        .ok_or_else(|| corrupt("truncated key"))?;
    let key = std::str::from_utf8(key_bytes).map_err(|_| corrupt("key is not utf-8"))?;
    Ok((key, &frame[key_end..]))
}

/// LMDB byte store with a separate singleton tier.
///
/// # Example
///
/// ```ignore
/// use stagecache_storage::cache::{ByteStore, LmdbByteStore};
///
/// let store = LmdbByteStore::new("/tmp/stagecache", 64)?;
/// store.set("raw:a.md", bytes).await?;
/// let blob = store.get("raw:a.md").await?;
/// ```
pub struct LmdbByteStore {
    /// The LMDB environment.
    env: Env,
    /// Per-identifier and small records.
    records: Database<Str, Bytes>,
    /// Large whole-corpus records.
    singletons: Database<Str, Bytes>,
    /// Framed entries whose key exceeds [`MAX_KEY_BYTES`].
    overflow: Database<Str, Bytes>,
}

impl LmdbByteStore {
    /// Open (or create) an LMDB byte store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the map in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The map size overflows `usize` bytes
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Any database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        let map_size = max_size_mb
            .checked_mul(1024 * 1024)
            .ok_or(LmdbStoreError::MapSize { size_mb: max_size_mb })?;

        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment directory is owned by this process; callers
        // must not open the same path twice within one process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(3)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;

        let mut create = |name: &str| -> Result<Database<Str, Bytes>, LmdbStoreError> {
            env.create_database(&mut wtxn, Some(name))
                .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))
        };
        let records = create(RECORDS_DB)?;
        let singletons = create(SINGLETONS_DB)?;
        let overflow = create(OVERFLOW_DB)?;

        wtxn.commit().map_err(txn_err)?;

        debug!(path = %path.as_ref().display(), max_size_mb, "opened lmdb byte store");

        Ok(Self {
            env,
            records,
            singletons,
            overflow,
        })
    }

    fn db(&self, tier: Tier) -> Database<Str, Bytes> {
        match tier {
            Tier::Records => self.records,
            Tier::Singletons => self.singletons,
        }
    }

    fn read(&self, tier: Tier, key: &str) -> Result<Option<Vec<u8>>, LmdbStoreError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        if key.len() <= MAX_KEY_BYTES {
            let value = self.db(tier).get(&rtxn, key).map_err(txn_err)?;
            return Ok(value.map(<[u8]>::to_vec));
        }
        let Some(frame) = self
            .overflow
            .get(&rtxn, &overflow_key(tier, key))
            .map_err(txn_err)?
        else {
            return Ok(None);
        };
        let (stored_key, blob) = decode_frame(frame)?;
        Ok((stored_key == key).then(|| blob.to_vec()))
    }

    fn write(&self, tier: Tier, key: &str, bytes: &[u8]) -> Result<(), LmdbStoreError> {
        let (db, physical, value) = if key.len() <= MAX_KEY_BYTES {
            (self.db(tier), Cow::Borrowed(key), Cow::Borrowed(bytes))
        } else {
            (
                self.overflow,
                Cow::Owned(overflow_key(tier, key)),
                Cow::Owned(encode_frame(key, bytes)?),
            )
        };
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        db.put(&mut wtxn, &physical, &value).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    fn collect_keys(
        &self,
        rtxn: &RoTxn<'_>,
        db: Database<Str, Bytes>,
        keys: &mut Vec<String>,
    ) -> Result<(), LmdbStoreError> {
        for entry in db.iter(rtxn).map_err(txn_err)? {
            let (key, _) = entry.map_err(txn_err)?;
            keys.push(key.to_string());
        }
        Ok(())
    }

    fn collect_overflow_keys(&self, rtxn: &RoTxn<'_>, keys: &mut Vec<String>) -> Result<(), LmdbStoreError> {
        for entry in self.overflow.iter(rtxn).map_err(txn_err)? {
            let (_, frame) = entry.map_err(txn_err)?;
            let (key, _) = decode_frame(frame)?;
            keys.push(key.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl ByteStore for LmdbByteStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.read(Tier::Records, key)?)
    }

    async fn set(&self, key: &str, bytes: Vec<u8>) -> CacheResult<()> {
        Ok(self.write(Tier::Records, key, &bytes)?)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        if key.len() <= MAX_KEY_BYTES {
            self.records.delete(&mut wtxn, key).map_err(txn_err)?;
            self.singletons.delete(&mut wtxn, key).map_err(txn_err)?;
        } else {
            for tier in [Tier::Records, Tier::Singletons] {
                self.overflow
                    .delete(&mut wtxn, &overflow_key(tier, key))
                    .map_err(txn_err)?;
            }
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn list_keys(&self) -> CacheResult<Vec<String>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut keys = Vec::new();
        self.collect_keys(&rtxn, self.records, &mut keys)?;
        self.collect_keys(&rtxn, self.singletons, &mut keys)?;
        self.collect_overflow_keys(&rtxn, &mut keys)?;
        Ok(keys)
    }

    async fn get_singleton(&self, name: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.read(Tier::Singletons, name)?)
    }

    async fn set_singleton(&self, name: &str, bytes: Vec<u8>) -> CacheResult<()> {
        Ok(self.write(Tier::Singletons, name, &bytes)?)
    }

    async fn clear_all(&self) -> CacheResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.records.clear(&mut wtxn).map_err(txn_err)?;
        self.singletons.clear(&mut wtxn).map_err(txn_err)?;
        self.overflow.clear(&mut wtxn).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbByteStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbByteStore::new(temp_dir.path(), 10).expect("store creation should succeed");
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (store, _temp_dir) = create_test_store();

        store
            .set("raw:a.md", b"payload".to_vec())
            .await
            .expect("set should succeed");

        let value = store.get("raw:a.md").await.expect("get should succeed");
        assert_eq!(value, Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.get("raw:none").await.expect("get should succeed").is_none());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let (store, _temp_dir) = create_test_store();

        store.set("meta:k", b"one".to_vec()).await.expect("set should succeed");
        store.set("meta:k", b"two".to_vec()).await.expect("set should succeed");

        let value = store.get("meta:k").await.expect("get should succeed");
        assert_eq!(value, Some(b"two".to_vec()));
        assert_eq!(store.list_keys().await.expect("list should succeed").len(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _temp_dir) = create_test_store();

        store.set("raw:a.md", vec![1]).await.expect("set should succeed");
        store.delete("raw:a.md").await.expect("delete should succeed");
        store.delete("raw:a.md").await.expect("second delete should succeed");

        assert!(store.get("raw:a.md").await.expect("get should succeed").is_none());
    }

    #[tokio::test]
    async fn test_singleton_tier() {
        let (store, _temp_dir) = create_test_store();

        store
            .set_singleton("consolidated-index", b"{}".to_vec())
            .await
            .expect("set_singleton should succeed");

        assert!(store
            .get("consolidated-index")
            .await
            .expect("get should succeed")
            .is_none());
        assert_eq!(
            store
                .get_singleton("consolidated-index")
                .await
                .expect("get_singleton should succeed"),
            Some(b"{}".to_vec())
        );

        let keys = store.list_keys().await.expect("list should succeed");
        assert_eq!(keys, vec!["consolidated-index".to_string()]);

        store
            .delete("consolidated-index")
            .await
            .expect("delete should succeed");
        assert!(store
            .get_singleton("consolidated-index")
            .await
            .expect("get_singleton should succeed")
            .is_none());
    }

    #[tokio::test]
    async fn test_clear_all() {
        let (store, _temp_dir) = create_test_store();

        for i in 0..5 {
            store
                .set(&format!("raw:{}.md", i), vec![i as u8])
                .await
                .expect("set should succeed");
        }
        store
            .set_singleton("consolidated-index", vec![0])
            .await
            .expect("set_singleton should succeed");

        store.clear_all().await.expect("clear should succeed");
        assert!(store.list_keys().await.expect("list should succeed").is_empty());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let store =
                LmdbByteStore::new(temp_dir.path(), 10).expect("store creation should succeed");
            store.set("raw:a.md", vec![7]).await.expect("set should succeed");
        }
        let reopened =
            LmdbByteStore::new(temp_dir.path(), 10).expect("store reopen should succeed");
        assert_eq!(
            reopened.get("raw:a.md").await.expect("get should succeed"),
            Some(vec![7])
        );
    }

    #[tokio::test]
    async fn test_long_keys_use_overflow() {
        let (store, _temp_dir) = create_test_store();
        let long_key = format!("raw:{}/a.md", "deep".repeat(150));
        assert!(long_key.len() > MAX_KEY_BYTES);

        store
            .set(&long_key, b"payload".to_vec())
            .await
            .expect("set should succeed");
        assert_eq!(
            store.get(&long_key).await.expect("get should succeed"),
            Some(b"payload".to_vec())
        );
        assert!(store
            .get_singleton(&long_key)
            .await
            .expect("get_singleton should succeed")
            .is_none());
        assert_eq!(
            store.list_keys().await.expect("list should succeed"),
            vec![long_key.clone()]
        );

        store.set(&long_key, b"second".to_vec()).await.expect("overwrite should succeed");
        assert_eq!(
            store.get(&long_key).await.expect("get should succeed"),
            Some(b"second".to_vec())
        );
        assert_eq!(store.list_keys().await.expect("list should succeed").len(), 1);

        store.delete(&long_key).await.expect("delete should succeed");
        assert!(store.get(&long_key).await.expect("get should succeed").is_none());
        assert!(store.list_keys().await.expect("list should succeed").is_empty());
    }

    #[tokio::test]
    async fn test_key_at_limit_stays_in_records() {
        let (store, _temp_dir) = create_test_store();
        let key = format!("raw:{}", "k".repeat(MAX_KEY_BYTES - 4));
        assert_eq!(key.len(), MAX_KEY_BYTES);

        store.set(&key, vec![1]).await.expect("set should succeed");
        assert_eq!(store.get(&key).await.expect("get should succeed"), Some(vec![1]));
        assert_eq!(store.list_keys().await.expect("list should succeed"), vec![key]);
    }

    #[tokio::test]
    async fn test_clear_all_includes_overflow() {
        let (store, _temp_dir) = create_test_store();
        let long_key = format!("meta:{}", "x".repeat(700));
        store.set(&long_key, vec![1]).await.expect("set should succeed");
        store
            .set_singleton(&long_key, vec![2])
            .await
            .expect("set_singleton should succeed");
        assert_eq!(store.list_keys().await.expect("list should succeed").len(), 2);

        store.clear_all().await.expect("clear should succeed");
        assert!(store.list_keys().await.expect("list should succeed").is_empty());
    }

    #[test]
    fn test_frame_roundtrip_and_truncation() {
        let frame = encode_frame("raw:a.md", b"blob").expect("encode should succeed");
        let (key, blob) = decode_frame(&frame).expect("decode should succeed");
        assert_eq!(key, "raw:a.md");
        assert_eq!(blob, b"blob");

        assert!(matches!(
            decode_frame(&frame[..6]),
            Err(LmdbStoreError::CorruptOverflow(_))
        ));
        assert!(decode_frame(&[1, 0]).is_err());
    }

    #[test]
    fn test_overflowing_map_size_is_rejected() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let result = LmdbByteStore::new(temp_dir.path(), usize::MAX);
        assert!(matches!(result, Err(LmdbStoreError::MapSize { .. })));
    }
}
