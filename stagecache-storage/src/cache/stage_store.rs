//! Stage stores over the envelope format.
//!
//! [`StageCache`] owns the byte store and the running [`VersionStamp`]. Each
//! pipeline stage is reached through a typed view ([`KeyedStore`] or
//! [`SingletonStore`]) whose payload type is fixed by its [`StageKind`], so a
//! store can only ever decode its own payload shape.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use stagecache_core::{
    AugmentedItem, CacheConfig, CacheResult, ConsolidatedIndex, EpochMillis, EventRecord,
    ExtractedItem, Namespace, ProjectRecord, VersionStamp,
};
use tracing::{debug, warn};

use super::envelope::{Envelope, FingerprintSource};
use super::namespace_key::CacheKey;
use super::traits::{ByteStore, LookupStats};
use super::validity::{check_validity, CacheLookup, EvictionReason, FreshnessProbe, Verdict};

/// A pipeline stage: its namespace and payload shape.
pub trait StageKind: Send + Sync + 'static {
    type Payload: Serialize + DeserializeOwned + Send + Sync;

    const NAMESPACE: Namespace;
}

/// Items extracted from one source document.
pub struct RawStage;

impl StageKind for RawStage {
    type Payload = Vec<ExtractedItem>;
    const NAMESPACE: Namespace = Namespace::Raw;
}

/// Project resolution for one source document.
pub struct ProjectStage;

impl StageKind for ProjectStage {
    type Payload = ProjectRecord;
    const NAMESPACE: Namespace = Namespace::Project;
}

/// Fully augmented items for one source document.
pub struct AugmentedStage;

impl StageKind for AugmentedStage {
    type Payload = Vec<AugmentedItem>;
    const NAMESPACE: Namespace = Namespace::Augmented;
}

/// The consolidated index.
pub struct ConsolidatedStage;

impl StageKind for ConsolidatedStage {
    type Payload = ConsolidatedIndex;
    const NAMESPACE: Namespace = Namespace::Consolidated;
}

/// The event collection.
pub struct EventStage;

impl StageKind for EventStage {
    type Payload = Vec<EventRecord>;
    const NAMESPACE: Namespace = Namespace::Events;
}

/// Small JSON values under arbitrary keys.
pub struct MetaStage;

impl StageKind for MetaStage {
    type Payload = Value;
    const NAMESPACE: Namespace = Namespace::Meta;
}

#[derive(Debug, Default)]
struct LookupCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl LookupCounters {
    fn snapshot(&self) -> LookupStats {
        LookupStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

/// Versioned cache for every pipeline stage.
///
/// # Example
///
/// ```ignore
/// let cache = StageCache::new(Arc::new(InMemoryByteStore::new()), VersionStamp::new("1.0.0", 1));
///
/// cache.raw().store("a.md", items, FingerprintSource::Content(&text), Some(mtime)).await?;
///
/// let probe = FreshnessProbe::none().with_content(&text).with_modified_at(mtime);
/// if let Some(items) = cache.raw().load_fresh("a.md", probe).await?.into_payload() {
///     // reuse
/// }
/// ```
pub struct StageCache<B: ByteStore> {
    store: Arc<B>,
    current: RwLock<VersionStamp>,
    counters: LookupCounters,
}

impl<B: ByteStore> StageCache<B> {
    /// Create a cache validating against `stamp`.
    pub fn new(store: Arc<B>, stamp: VersionStamp) -> Self {
        Self {
            store,
            current: RwLock::new(stamp),
            counters: LookupCounters::default(),
        }
    }

    /// Create a cache from configuration, rejecting invalid settings.
    pub fn from_config(store: Arc<B>, config: &CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        Ok(Self::new(store, config.version_stamp()))
    }

    /// The stamp envelopes are currently written and validated under.
    pub fn current_stamp(&self) -> VersionStamp {
        match self.current.read() {
            Ok(stamp) => stamp.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn replace_stamp(&self, stamp: VersionStamp) {
        match self.current.write() {
            Ok(mut current) => *current = stamp,
            Err(poisoned) => *poisoned.into_inner() = stamp,
        }
    }

    /// The underlying byte store.
    pub fn byte_store(&self) -> &B {
        &self.store
    }

    /// Hit / miss / eviction counts since creation or the last reset.
    pub fn lookup_stats(&self) -> LookupStats {
        self.counters.snapshot()
    }

    pub fn reset_lookup_stats(&self) {
        self.counters.reset();
    }

    pub fn raw(&self) -> KeyedStore<'_, B, RawStage> {
        KeyedStore::new(self)
    }

    pub fn project(&self) -> KeyedStore<'_, B, ProjectStage> {
        KeyedStore::new(self)
    }

    pub fn augmented(&self) -> KeyedStore<'_, B, AugmentedStage> {
        KeyedStore::new(self)
    }

    pub fn meta(&self) -> KeyedStore<'_, B, MetaStage> {
        KeyedStore::new(self)
    }

    pub fn consolidated(&self) -> SingletonStore<'_, B, ConsolidatedStage> {
        SingletonStore::new(self)
    }

    pub fn events(&self) -> SingletonStore<'_, B, EventStage> {
        SingletonStore::new(self)
    }

    async fn read_blob(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        if key.namespace().uses_singleton_tier() {
            self.store.get_singleton(key.as_str()).await
        } else {
            self.store.get(key.as_str()).await
        }
    }

    async fn write_blob(&self, key: &CacheKey, bytes: Vec<u8>) -> CacheResult<()> {
        if key.namespace().uses_singleton_tier() {
            self.store.set_singleton(key.as_str(), bytes).await
        } else {
            self.store.set(key.as_str(), bytes).await
        }
    }

    /// Delete a key as part of a load. Failures are logged, not returned: the
    /// caller already gets a non-hit and the entry is retried next load.
    async fn evict(&self, key: &CacheKey, reason: EvictionReason) {
        self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        match self.store.delete(key.as_str()).await {
            Ok(()) => debug!(key = %key, reason = %reason, "evicted cache entry"),
            Err(e) => warn!(key = %key, reason = %reason, error = %e, "failed to evict cache entry"),
        }
    }

    async fn load_key<P: DeserializeOwned>(
        &self,
        key: &CacheKey,
        probe: FreshnessProbe<'_>,
    ) -> CacheResult<CacheLookup<P>> {
        let Some(bytes) = self.read_blob(key).await? else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "cache miss");
            return Ok(CacheLookup::Miss);
        };

        let envelope = match Envelope::<P>::from_bytes(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(key = %key, error = %e, "discarding undecodable cache entry");
                let reason = EvictionReason::Corrupt;
                self.evict(key, reason).await;
                return Ok(CacheLookup::Evicted(reason));
            }
        };

        let current = self.current_stamp();
        let fresh_fingerprint = probe.fingerprint();
        let verdict = check_validity(
            &envelope,
            &current,
            fresh_fingerprint.as_ref(),
            probe.modified_at,
            key.namespace().has_mtime_gate(),
        );

        match verdict {
            Verdict::Valid => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "cache hit");
                Ok(CacheLookup::Hit(envelope))
            }
            Verdict::Stale(reason) => {
                debug!(
                    key = %key,
                    reason = %reason,
                    stored = %envelope.stamp(),
                    current = %current,
                    "stale cache entry"
                );
                self.evict(key, reason).await;
                Ok(CacheLookup::Evicted(reason))
            }
        }
    }

    async fn store_key<P: Serialize>(
        &self,
        key: &CacheKey,
        payload: P,
        source: FingerprintSource<'_>,
        source_modified_at: Option<EpochMillis>,
    ) -> CacheResult<Envelope<P>> {
        let source_modified_at = if key.namespace().has_mtime_gate() {
            source_modified_at
        } else {
            None
        };
        let envelope = Envelope::wrap(payload, &self.current_stamp(), source, source_modified_at)?;
        let bytes = envelope.to_bytes()?;
        let size = bytes.len();
        self.write_blob(key, bytes).await?;
        debug!(key = %key, size, fingerprint = %envelope.fingerprint, "stored cache entry");
        Ok(envelope)
    }

    async fn remove_key(&self, key: &CacheKey) -> CacheResult<()> {
        self.store.delete(key.as_str()).await?;
        debug!(key = %key, "removed cache entry");
        Ok(())
    }
}

/// Typed view over one keyed namespace (raw, project, augmented, meta).
pub struct KeyedStore<'a, B: ByteStore, K: StageKind> {
    cache: &'a StageCache<B>,
    _kind: PhantomData<K>,
}

impl<'a, B: ByteStore, K: StageKind> KeyedStore<'a, B, K> {
    fn new(cache: &'a StageCache<B>) -> Self {
        Self {
            cache,
            _kind: PhantomData,
        }
    }

    pub fn namespace(&self) -> Namespace {
        K::NAMESPACE
    }

    /// The byte store key for `identifier`.
    pub fn key(&self, identifier: &str) -> CacheKey {
        CacheKey::keyed(K::NAMESPACE, identifier)
    }

    /// Load under the current version/schema only.
    ///
    /// An envelope from another version or schema, or one that cannot be
    /// decoded, is deleted and reported as `Evicted`.
    pub async fn load(&self, identifier: &str) -> CacheResult<CacheLookup<K::Payload>> {
        self.load_fresh(identifier, FreshnessProbe::none()).await
    }

    /// Load and additionally check the fresh content and modification time
    /// in `probe`. Any failing gate evicts the entry.
    pub async fn load_fresh(
        &self,
        identifier: &str,
        probe: FreshnessProbe<'_>,
    ) -> CacheResult<CacheLookup<K::Payload>> {
        self.cache
            .load_key(&self.key(identifier), probe)
            .await
    }

    /// Write a fresh envelope stamped with the current version and schema,
    /// replacing whatever was stored.
    ///
    /// `source_modified_at` is only kept for kinds with a modification-time
    /// gate.
    pub async fn store(
        &self,
        identifier: &str,
        payload: K::Payload,
        source: FingerprintSource<'_>,
        source_modified_at: Option<EpochMillis>,
    ) -> CacheResult<Envelope<K::Payload>> {
        self.cache
            .store_key(&self.key(identifier), payload, source, source_modified_at)
            .await
    }

    /// Delete the envelope for `identifier`. Removing an absent entry succeeds.
    pub async fn remove(&self, identifier: &str) -> CacheResult<()> {
        self.cache.remove_key(&self.key(identifier)).await
    }

    /// Run every gate against an envelope already in hand, without touching
    /// the byte store.
    pub fn is_fresh(
        &self,
        identifier: &str,
        stored: &Envelope<K::Payload>,
        fresh_content: Option<&str>,
        fresh_modified_at: Option<EpochMillis>,
    ) -> bool {
        let probe = FreshnessProbe {
            content: fresh_content,
            modified_at: fresh_modified_at,
        };
        let fresh_fingerprint = probe.fingerprint();
        let verdict = check_validity(
            stored,
            &self.cache.current_stamp(),
            fresh_fingerprint.as_ref(),
            probe.modified_at,
            K::NAMESPACE.has_mtime_gate(),
        );
        if let Verdict::Stale(reason) = verdict {
            debug!(namespace = %K::NAMESPACE, identifier, reason = %reason, "held envelope is stale");
        }
        verdict.is_valid()
    }
}

/// Typed view over one singleton namespace (consolidated, events).
///
/// Singletons have no content gate: they are valid purely by version and
/// schema match.
pub struct SingletonStore<'a, B: ByteStore, K: StageKind> {
    cache: &'a StageCache<B>,
    _kind: PhantomData<K>,
}

impl<'a, B: ByteStore, K: StageKind> SingletonStore<'a, B, K> {
    fn new(cache: &'a StageCache<B>) -> Self {
        Self {
            cache,
            _kind: PhantomData,
        }
    }

    pub fn namespace(&self) -> Namespace {
        K::NAMESPACE
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::singleton(K::NAMESPACE)
    }

    pub async fn load(&self) -> CacheResult<CacheLookup<K::Payload>> {
        self.cache
            .load_key(&self.key(), FreshnessProbe::none())
            .await
    }

    /// Write a fresh envelope fingerprinted over the payload.
    pub async fn store(&self, payload: K::Payload) -> CacheResult<Envelope<K::Payload>> {
        self.cache
            .store_key(&self.key(), payload, FingerprintSource::Payload, None)
            .await
    }

    pub async fn remove(&self) -> CacheResult<()> {
        self.cache.remove_key(&self.key()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory_backend::InMemoryByteStore;
    use stagecache_core::{fingerprint_content, ItemStatus, ProjectRef};
    use std::collections::BTreeMap;

    const T1: EpochMillis = 1_700_000_000_000;
    const T2: EpochMillis = 1_700_000_900_000;

    fn new_cache() -> StageCache<InMemoryByteStore> {
        StageCache::new(
            Arc::new(InMemoryByteStore::new()),
            VersionStamp::new("1.0.0", 1),
        )
    }

    fn items(text: &str) -> Vec<ExtractedItem> {
        vec![ExtractedItem {
            text: text.to_string(),
            line: 0,
            status: ItemStatus::Open,
            indent: 0,
            tags: vec![],
        }]
    }

    #[tokio::test]
    async fn test_raw_roundtrip() {
        let cache = new_cache();
        let content = "- [ ] buy milk";

        cache
            .raw()
            .store("a.md", items("buy milk"), FingerprintSource::Content(content), Some(T1))
            .await
            .expect("store should succeed");

        let probe = FreshnessProbe::none().with_content(content).with_modified_at(T1);
        let lookup = cache
            .raw()
            .load_fresh("a.md", probe)
            .await
            .expect("load should succeed");
        assert!(lookup.is_hit());
        let envelope = lookup.into_envelope().expect("hit");
        assert_eq!(envelope.payload, items("buy milk"));
        assert_eq!(envelope.source_modified_at, Some(T1));
        assert_eq!(envelope.fingerprint, fingerprint_content(content));
    }

    #[tokio::test]
    async fn test_load_missing_is_miss() {
        let cache = new_cache();
        let lookup = cache.raw().load("nope.md").await.expect("load should succeed");
        assert!(lookup.is_miss());
        assert_eq!(cache.lookup_stats().misses, 1);
    }

    #[tokio::test]
    async fn test_content_change_evicts() {
        let cache = new_cache();
        cache
            .raw()
            .store(
                "a.md",
                items("buy milk"),
                FingerprintSource::Content("- [ ] buy milk"),
                None,
            )
            .await
            .expect("store should succeed");

        let probe = FreshnessProbe::none().with_content("- [ ] buy bread");
        let lookup = cache
            .raw()
            .load_fresh("a.md", probe)
            .await
            .expect("load should succeed");
        assert_eq!(lookup.eviction_reason(), Some(EvictionReason::Fingerprint));

        let again = cache.raw().load("a.md").await.expect("load should succeed");
        assert!(again.is_miss(), "evicted entry must be gone");
    }

    #[tokio::test]
    async fn test_mtime_change_evicts() {
        let cache = new_cache();
        cache
            .raw()
            .store("a.md", items("x"), FingerprintSource::Content("x"), Some(T1))
            .await
            .expect("store should succeed");

        let probe = FreshnessProbe::none().with_content("x").with_modified_at(T2);
        let lookup = cache
            .raw()
            .load_fresh("a.md", probe)
            .await
            .expect("load should succeed");
        assert_eq!(lookup.eviction_reason(), Some(EvictionReason::SourceModified));
    }

    #[tokio::test]
    async fn test_mtime_dropped_for_kinds_without_gate() {
        let cache = new_cache();
        let envelope = cache
            .project()
            .store("a.md", ProjectRecord::default(), FingerprintSource::Payload, Some(T1))
            .await
            .expect("store should succeed");
        assert_eq!(envelope.source_modified_at, None);

        let probe = FreshnessProbe::none().with_modified_at(T2);
        let lookup = cache
            .project()
            .load_fresh("a.md", probe)
            .await
            .expect("load should succeed");
        assert!(lookup.is_hit());
    }

    #[tokio::test]
    async fn test_version_bump_evicts_on_load() {
        let cache = new_cache();
        cache
            .augmented()
            .store("a.md", vec![], FingerprintSource::Payload, None)
            .await
            .expect("store should succeed");

        cache.replace_stamp(VersionStamp::new("1.1.0", 1));

        let lookup = cache.augmented().load("a.md").await.expect("load should succeed");
        assert_eq!(lookup.eviction_reason(), Some(EvictionReason::AppVersion));
        assert!(cache
            .byte_store()
            .get("augmented:a.md")
            .await
            .expect("get should succeed")
            .is_none());
    }

    #[tokio::test]
    async fn test_store_overwrites_with_current_stamp() {
        let cache = new_cache();
        cache
            .raw()
            .store("a.md", items("old"), FingerprintSource::Content("old"), Some(T1))
            .await
            .expect("store should succeed");

        cache.replace_stamp(VersionStamp::new("2.0.0", 3));
        cache
            .raw()
            .store("a.md", items("new"), FingerprintSource::Content("new"), Some(T2))
            .await
            .expect("store should succeed");

        let envelope = cache
            .raw()
            .load("a.md")
            .await
            .expect("load should succeed")
            .into_envelope()
            .expect("hit");
        assert_eq!(envelope.app_version, "2.0.0");
        assert_eq!(envelope.schema_revision, 3);
        assert_eq!(envelope.payload, items("new"));
        assert_eq!(envelope.source_modified_at, Some(T2));
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_evicted() {
        let cache = new_cache();
        cache
            .byte_store()
            .set("project:a.md", b"not an envelope".to_vec())
            .await
            .expect("set should succeed");

        let lookup = cache.project().load("a.md").await.expect("load should succeed");
        assert_eq!(lookup.eviction_reason(), Some(EvictionReason::Corrupt));
        assert!(cache.byte_store().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_payload_shape_is_evicted() {
        let cache = new_cache();
        cache
            .meta()
            .store("a.md", Value::String("text".into()), FingerprintSource::Payload, None)
            .await
            .expect("store should succeed");

        // Same key content, read through a store expecting a different shape.
        let bytes = cache
            .byte_store()
            .get("meta:a.md")
            .await
            .expect("get should succeed")
            .expect("present");
        cache
            .byte_store()
            .set("raw:a.md", bytes)
            .await
            .expect("set should succeed");

        let lookup = cache.raw().load("a.md").await.expect("load should succeed");
        assert_eq!(lookup.eviction_reason(), Some(EvictionReason::Corrupt));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let cache = new_cache();
        cache.raw().remove("never.md").await.expect("remove should succeed");
        assert!(cache.byte_store().is_empty());

        cache
            .raw()
            .store("a.md", items("x"), FingerprintSource::Payload, None)
            .await
            .expect("store should succeed");
        cache.raw().remove("a.md").await.expect("remove should succeed");
        cache.raw().remove("a.md").await.expect("remove should succeed");
        assert!(cache.raw().load("a.md").await.expect("load").is_miss());
    }

    #[tokio::test]
    async fn test_is_fresh_uses_held_envelope() {
        let cache = new_cache();
        let envelope = cache
            .raw()
            .store("a.md", items("x"), FingerprintSource::Content("x"), Some(T1))
            .await
            .expect("store should succeed");

        // Byte store emptied; is_fresh must not need it.
        cache.byte_store().clear_all().await.expect("clear should succeed");

        assert!(cache.raw().is_fresh("a.md", &envelope, Some("x"), Some(T1)));
        assert!(cache.raw().is_fresh("a.md", &envelope, None, None));
        assert!(!cache.raw().is_fresh("a.md", &envelope, Some("y"), Some(T1)));
        assert!(!cache.raw().is_fresh("a.md", &envelope, Some("x"), Some(T2)));

        cache.replace_stamp(VersionStamp::new("1.0.0", 2));
        assert!(!cache.raw().is_fresh("a.md", &envelope, Some("x"), Some(T1)));
    }

    #[tokio::test]
    async fn test_consolidated_uses_singleton_tier() {
        let cache = new_cache();
        let index = ConsolidatedIndex {
            built_at: T1,
            ..Default::default()
        };
        cache
            .consolidated()
            .store(index.clone())
            .await
            .expect("store should succeed");

        assert!(cache
            .byte_store()
            .get_singleton("consolidated-index")
            .await
            .expect("get should succeed")
            .is_some());

        let loaded = cache
            .consolidated()
            .load()
            .await
            .expect("load should succeed")
            .into_payload();
        assert_eq!(loaded, Some(index));

        cache.consolidated().remove().await.expect("remove should succeed");
        assert!(cache.consolidated().load().await.expect("load").is_miss());
    }

    #[tokio::test]
    async fn test_events_schema_bump_evicts() {
        let cache = new_cache();
        let events = vec![EventRecord {
            id: "e1".to_string(),
            title: "standup".to_string(),
            starts_at: T1,
            ends_at: None,
            source: Some("a.md".to_string()),
        }];
        cache.events().store(events).await.expect("store should succeed");
        assert!(cache.events().load().await.expect("load").is_hit());

        cache.replace_stamp(VersionStamp::new("1.0.0", 2));
        let lookup = cache.events().load().await.expect("load should succeed");
        assert_eq!(lookup.eviction_reason(), Some(EvictionReason::SchemaRevision));
    }

    #[tokio::test]
    async fn test_project_payload_roundtrip() {
        let cache = new_cache();
        let mut metadata = BTreeMap::new();
        metadata.insert("owner".to_string(), Value::String("ops".into()));
        let record = ProjectRecord {
            project: Some(ProjectRef {
                name: "garden".to_string(),
                path: "projects/garden.md".to_string(),
            }),
            metadata,
        };
        cache
            .project()
            .store("a.md", record.clone(), FingerprintSource::Payload, None)
            .await
            .expect("store should succeed");
        let loaded = cache
            .project()
            .load("a.md")
            .await
            .expect("load should succeed")
            .into_payload();
        assert_eq!(loaded, Some(record));
    }

    #[tokio::test]
    async fn test_lookup_stats() {
        let cache = new_cache();
        let _ = cache.raw().load("a.md").await;
        cache
            .raw()
            .store("a.md", items("x"), FingerprintSource::Content("x"), None)
            .await
            .expect("store should succeed");
        let _ = cache.raw().load("a.md").await;
        let _ = cache.raw().load("a.md").await;
        let _ = cache
            .raw()
            .load_fresh("a.md", FreshnessProbe::none().with_content("y"))
            .await;

        let stats = cache.lookup_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.evictions, 1);

        cache.reset_lookup_stats();
        assert_eq!(cache.lookup_stats(), LookupStats::default());
    }

    #[tokio::test]
    async fn test_from_config_rejects_invalid() {
        let config = CacheConfig::new().with_app_version("");
        let result = StageCache::from_config(Arc::new(InMemoryByteStore::new()), &config);
        assert!(result.is_err());

        let config = CacheConfig::new().with_app_version("3.1.4").with_schema_revision(9);
        let cache = StageCache::from_config(Arc::new(InMemoryByteStore::new()), &config)
            .expect("valid config");
        assert_eq!(cache.current_stamp(), VersionStamp::new("3.1.4", 9));
    }
}
