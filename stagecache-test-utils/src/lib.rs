//! Stagecache Test Utilities
//!
//! Shared test infrastructure for the stagecache workspace:
//! - A byte store with injectable failures
//! - Proptest generators for every payload type
//! - Fixtures for common scenarios
//! - Assertions over lookups and errors

// Re-export storage types used by nearly every test
pub use stagecache_storage::{
    ByteStore, CacheLookup, Envelope, EvictionReason, FingerprintSource, FreshnessProbe,
    InMemoryByteStore, StageCache,
};

// Re-export core types for convenience
pub use stagecache_core::{
    AugmentedItem, CacheError, CacheResult, ConsolidatedIndex, EpochMillis, EventRecord,
    ExtractedItem, ItemStatus, Namespace, ProjectRecord, ProjectRef, SourceLocation, StorageError,
    VersionStamp,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

// ============================================================================
// FAULT INJECTION
// ============================================================================

/// In-memory byte store whose reads, writes and deletes can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyByteStore {
    inner: InMemoryByteStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FlakyByteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// The wrapped store, bypassing injected failures.
    pub fn inner(&self) -> &InMemoryByteStore {
        &self.inner
    }

    fn check(&self, flag: &AtomicBool, operation: &str) -> CacheResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StorageError::backend(operation, "injected failure").into())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ByteStore for FlakyByteStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.check(&self.fail_reads, "get")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, bytes: Vec<u8>) -> CacheResult<()> {
        self.check(&self.fail_writes, "set")?;
        self.inner.set(key, bytes).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.check(&self.fail_deletes, "delete")?;
        self.inner.delete(key).await
    }

    async fn list_keys(&self) -> CacheResult<Vec<String>> {
        self.check(&self.fail_reads, "list_keys")?;
        self.inner.list_keys().await
    }

    async fn get_singleton(&self, name: &str) -> CacheResult<Option<Vec<u8>>> {
        self.check(&self.fail_reads, "get_singleton")?;
        self.inner.get_singleton(name).await
    }

    async fn set_singleton(&self, name: &str, bytes: Vec<u8>) -> CacheResult<()> {
        self.check(&self.fail_writes, "set_singleton")?;
        self.inner.set_singleton(name, bytes).await
    }

    async fn clear_all(&self) -> CacheResult<()> {
        self.check(&self.fail_deletes, "clear_all")?;
        self.inner.clear_all().await
    }
}

// ============================================================================
// TRACING
// ============================================================================

/// Route `tracing` output to the test harness. Honors `RUST_LOG`; safe to
/// call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for stagecache payload and key types.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;
    use std::collections::BTreeMap;

    // === Keys and stamps ===

    /// A source-path-like identifier.
    pub fn arb_identifier() -> impl Strategy<Value = String> {
        "[a-z0-9_/-]{1,24}\\.md"
    }

    pub fn arb_namespace() -> impl Strategy<Value = Namespace> {
        prop::sample::select(Namespace::ALL.to_vec())
    }

    /// Namespaces addressed by identifier.
    pub fn arb_keyed_namespace() -> impl Strategy<Value = Namespace> {
        prop::sample::select(vec![
            Namespace::Raw,
            Namespace::Project,
            Namespace::Augmented,
            Namespace::Meta,
        ])
    }

    pub fn arb_version_stamp() -> impl Strategy<Value = VersionStamp> {
        ((0u32..5, 0u32..20, 0u32..50), 1u32..10).prop_map(|((major, minor, patch), schema)| {
            VersionStamp::new(format!("{}.{}.{}", major, minor, patch), schema)
        })
    }

    /// Millisecond timestamps within a plausible range.
    pub fn arb_epoch_millis() -> impl Strategy<Value = EpochMillis> {
        1_500_000_000_000i64..2_000_000_000_000i64
    }

    /// Markdown-ish source text.
    pub fn arb_source_content() -> impl Strategy<Value = String> {
        prop::collection::vec("- \\[[ x]\\] [a-z ]{1,30}", 0..8).prop_map(|lines| lines.join("\n"))
    }

    // === Payloads ===

    pub fn arb_item_status() -> impl Strategy<Value = ItemStatus> {
        prop_oneof![
            Just(ItemStatus::Open),
            Just(ItemStatus::Done),
            Just(ItemStatus::Cancelled),
        ]
    }

    pub fn arb_extracted_item() -> impl Strategy<Value = ExtractedItem> {
        (
            "[a-zA-Z0-9 ]{1,60}",
            0u32..5000,
            arb_item_status(),
            0u16..16,
            prop::collection::vec("[a-z]{1,10}", 0..4),
        )
            .prop_map(|(text, line, status, indent, tags)| ExtractedItem {
                text,
                line,
                status,
                indent,
                tags,
            })
    }

    pub fn arb_extracted_items() -> impl Strategy<Value = Vec<ExtractedItem>> {
        prop::collection::vec(arb_extracted_item(), 0..10)
    }

    pub fn arb_source_location() -> impl Strategy<Value = SourceLocation> {
        (
            arb_identifier(),
            0u32..5000,
            prop::collection::vec("[A-Za-z ]{1,20}", 0..3),
        )
            .prop_map(|(path, line, headings)| SourceLocation {
                path,
                line,
                headings,
            })
    }

    pub fn arb_project_ref() -> impl Strategy<Value = ProjectRef> {
        ("[a-z]{1,12}", arb_identifier()).prop_map(|(name, path)| ProjectRef { name, path })
    }

    /// Small metadata maps with string values.
    pub fn arb_metadata() -> impl Strategy<Value = BTreeMap<String, Value>> {
        prop::collection::btree_map("[a-z]{1,8}", "[a-z0-9 ]{0,16}".prop_map(Value::String), 0..4)
    }

    pub fn arb_project_record() -> impl Strategy<Value = ProjectRecord> {
        (prop::option::of(arb_project_ref()), arb_metadata())
            .prop_map(|(project, metadata)| ProjectRecord { project, metadata })
    }

    pub fn arb_augmented_item() -> impl Strategy<Value = AugmentedItem> {
        (
            arb_extracted_item(),
            arb_source_location(),
            prop::option::of(arb_project_ref()),
            arb_metadata(),
        )
            .prop_map(|(item, location, project, metadata)| AugmentedItem {
                item,
                location,
                project,
                metadata,
            })
    }

    pub fn arb_augmented_items() -> impl Strategy<Value = Vec<AugmentedItem>> {
        prop::collection::vec(arb_augmented_item(), 0..6)
    }

    pub fn arb_event_record() -> impl Strategy<Value = EventRecord> {
        (
            "[a-z0-9]{4,12}",
            "[A-Za-z ]{1,30}",
            arb_epoch_millis(),
            prop::option::of(0i64..86_400_000),
            prop::option::of(arb_identifier()),
        )
            .prop_map(|(id, title, starts_at, duration, source)| EventRecord {
                id,
                title,
                starts_at,
                ends_at: duration.map(|d| starts_at + d),
                source,
            })
    }

    pub fn arb_consolidated_index() -> impl Strategy<Value = ConsolidatedIndex> {
        (
            prop::collection::btree_map(arb_identifier(), arb_augmented_items(), 0..4),
            arb_epoch_millis(),
        )
            .prop_map(|(sources, built_at)| {
                let mut by_tag: BTreeMap<String, Vec<String>> = BTreeMap::new();
                for (path, items) in &sources {
                    for tag in items.iter().flat_map(|a| a.item.tags.iter()) {
                        let paths = by_tag.entry(tag.clone()).or_default();
                        if !paths.contains(path) {
                            paths.push(path.clone());
                        }
                    }
                }
                ConsolidatedIndex {
                    sources,
                    by_tag,
                    built_at,
                }
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common cache scenarios.

    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    pub const MILK_CONTENT: &str = "- [ ] buy milk";
    pub const BREAD_CONTENT: &str = "- [ ] buy bread";

    /// A fixed source modification time.
    pub const MTIME: EpochMillis = 1_700_000_000_000;

    pub fn stamp_v1() -> VersionStamp {
        VersionStamp::new("1.0.0", 1)
    }

    /// Empty in-memory cache under [`stamp_v1`].
    pub fn fresh_cache() -> StageCache<InMemoryByteStore> {
        StageCache::new(Arc::new(InMemoryByteStore::new()), stamp_v1())
    }

    /// Empty cache over a [`FlakyByteStore`], sharing the store handle.
    pub fn flaky_cache() -> (StageCache<FlakyByteStore>, Arc<FlakyByteStore>) {
        let store = Arc::new(FlakyByteStore::new());
        (StageCache::new(store.clone(), stamp_v1()), store)
    }

    /// One open item with the given text, as the parser would emit it.
    pub fn open_item(text: &str) -> ExtractedItem {
        ExtractedItem {
            text: text.to_string(),
            line: 0,
            status: ItemStatus::Open,
            indent: 0,
            tags: vec![],
        }
    }

    /// Items parsed from [`MILK_CONTENT`].
    pub fn milk_items() -> Vec<ExtractedItem> {
        vec![open_item("buy milk")]
    }

    /// Items parsed from [`BREAD_CONTENT`].
    pub fn bread_items() -> Vec<ExtractedItem> {
        vec![open_item("buy bread")]
    }

    pub fn sample_project_record() -> ProjectRecord {
        let mut metadata = BTreeMap::new();
        metadata.insert("area".to_string(), serde_json::json!("home"));
        ProjectRecord {
            project: Some(ProjectRef {
                name: "errands".to_string(),
                path: "projects/errands.md".to_string(),
            }),
            metadata,
        }
    }

    pub fn sample_augmented(path: &str) -> Vec<AugmentedItem> {
        vec![AugmentedItem {
            item: open_item("buy milk"),
            location: SourceLocation {
                path: path.to_string(),
                line: 0,
                headings: vec!["Shopping".to_string()],
            },
            project: sample_project_record().project,
            metadata: BTreeMap::new(),
        }]
    }

    pub fn sample_index(paths: &[&str]) -> ConsolidatedIndex {
        ConsolidatedIndex {
            sources: paths
                .iter()
                .map(|path| (path.to_string(), sample_augmented(path)))
                .collect(),
            by_tag: BTreeMap::new(),
            built_at: MTIME,
        }
    }

    pub fn sample_events() -> Vec<EventRecord> {
        vec![EventRecord {
            id: "evt-1".to_string(),
            title: "dentist".to_string(),
            starts_at: MTIME,
            ends_at: Some(MTIME + 3_600_000),
            source: Some("a.md".to_string()),
        }]
    }

    /// Store raw, project and augmented records for `path` with
    /// [`MILK_CONTENT`] as the raw source.
    pub async fn seed_per_source<B: ByteStore>(cache: &StageCache<B>, path: &str) -> CacheResult<()> {
        cache
            .raw()
            .store(path, milk_items(), FingerprintSource::Content(MILK_CONTENT), Some(MTIME))
            .await?;
        cache
            .project()
            .store(path, sample_project_record(), FingerprintSource::Payload, None)
            .await?;
        cache
            .augmented()
            .store(path, sample_augmented(path), FingerprintSource::Payload, None)
            .await?;
        Ok(())
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over lookups and cache errors.

    use super::*;

    /// Assert a lookup hit and return its envelope.
    #[track_caller]
    pub fn assert_hit<T: std::fmt::Debug>(lookup: CacheLookup<T>) -> Envelope<T> {
        match lookup {
            CacheLookup::Hit(envelope) => envelope,
            other => panic!("Expected cache hit, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_miss<T: std::fmt::Debug>(lookup: &CacheLookup<T>) {
        assert!(lookup.is_miss(), "Expected cache miss, got: {:?}", lookup);
    }

    #[track_caller]
    pub fn assert_evicted<T: std::fmt::Debug>(lookup: &CacheLookup<T>, expected: EvictionReason) {
        assert_eq!(
            lookup.eviction_reason(),
            Some(expected),
            "Expected eviction for {}, got: {:?}",
            expected,
            lookup
        );
    }

    /// Assert that a CacheResult is a backend storage error.
    #[track_caller]
    pub fn assert_backend_error<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(CacheError::Storage(StorageError::Backend { .. })) => {}
            other => panic!("Expected backend storage error, got: {:?}", other),
        }
    }
}
