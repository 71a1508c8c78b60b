//! Payload shapes produced by each pipeline stage.
//!
//! The parsers that build these live outside this workspace; the cache only
//! needs them to be serializable. Changing any serialized field here requires
//! bumping [`crate::CURRENT_SCHEMA_REVISION`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::EpochMillis;

/// Completion state of an extracted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemStatus {
    Open,
    Done,
    Cancelled,
}

/// An item lifted out of a source document by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    /// Text after the list marker and checkbox.
    pub text: String,
    /// Zero-based line number in the source.
    pub line: u32,
    pub status: ItemStatus,
    /// Leading indentation, used to rebuild nesting.
    pub indent: u16,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Position of an item within the source corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub path: String,
    pub line: u32,
    /// Heading trail from the document root to the item.
    #[serde(default)]
    pub headings: Vec<String>,
}

/// Project a source document resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub name: String,
    pub path: String,
}

/// Project-stage payload: resolved project plus enhanced metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub project: Option<ProjectRef>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// An item after location and metadata augmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentedItem {
    pub item: ExtractedItem,
    pub location: SourceLocation,
    pub project: Option<ProjectRef>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Whole-corpus index built from every augmented source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConsolidatedIndex {
    /// Augmented items keyed by source path.
    pub sources: BTreeMap<String, Vec<AugmentedItem>>,
    /// Source paths keyed by tag.
    #[serde(default)]
    pub by_tag: BTreeMap<String, Vec<String>>,
    pub built_at: EpochMillis,
}

impl ConsolidatedIndex {
    /// Total number of items across all sources.
    pub fn item_count(&self) -> usize {
        self.sources.values().map(Vec::len).sum()
    }
}

/// A dated event collected from the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub title: String,
    pub starts_at: EpochMillis,
    pub ends_at: Option<EpochMillis>,
    /// Source path the event came from, if any.
    pub source: Option<String>,
}
