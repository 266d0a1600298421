//! Data types that flow through the retrieval core and out to adapters.
//!
//! Internal records ([`DocumentMeta`], [`ChunkSpan`], [`SearchHit`]) carry
//! everything needed for ranking and slicing; the `*View` types and
//! [`Passage`] are the serialized shapes adapters return to callers.

use serde::{Deserialize, Serialize};

use crate::highlight::Highlight;
use crate::weights::WeightBreakdown;

/// Registry entry for one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentMeta {
    pub doc_id: String,
    pub category: String,
    pub repo: String,
    pub relative_path: String,
    /// SHA-256 of the normalized text (lowercase hex).
    pub content_checksum: String,
    pub total_lines: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url_template: Option<String>,
    /// Set when a re-registration changed the checksum.
    pub updated: bool,
}

/// One row of a document's chunk boundary table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkSpan {
    pub index: usize,
    /// 1-based, inclusive.
    pub line_start: usize,
    /// 1-based, inclusive.
    pub line_end: usize,
}

/// A record from the corpus ingestion feed.
#[derive(Debug, Clone)]
pub struct IngestRecord {
    pub doc_id: String,
    pub text: String,
    pub category: String,
    pub repo: String,
    pub checksum: String,
    pub url_template: Option<String>,
}

/// Which vector index produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexSource {
    General,
    Code,
}

/// A ranked, weighted search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// Doc id or chunk id as stored in the vector index.
    pub id: String,
    pub source_document: String,
    pub raw_score: f64,
    pub adjusted_score: f64,
    pub calibration: f64,
    pub weights: WeightBreakdown,
    pub source_index: IndexSource,
    pub snippet: String,
    /// Query matches within `snippet`.
    pub highlights: Vec<Highlight>,
    pub line_start: usize,
    pub line_end: usize,
    pub chunk_index: Option<usize>,
    pub chunk_count: Option<usize>,
}

/// Serialized shape of a search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHitView {
    pub id: String,
    pub text: String,
    pub score: f64,
    pub raw_score: f64,
    pub source_document: String,
    pub source_index: IndexSource,
    pub line_start: usize,
    pub line_end: usize,
    pub chunk_index: Option<usize>,
    pub chunk_count: Option<usize>,
    /// Character offsets into `text`.
    pub highlights: Vec<Highlight>,
    /// Multiplier breakdown, present when the request asked for it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<WeightBreakdown>,
}

impl From<SearchHit> for SearchHitView {
    fn from(hit: SearchHit) -> Self {
        Self {
            id: hit.id,
            text: hit.snippet,
            score: hit.adjusted_score,
            raw_score: hit.raw_score,
            source_document: hit.source_document,
            source_index: hit.source_index,
            line_start: hit.line_start,
            line_end: hit.line_end,
            chunk_index: hit.chunk_index,
            chunk_count: hit.chunk_count,
            highlights: hit.highlights,
            weights: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHitView>,
    pub index_version: String,
}

/// A bounded slice of a document with provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    pub doc_id: String,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub total_lines: usize,
    pub is_partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    pub content_sha256: String,
    /// Chunks covered, for chunk-window reads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<Vec<ChunkSpan>>,
}

/// One request in a batch retrieval.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchItem {
    pub doc_id: String,
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub end: Option<i64>,
    #[serde(default)]
    pub window: Option<usize>,
}

/// Error descriptor occupying a failed batch slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorView {
    pub doc_id: String,
    pub error: String,
    pub message: String,
}

/// A batch slot: either a passage or an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BatchResult {
    Passage(Passage),
    Error(ErrorView),
}

impl BatchResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Passage(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
}

/// One node of a corpus tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    pub path: String,
    pub name: String,
    pub kind: EntryKind,
    /// 1 for direct children of the prefix.
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeView {
    pub prefix: String,
    pub max_depth: usize,
    pub entries: Vec<TreeEntry>,
    /// More entries matched than the listing cap allowed.
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthView {
    pub status: HealthStatus,
    pub index_version: String,
    pub documents_count: usize,
    pub last_updated: String,
}
