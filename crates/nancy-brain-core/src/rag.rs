//! The RAG orchestrator: corpus snapshots and the service facade.
//!
//! A [`Snapshot`] is an immutable, fully built corpus (document registry,
//! text store and vector indexes). [`CorpusBuilder`] turns ingestion records
//! into one; [`RagService`] serves queries against the current snapshot and
//! swaps in a new one atomically with [`RagService::publish`].
//!
//! Every read clones the snapshot `Arc` once and works on that, so a rebuild
//! published mid-request never mixes two corpora within one answer.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::chunk::{content_checksum, normalize_text, ChunkingPolicy};
use crate::embedding::EmbeddingProvider;
use crate::error::{CoreError, Result};
use crate::identifier::chunk_id;
use crate::index::{InMemoryIndex, VectorIndex};
use crate::models::{
    BatchItem, BatchResult, HealthStatus, HealthView, IndexSource, IngestRecord, Passage,
    SearchHitView, SearchResponse, TreeView,
};
use crate::registry::{DocumentRegistry, RegisterOutcome};
use crate::retrieve::{Retriever, DEFAULT_WINDOW};
use crate::search::{search, IndexLane, SearchContext, SearchRequest};
use crate::text_store::TextStore;
use crate::weights::{extension_of, WeightRegistry};

/// Default depth for tree listings.
pub const DEFAULT_TREE_DEPTH: usize = 3;

/// Default cap on entries in one tree listing.
pub const DEFAULT_TREE_ENTRIES: usize = 500;

/// An immutable, fully built corpus.
pub struct Snapshot {
    registry: DocumentRegistry,
    texts: TextStore,
    general: Arc<dyn VectorIndex>,
    code: Option<Arc<dyn VectorIndex>>,
    index_version: String,
    built_at: DateTime<Utc>,
}

impl Snapshot {
    /// Assemble a snapshot from already-built parts.
    pub fn new(
        registry: DocumentRegistry,
        texts: TextStore,
        general: Arc<dyn VectorIndex>,
        code: Option<Arc<dyn VectorIndex>>,
    ) -> Self {
        let index_version = index_version(&registry);
        Self {
            registry,
            texts,
            general,
            code,
            index_version,
            built_at: Utc::now(),
        }
    }

    /// A snapshot with no documents and an empty general index.
    pub fn empty() -> Self {
        Self::new(
            DocumentRegistry::new(),
            TextStore::new(),
            Arc::new(InMemoryIndex::new()),
            None,
        )
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    pub fn texts(&self) -> &TextStore {
        &self.texts
    }

    pub fn general_index(&self) -> &dyn VectorIndex {
        self.general.as_ref()
    }

    pub fn code_index(&self) -> Option<&dyn VectorIndex> {
        self.code.as_deref()
    }

    pub fn index_version(&self) -> &str {
        &self.index_version
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

/// Stable fingerprint of the corpus contents: the first 16 hex digits of
/// SHA-256 over every `(doc_id, checksum)` pair in id order.
pub fn index_version(registry: &DocumentRegistry) -> String {
    let mut hasher = Sha256::new();
    for meta in registry.entries() {
        hasher.update(meta.doc_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(meta.content_checksum.as_bytes());
        hasher.update([b'\n']);
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Accumulates ingestion records, then embeds them into a [`Snapshot`].
pub struct CorpusBuilder {
    policy: ChunkingPolicy,
    code_extensions: HashSet<String>,
    registry: DocumentRegistry,
    texts: TextStore,
}

impl CorpusBuilder {
    pub fn new(policy: ChunkingPolicy) -> Self {
        Self {
            policy,
            code_extensions: HashSet::new(),
            registry: DocumentRegistry::new(),
            texts: TextStore::new(),
        }
    }

    /// Extensions (e.g. `.py`, `rs`) whose documents also go to the code index.
    pub fn with_code_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.code_extensions = extensions
            .into_iter()
            .map(|ext| {
                let lower = ext.as_ref().trim().to_lowercase();
                if lower.starts_with('.') {
                    lower
                } else {
                    format!(".{}", lower)
                }
            })
            .collect();
        self
    }

    /// Register and store one record.
    ///
    /// An empty `checksum` is computed; a non-empty one must match the
    /// normalized text or the record is rejected.
    pub fn add(&mut self, record: IngestRecord) -> Result<RegisterOutcome> {
        let normalized = normalize_text(&record.text);
        let computed = content_checksum(&normalized);
        if !record.checksum.is_empty() && !record.checksum.eq_ignore_ascii_case(&computed) {
            return Err(CoreError::validation(format!(
                "checksum mismatch for '{}'",
                record.doc_id
            )));
        }

        // put() does its own normalization
        let total_lines = self.texts.put(&record.doc_id, &record.text, self.policy)?;
        self.registry.register(
            &record.doc_id,
            &record.category,
            &record.repo,
            &computed,
            total_lines,
            record.url_template.as_deref(),
        )
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Embed every chunk and produce a publishable snapshot.
    ///
    /// Without a `general` provider the snapshot is built with an empty
    /// general index (retrieval works, search fails). With a `code` provider,
    /// documents matching the code extensions are also embedded into a
    /// second index.
    pub async fn build(
        self,
        general: Option<&dyn EmbeddingProvider>,
        code: Option<&dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> Result<Snapshot> {
        let general_index = InMemoryIndex::new();
        if let Some(provider) = general {
            let entries = self.index_entries(|_| true)?;
            fill_index(&general_index, provider, entries, batch_size).await?;
        }

        let code_index = match code {
            Some(provider) => {
                let index = InMemoryIndex::new();
                let entries = self.index_entries(|doc_id| {
                    extension_of(doc_id).is_some_and(|ext| self.code_extensions.contains(&ext))
                })?;
                fill_index(&index, provider, entries, batch_size).await?;
                Some(Arc::new(index) as Arc<dyn VectorIndex>)
            }
            None => None,
        };

        Ok(Snapshot::new(
            self.registry,
            self.texts,
            Arc::new(general_index),
            code_index,
        ))
    }

    /// `(index id, text)` for every chunk of every selected document.
    ///
    /// Single-chunk documents are indexed under their plain doc id.
    fn index_entries(&self, select: impl Fn(&str) -> bool) -> Result<Vec<(String, String)>> {
        let mut entries = Vec::new();
        for doc_id in self.registry.ids().filter(|id| select(*id)) {
            let chunks = self.texts.chunks(doc_id)?;
            if chunks.len() == 1 {
                entries.push((doc_id.to_string(), self.texts.get_full(doc_id)?.to_string()));
                continue;
            }
            for span in chunks {
                entries.push((
                    chunk_id(doc_id, span.index),
                    self.texts.chunk_text(doc_id, span.index)?.to_string(),
                ));
            }
        }
        Ok(entries)
    }
}

async fn fill_index(
    index: &InMemoryIndex,
    provider: &dyn EmbeddingProvider,
    entries: Vec<(String, String)>,
    batch_size: usize,
) -> Result<()> {
    for batch in entries.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
        let vectors = provider.embed_batch(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(CoreError::embedding(format!(
                "provider returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            )));
        }
        for ((id, _), vector) in batch.iter().zip(vectors) {
            index.insert(id, vector)?;
        }
    }
    Ok(())
}

/// Tunables the service applies to every request.
#[derive(Debug, Clone)]
pub struct RagSettings {
    pub general_calibration: f64,
    pub code_calibration: f64,
    pub snippet_chars: usize,
    pub default_window: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            general_calibration: 1.0,
            code_calibration: 1.0,
            snippet_chars: 240,
            default_window: DEFAULT_WINDOW,
        }
    }
}

/// The only entry point adapters call.
pub struct RagService {
    corpus: RwLock<Arc<Snapshot>>,
    weights: Arc<WeightRegistry>,
    general_embedder: Arc<dyn EmbeddingProvider>,
    code_embedder: Option<Arc<dyn EmbeddingProvider>>,
    settings: RagSettings,
}

impl RagService {
    pub fn new(
        snapshot: Snapshot,
        weights: Arc<WeightRegistry>,
        general_embedder: Arc<dyn EmbeddingProvider>,
        code_embedder: Option<Arc<dyn EmbeddingProvider>>,
        settings: RagSettings,
    ) -> Self {
        Self {
            corpus: RwLock::new(Arc::new(snapshot)),
            weights,
            general_embedder,
            code_embedder,
            settings,
        }
    }

    /// The snapshot serving reads right now.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.corpus
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the live snapshot, returning the previous one.
    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let mut guard = self.corpus.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(snapshot))
    }

    pub fn weights(&self) -> &WeightRegistry {
        &self.weights
    }

    pub fn settings(&self) -> &RagSettings {
        &self.settings
    }

    pub async fn search(&self, req: &SearchRequest<'_>) -> Result<SearchResponse> {
        let snapshot = self.snapshot();
        let code = match (&self.code_embedder, snapshot.code_index()) {
            (Some(embedder), Some(index)) => Some(IndexLane {
                source: IndexSource::Code,
                embedder: embedder.as_ref(),
                index,
                calibration: self.settings.code_calibration,
            }),
            _ => None,
        };
        let ctx = SearchContext {
            registry: snapshot.registry(),
            texts: snapshot.texts(),
            weights: &self.weights,
            general: IndexLane {
                source: IndexSource::General,
                embedder: self.general_embedder.as_ref(),
                index: snapshot.general_index(),
                calibration: self.settings.general_calibration,
            },
            code,
            snippet_chars: self.settings.snippet_chars,
        };

        let hits = search(&ctx, req).await?;
        Ok(SearchResponse {
            hits: hits
                .into_iter()
                .map(|hit| {
                    let weights = hit.weights;
                    let mut view = SearchHitView::from(hit);
                    if req.explain {
                        view.weights = Some(weights);
                    }
                    view
                })
                .collect(),
            index_version: snapshot.index_version().to_string(),
        })
    }

    pub fn retrieve(
        &self,
        id: &str,
        start: Option<i64>,
        end: Option<i64>,
        window: Option<usize>,
    ) -> Result<Passage> {
        let snapshot = self.snapshot();
        self.retriever(&snapshot).retrieve(id, start, end, window)
    }

    pub fn retrieve_batch(&self, items: &[BatchItem]) -> Vec<BatchResult> {
        let snapshot = self.snapshot();
        self.retriever(&snapshot).retrieve_batch(items)
    }

    /// Directory view of the corpus under `prefix` (whole corpus if `None`).
    ///
    /// At most `max_entries` entries are returned; `truncated` is set when the
    /// walk had more.
    pub fn list_tree(
        &self,
        prefix: Option<&str>,
        max_depth: Option<usize>,
        max_entries: Option<usize>,
    ) -> Result<TreeView> {
        let snapshot = self.snapshot();
        let prefix = prefix.unwrap_or("");
        let max_depth = max_depth.unwrap_or(DEFAULT_TREE_DEPTH);
        let max_entries = max_entries.unwrap_or(DEFAULT_TREE_ENTRIES);
        if max_entries == 0 {
            return Err(CoreError::validation("max_entries must be >= 1"));
        }

        let mut entries: Vec<_> = snapshot
            .registry()
            .list_tree(prefix, max_depth)?
            .take(max_entries + 1)
            .collect();
        let truncated = entries.len() > max_entries;
        entries.truncate(max_entries);
        Ok(TreeView {
            prefix: prefix.to_string(),
            max_depth,
            entries,
            truncated,
        })
    }

    /// Set a runtime multiplier; returns the previous override.
    pub fn set_weight(&self, doc_id: &str, multiplier: f64) -> Result<Option<f64>> {
        self.weights.set_doc_weight(doc_id, multiplier)
    }

    /// Drop a runtime multiplier; returns the removed value.
    pub fn clear_weight(&self, doc_id: &str) -> Option<f64> {
        self.weights.clear_doc_weight(doc_id)
    }

    pub fn doc_weights(&self) -> Arc<HashMap<String, f64>> {
        self.weights.doc_weights()
    }

    pub fn health(&self) -> HealthView {
        let snapshot = self.snapshot();
        let documents_count = snapshot.registry().len();
        let status = if documents_count == 0 || snapshot.general_index().is_empty() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Ok
        };
        HealthView {
            status,
            index_version: snapshot.index_version().to_string(),
            documents_count,
            last_updated: snapshot
                .built_at()
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    fn retriever<'a>(&self, snapshot: &'a Snapshot) -> Retriever<'a> {
        Retriever {
            registry: snapshot.registry(),
            texts: snapshot.texts(),
            default_window: self.settings.default_window,
        }
    }
}
