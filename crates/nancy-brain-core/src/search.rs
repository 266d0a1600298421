//! Weighted semantic search over one or two vector indexes.
//!
//! The search algorithm operates entirely through the [`EmbeddingProvider`]
//! and [`VectorIndex`] traits plus the in-memory registries of a corpus
//! snapshot. It performs no I/O of its own and holds no mutable state, so
//! dropping the returned future at any await point is safe.
//!
//! # Scoring Algorithm
//!
//! 1. Embed the query once per index lane (general, and code if present).
//! 2. Query each lane with `k = max(limit × 4, limit + 20)`; lanes run
//!    concurrently.
//! 3. Merge by canonical id, keeping the higher calibrated score (ties keep
//!    general).
//! 4. Drop stale ids, then filter by `category` and `doctype`.
//! 5. `adjusted = raw × calibration × multiplier(parent doc)`.
//! 6. Discard `adjusted < threshold`.
//! 7. Sort by adjusted (desc), raw (desc), id (asc).
//! 8. Truncate to `limit`, attach snippets and highlight query terms in them.

use std::collections::HashMap;

use futures::future::try_join;

use crate::embedding::EmbeddingProvider;
use crate::error::{CoreError, Result};
use crate::highlight::compute_highlights;
use crate::identifier::Identifier;
use crate::index::{RawHit, VectorIndex};
use crate::models::{IndexSource, SearchHit};
use crate::registry::DocumentRegistry;
use crate::text_store::TextStore;
use crate::weights::WeightRegistry;

/// Default number of hits.
pub const DEFAULT_LIMIT: usize = 6;

/// Bundles all inputs for a single search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub limit: usize,
    /// Minimum adjusted score.
    pub threshold: f64,
    /// Only hits whose document category equals this.
    pub category: Option<&'a str>,
    /// Only hits whose parent doc id ends with this extension.
    pub doctype: Option<&'a str>,
    /// If true, adapters attach the multiplier breakdown to each hit.
    pub explain: bool,
}

impl<'a> SearchRequest<'a> {
    pub fn new(query: &'a str) -> Self {
        Self {
            query,
            limit: DEFAULT_LIMIT,
            threshold: 0.0,
            category: None,
            doctype: None,
            explain: false,
        }
    }
}

/// An embedding model paired with the index built from it.
pub struct IndexLane<'a> {
    pub source: IndexSource,
    pub embedder: &'a dyn EmbeddingProvider,
    pub index: &'a dyn VectorIndex,
    /// Multiplier applied to this lane's raw scores before weighting.
    pub calibration: f64,
}

/// Everything a search reads, borrowed from one corpus snapshot.
pub struct SearchContext<'a> {
    pub registry: &'a DocumentRegistry,
    pub texts: &'a TextStore,
    pub weights: &'a WeightRegistry,
    pub general: IndexLane<'a>,
    pub code: Option<IndexLane<'a>>,
    /// Snippet length in characters; `0` keeps the whole chunk.
    pub snippet_chars: usize,
}

/// Candidate pool size requested from each index.
pub fn candidate_k(limit: usize) -> usize {
    limit.saturating_mul(4).max(limit.saturating_add(20))
}

struct Candidate {
    raw_score: f64,
    calibration: f64,
    source: IndexSource,
}

impl Candidate {
    fn calibrated(&self) -> f64 {
        self.raw_score * self.calibration
    }
}

/// Run a weighted search against a corpus snapshot.
///
/// Fails with [`CoreError::Validation`] for an empty query, `limit == 0`
/// or a non-finite threshold, and with [`CoreError::Embedding`] if any
/// embedding or index call fails. There are no partial results.
pub async fn search(ctx: &SearchContext<'_>, req: &SearchRequest<'_>) -> Result<Vec<SearchHit>> {
    if req.query.trim().is_empty() {
        return Err(CoreError::validation("query must not be empty"));
    }
    if req.limit == 0 {
        return Err(CoreError::validation("limit must be >= 1"));
    }
    if !req.threshold.is_finite() {
        return Err(CoreError::validation(format!(
            "threshold must be finite, got {}",
            req.threshold
        )));
    }

    let k = candidate_k(req.limit);
    let (general, code) = match &ctx.code {
        Some(code) => {
            try_join(
                query_lane(&ctx.general, req.query, k),
                query_lane(code, req.query, k),
            )
            .await?
        }
        None => (query_lane(&ctx.general, req.query, k).await?, Vec::new()),
    };

    // Keyed by canonical id so legacy and canonical spellings of one chunk merge
    let mut merged: HashMap<String, (Identifier, Candidate)> = HashMap::new();
    let lanes = [(&ctx.general, general)]
        .into_iter()
        .chain(ctx.code.as_ref().map(|lane| (lane, code)));
    for (lane, hits) in lanes {
        for hit in hits {
            let Ok(identifier) = Identifier::parse(&hit.id) else {
                continue;
            };
            let cand = Candidate {
                raw_score: hit.raw_score,
                calibration: lane.calibration,
                source: lane.source,
            };
            let key = identifier.to_string();
            match merged.get(&key) {
                Some((_, existing)) if existing.calibrated() >= cand.calibrated() => {}
                _ => {
                    merged.insert(key, (identifier, cand));
                }
            }
        }
    }

    let doctype = req.doctype.map(normalize_doctype);
    let mut results: Vec<(Identifier, SearchHit)> = Vec::new();

    for (id, (identifier, cand)) in merged {
        let parent = identifier.doc_id();
        let Ok(meta) = ctx.registry.resolve(parent) else {
            continue;
        };

        if let Some(category) = req.category {
            if meta.category != category {
                continue;
            }
        }
        if let Some(suffix) = &doctype {
            if !parent.to_lowercase().ends_with(suffix.as_str()) {
                continue;
            }
        }

        let Some((line_start, line_end, chunk_index, chunk_count)) =
            locate(ctx.texts, &identifier)
        else {
            continue;
        };

        let weights = ctx.weights.explain(parent);
        let adjusted = cand.calibrated() * weights.total;
        if adjusted.is_nan() || adjusted < req.threshold {
            continue;
        }

        let hit = SearchHit {
            id,
            source_document: parent.to_string(),
            raw_score: cand.raw_score,
            adjusted_score: adjusted,
            calibration: cand.calibration,
            weights,
            source_index: cand.source,
            snippet: String::new(),
            highlights: Vec::new(),
            line_start,
            line_end,
            chunk_index,
            chunk_count,
        };
        results.push((identifier, hit));
    }

    results.sort_by(|(_, a), (_, b)| {
        b.adjusted_score
            .total_cmp(&a.adjusted_score)
            .then_with(|| b.raw_score.total_cmp(&a.raw_score))
            .then_with(|| a.id.cmp(&b.id))
    });
    results.truncate(req.limit);

    Ok(results
        .into_iter()
        .map(|(identifier, mut hit)| {
            let text = match &identifier {
                Identifier::Plain(doc_id) => ctx.texts.get_full(doc_id),
                Identifier::Chunk { doc_id, index } => ctx.texts.chunk_text(doc_id, *index),
            };
            hit.snippet = truncate_chars(text.unwrap_or_default(), ctx.snippet_chars);
            hit.highlights = compute_highlights(&hit.snippet, req.query);
            hit
        })
        .collect())
}

async fn query_lane(lane: &IndexLane<'_>, query: &str, k: usize) -> Result<Vec<RawHit>> {
    let vector = lane.embedder.embed(query).await.map_err(into_embedding)?;
    lane.index.query(&vector, k).await.map_err(into_embedding)
}

fn into_embedding(err: CoreError) -> CoreError {
    match err {
        CoreError::Embedding(_) => err,
        other => CoreError::embedding(other.to_string()),
    }
}

/// Line span and chunk position of an indexed id, or `None` if stale.
fn locate(
    texts: &TextStore,
    identifier: &Identifier,
) -> Option<(usize, usize, Option<usize>, Option<usize>)> {
    match identifier {
        Identifier::Plain(doc_id) => {
            let total = texts.total_lines(doc_id).ok()?;
            Some((1, total, None, None))
        }
        Identifier::Chunk { doc_id, index } => {
            let chunks = texts.chunks(doc_id).ok()?;
            let span = chunks.get(*index)?;
            Some((span.line_start, span.line_end, Some(*index), Some(chunks.len())))
        }
    }
}

/// `py`, `.py` and `.PY` all mean `.py`.
fn normalize_doctype(doctype: &str) -> String {
    let lower = doctype.trim().to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{}", lower)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return text.to_string();
    }
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkingPolicy;
    use crate::identifier::chunk_id;
    use crate::weights::WeightTables;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            if self.fail {
                Err(CoreError::embedding("model offline"))
            } else {
                Ok(vec![1.0])
            }
        }
    }

    /// Returns a canned hit list and records the requested `k`.
    struct ScriptedIndex {
        hits: Vec<(String, f64)>,
        last_k: AtomicUsize,
    }

    impl ScriptedIndex {
        fn new(hits: &[(&str, f64)]) -> Self {
            Self {
                hits: hits.iter().map(|(id, s)| (id.to_string(), *s)).collect(),
                last_k: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VectorIndex for ScriptedIndex {
        async fn query(&self, _vector: &[f32], k: usize) -> Result<Vec<RawHit>> {
            self.last_k.store(k, Ordering::SeqCst);
            Ok(self
                .hits
                .iter()
                .take(k)
                .map(|(id, s)| RawHit {
                    id: id.clone(),
                    raw_score: *s,
                })
                .collect())
        }
        fn len(&self) -> usize {
            self.hits.len()
        }
    }

    struct Fixture {
        registry: DocumentRegistry,
        texts: TextStore,
        weights: WeightRegistry,
        embedder: FixedEmbedder,
    }

    impl Fixture {
        fn new(docs: &[(&str, usize)], policy: ChunkingPolicy) -> Self {
            let mut registry = DocumentRegistry::new();
            let mut texts = TextStore::new();
            for (doc_id, lines) in docs {
                let body = (1..=*lines)
                    .map(|i| format!("{} line {}", doc_id, i))
                    .collect::<Vec<_>>()
                    .join("\n");
                let total = texts.put(doc_id, &body, policy).unwrap();
                let (category, repo, _) = crate::identifier::split_doc_id(doc_id);
                registry
                    .register(doc_id, category, repo, "sum", total, None)
                    .unwrap();
            }
            Self {
                registry,
                texts,
                weights: WeightRegistry::new(),
                embedder: FixedEmbedder { fail: false },
            }
        }

        fn ctx<'a>(
            &'a self,
            general: &'a ScriptedIndex,
            code: Option<(&'a ScriptedIndex, f64)>,
        ) -> SearchContext<'a> {
            SearchContext {
                registry: &self.registry,
                texts: &self.texts,
                weights: &self.weights,
                general: IndexLane {
                    source: IndexSource::General,
                    embedder: &self.embedder,
                    index: general,
                    calibration: 1.0,
                },
                code: code.map(|(index, calibration)| IndexLane {
                    source: IndexSource::Code,
                    embedder: &self.embedder,
                    index,
                    calibration,
                }),
                snippet_chars: 0,
            }
        }
    }

    fn ids(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_validation() {
        let fx = Fixture::new(&[], ChunkingPolicy::Whole);
        let index = ScriptedIndex::new(&[]);
        let ctx = fx.ctx(&index, None);

        let mut req = SearchRequest::new("   ");
        assert!(matches!(search(&ctx, &req).await, Err(CoreError::Validation(_))));

        req.query = "foo";
        req.limit = 0;
        assert!(matches!(search(&ctx, &req).await, Err(CoreError::Validation(_))));

        req.limit = 3;
        req.threshold = f64::NAN;
        assert!(matches!(search(&ctx, &req).await, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_candidate_pool_size() {
        assert_eq!(candidate_k(1), 21);
        assert_eq!(candidate_k(6), 26);
        assert_eq!(candidate_k(10), 40);

        let fx = Fixture::new(&[("d/r/a.md", 3)], ChunkingPolicy::Whole);
        let index = ScriptedIndex::new(&[("d/r/a.md", 0.5)]);
        let ctx = fx.ctx(&index, None);
        let mut req = SearchRequest::new("foo");
        req.limit = 10;
        search(&ctx, &req).await.unwrap();
        assert_eq!(index.last_k.load(Ordering::SeqCst), 40);
    }

    #[tokio::test]
    async fn test_weights_reorder_hits() {
        let mut fx = Fixture::new(&[("d/r/a.md", 3), ("d/r/b.py", 3)], ChunkingPolicy::Whole);
        fx.weights = WeightRegistry::load(&WeightTables {
            extensions: [(".py".to_string(), 1.5)].into_iter().collect(),
            path_includes: Default::default(),
        })
        .unwrap();
        let index = ScriptedIndex::new(&[("d/r/a.md", 0.8), ("d/r/b.py", 0.7)]);
        let ctx = fx.ctx(&index, None);

        let hits = search(&ctx, &SearchRequest::new("foo")).await.unwrap();
        assert_eq!(ids(&hits), vec!["d/r/b.py", "d/r/a.md"]);
        assert!((hits[0].adjusted_score - 1.05).abs() < 1e-9);
        assert!((hits[0].raw_score - 0.7).abs() < 1e-9);
        assert!((hits[0].weights.extension - 1.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_runtime_weight_applies_to_chunks_of_parent() {
        let fx = Fixture::new(
            &[("c/r/big.rs", 100), ("c/r/other.rs", 10)],
            ChunkingPolicy::Lines { max_lines: 30 },
        );
        fx.weights.set_doc_weight("c/r/big.rs", 3.0).unwrap();
        let big = chunk_id("c/r/big.rs", 2);
        let other = chunk_id("c/r/other.rs", 0);
        let index = ScriptedIndex::new(&[
            (other.as_str(), 0.9),
            (big.as_str(), 0.5),
        ]);
        let ctx = fx.ctx(&index, None);

        let hits = search(&ctx, &SearchRequest::new("foo")).await.unwrap();
        assert_eq!(ids(&hits), vec![big.as_str(), other.as_str()]);
        let top = &hits[0];
        assert_eq!(top.source_document, "c/r/big.rs");
        assert_eq!((top.line_start, top.line_end), (61, 90));
        assert_eq!((top.chunk_index, top.chunk_count), (Some(2), Some(4)));
        assert!(top.snippet.starts_with("c/r/big.rs line 61"));
    }

    #[tokio::test]
    async fn test_hits_carry_snippet_highlights() {
        let fx = Fixture::new(&[("d/r/a.md", 2)], ChunkingPolicy::Whole);
        let index = ScriptedIndex::new(&[("d/r/a.md", 0.5)]);
        let ctx = fx.ctx(&index, None);

        // Snippet is "d/r/a.md line 1\nd/r/a.md line 2"
        let hits = search(&ctx, &SearchRequest::new("LINE 2")).await.unwrap();
        let spans: Vec<(usize, usize)> =
            hits[0].highlights.iter().map(|h| (h.start, h.end)).collect();
        assert_eq!(spans, vec![(9, 13), (25, 29), (30, 31)]);
    }

    #[tokio::test]
    async fn test_unreachable_threshold_is_empty() {
        let fx = Fixture::new(&[("d/r/a.md", 3), ("d/r/b.md", 3)], ChunkingPolicy::Whole);
        let index = ScriptedIndex::new(&[("d/r/a.md", 0.8), ("d/r/b.md", 0.7)]);
        let ctx = fx.ctx(&index, None);
        let mut req = SearchRequest::new("foo");
        req.limit = 3;
        req.threshold = 0.9;
        assert!(search(&ctx, &req).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ties_break_by_id_and_are_stable() {
        let fx = Fixture::new(
            &[("d/r/c.md", 1), ("d/r/a.md", 1), ("d/r/b.md", 1)],
            ChunkingPolicy::Whole,
        );
        let index = ScriptedIndex::new(&[("d/r/c.md", 0.5), ("d/r/a.md", 0.5), ("d/r/b.md", 0.5)]);
        let ctx = fx.ctx(&index, None);
        let first = search(&ctx, &SearchRequest::new("foo")).await.unwrap();
        assert_eq!(ids(&first), vec!["d/r/a.md", "d/r/b.md", "d/r/c.md"]);
        for _ in 0..5 {
            let again = search(&ctx, &SearchRequest::new("foo")).await.unwrap();
            assert_eq!(ids(&again), ids(&first));
        }
    }

    #[tokio::test]
    async fn test_category_and_doctype_filters() {
        let fx = Fixture::new(
            &[("code/r/a.py", 2), ("code/r/b.md", 2), ("docs/r/c.PY", 2)],
            ChunkingPolicy::Whole,
        );
        let index = ScriptedIndex::new(&[
            ("code/r/a.py", 0.9),
            ("code/r/b.md", 0.8),
            ("docs/r/c.PY", 0.7),
        ]);
        let ctx = fx.ctx(&index, None);

        let mut req = SearchRequest::new("foo");
        req.category = Some("code");
        assert_eq!(ids(&search(&ctx, &req).await.unwrap()), vec!["code/r/a.py", "code/r/b.md"]);

        req.category = None;
        req.doctype = Some("py");
        assert_eq!(ids(&search(&ctx, &req).await.unwrap()), vec!["code/r/a.py", "docs/r/c.PY"]);

        req.category = Some("docs");
        req.doctype = Some(".py");
        assert_eq!(ids(&search(&ctx, &req).await.unwrap()), vec!["docs/r/c.PY"]);
    }

    #[tokio::test]
    async fn test_stale_ids_are_skipped() {
        let fx = Fixture::new(&[("d/r/a.md", 3)], ChunkingPolicy::Whole);
        let index = ScriptedIndex::new(&[
            ("d/r/gone.md", 0.99),
            ("d/r/a.md::chunk-0007", 0.95),
            ("d/r/a.md", 0.5),
        ]);
        let ctx = fx.ctx(&index, None);
        let hits = search(&ctx, &SearchRequest::new("foo")).await.unwrap();
        assert_eq!(ids(&hits), vec!["d/r/a.md"]);
        assert_eq!((hits[0].line_start, hits[0].line_end), (1, 3));
    }

    #[tokio::test]
    async fn test_dual_index_merge() {
        let fx = Fixture::new(
            &[("c/r/a.py", 2), ("c/r/b.py", 2), ("c/r/c.py", 2)],
            ChunkingPolicy::Whole,
        );
        let general = ScriptedIndex::new(&[("c/r/a.py", 0.6), ("c/r/b.py", 0.5)]);
        let code = ScriptedIndex::new(&[("c/r/a.py", 0.4), ("c/r/b.py", 0.25), ("c/r/c.py", 0.15)]);
        // code scores doubled: a=0.8 (wins), b=0.5 (tie, general kept), c=0.3
        let ctx = fx.ctx(&general, Some((&code, 2.0)));

        let hits = search(&ctx, &SearchRequest::new("foo")).await.unwrap();
        assert_eq!(ids(&hits), vec!["c/r/a.py", "c/r/b.py", "c/r/c.py"]);
        assert_eq!(hits[0].source_index, IndexSource::Code);
        assert!((hits[0].adjusted_score - 0.8).abs() < 1e-9);
        assert_eq!(hits[1].source_index, IndexSource::General);
        assert_eq!(hits[2].source_index, IndexSource::Code);
    }

    #[tokio::test]
    async fn test_legacy_and_canonical_ids_merge() {
        let fx = Fixture::new(&[("d/r/a.md", 10)], ChunkingPolicy::Lines { max_lines: 5 });
        let canonical = chunk_id("d/r/a.md", 1);
        let general = ScriptedIndex::new(&[("d/r/a.md#chunk-1", 0.6)]);
        let code = ScriptedIndex::new(&[(canonical.as_str(), 0.4)]);
        let ctx = fx.ctx(&general, Some((&code, 1.0)));

        let hits = search(&ctx, &SearchRequest::new("foo")).await.unwrap();
        assert_eq!(ids(&hits), vec![canonical.as_str()]);
        assert_eq!(hits[0].source_index, IndexSource::General);
        assert_eq!((hits[0].line_start, hits[0].line_end), (6, 10));
    }

    #[tokio::test]
    async fn test_lane_failure_fails_search() {
        let mut fx = Fixture::new(&[("d/r/a.md", 3)], ChunkingPolicy::Whole);
        fx.embedder = FixedEmbedder { fail: true };
        let index = ScriptedIndex::new(&[("d/r/a.md", 0.5)]);
        let ctx = fx.ctx(&index, Some((&index, 1.0)));
        assert!(matches!(
            search(&ctx, &SearchRequest::new("foo")).await,
            Err(CoreError::Embedding(_))
        ));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo world", 5), "héllo…");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("keep all", 0), "keep all");
    }

    #[test]
    fn test_normalize_doctype() {
        assert_eq!(normalize_doctype("PY"), ".py");
        assert_eq!(normalize_doctype(".Md"), ".md");
    }
}
