//! Passage retrieval: identifier plus optional range or window to an exact,
//! bounded slice of text with provenance.
//!
//! Resolution rules:
//!
//! | Identifier | Range given | Result |
//! |------------|-------------|--------|
//! | plain doc id | no | whole document, non-partial |
//! | plain doc id | yes | `get_range`, missing bound = 1 / last line |
//! | chunk id | yes | range on the parent's line numbering, window ignored |
//! | chunk id | no | chunk window, default width 1 |

use crate::error::{CoreError, Result};
use crate::identifier::Identifier;
use crate::models::{BatchItem, BatchResult, ErrorView, Passage};
use crate::registry::DocumentRegistry;
use crate::text_store::{RangeSlice, TextStore};

/// Default chunk window for chunk ids without a range.
pub const DEFAULT_WINDOW: usize = 1;

/// Read-only view of a corpus snapshot used for retrieval.
#[derive(Clone, Copy)]
pub struct Retriever<'a> {
    pub registry: &'a DocumentRegistry,
    pub texts: &'a TextStore,
    pub default_window: usize,
}

impl<'a> Retriever<'a> {
    pub fn new(registry: &'a DocumentRegistry, texts: &'a TextStore) -> Self {
        Self {
            registry,
            texts,
            default_window: DEFAULT_WINDOW,
        }
    }

    /// Resolve one identifier into a [`Passage`].
    pub fn retrieve(
        &self,
        id: &str,
        start: Option<i64>,
        end: Option<i64>,
        window: Option<usize>,
    ) -> Result<Passage> {
        let identifier = Identifier::parse(id)?;
        let doc_id = identifier.doc_id();
        let meta = self.registry.resolve(doc_id)?;
        let has_range = start.is_some() || end.is_some();

        let (slice, chunks) = match &identifier {
            Identifier::Plain(_) if !has_range => (self.full(doc_id)?, None),
            Identifier::Plain(_) => (self.range(doc_id, start, end)?, None),
            Identifier::Chunk { index, .. } => {
                let count = self.texts.chunks(doc_id)?.len();
                if *index >= count {
                    return Err(CoreError::not_found(format!(
                        "chunk {} of '{}' ({} chunks)",
                        index, doc_id, count
                    )));
                }
                if has_range {
                    (self.range(doc_id, start, end)?, None)
                } else {
                    let width = window.unwrap_or(self.default_window);
                    let w = self.texts.get_chunk_window(doc_id, *index, width)?;
                    (w.range, Some(w.chunks))
                }
            }
        };

        let github_url = self.registry.build_source_url(doc_id, slice.start, slice.end)?;
        Ok(Passage {
            doc_id: doc_id.to_string(),
            start: slice.start,
            end: slice.end,
            text: slice.text,
            total_lines: slice.total_lines,
            is_partial: slice.is_partial,
            github_url,
            content_sha256: meta.content_checksum.clone(),
            chunks,
        })
    }

    /// Resolve every item independently, preserving input order.
    ///
    /// A failing item occupies its slot with an [`ErrorView`] and never
    /// affects its neighbours.
    pub fn retrieve_batch(&self, items: &[BatchItem]) -> Vec<BatchResult> {
        items
            .iter()
            .map(|item| {
                match self.retrieve(&item.doc_id, item.start, item.end, item.window) {
                    Ok(passage) => BatchResult::Passage(passage),
                    Err(err) => BatchResult::Error(ErrorView {
                        doc_id: item.doc_id.clone(),
                        error: err.code().to_string(),
                        message: err.to_string(),
                    }),
                }
            })
            .collect()
    }

    fn full(&self, doc_id: &str) -> Result<RangeSlice> {
        let total = self.texts.total_lines(doc_id)?;
        self.texts.get_range(doc_id, 1, total as i64)
    }

    fn range(&self, doc_id: &str, start: Option<i64>, end: Option<i64>) -> Result<RangeSlice> {
        let total = self.texts.total_lines(doc_id)?;
        self.texts
            .get_range(doc_id, start.unwrap_or(1), end.unwrap_or(total as i64))
    }
}
