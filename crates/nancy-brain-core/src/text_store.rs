//! Normalized document text with exact line-range slicing.
//!
//! Each document is stored once as a single `String` plus a table of line
//! start offsets, so a range read is one bounds computation and one copy.
//! The chunk boundary table produced by [`chunk_lines`] is stored alongside.

use std::collections::HashMap;

use crate::chunk::{chunk_lines, count_lines, normalize_text, ChunkingPolicy};
use crate::error::{CoreError, Result};
use crate::identifier::validate_doc_id;
use crate::models::ChunkSpan;

struct StoredText {
    text: String,
    /// Byte offset of the first character of every line.
    line_starts: Vec<usize>,
    chunks: Vec<ChunkSpan>,
}

impl StoredText {
    fn total_lines(&self) -> usize {
        self.line_starts.len()
    }

    /// Lines `start..=end`, 1-based. Caller guarantees bounds.
    fn slice(&self, start: usize, end: usize) -> &str {
        let from = self.line_starts[start - 1];
        let to = if end < self.total_lines() {
            self.line_starts[end] - 1
        } else {
            self.text.len()
        };
        &self.text[from..to]
    }
}

/// A resolved line range.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSlice {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub total_lines: usize,
    pub is_partial: bool,
}

/// A resolved chunk window: the covered range plus the chunks it spans.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkWindow {
    pub range: RangeSlice,
    pub chunks: Vec<ChunkSpan>,
    pub chunk_count: usize,
}

#[derive(Default)]
pub struct TextStore {
    docs: HashMap<String, StoredText>,
}

impl TextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize `text`, chunk it per `policy`, and store both.
    ///
    /// Returns the document's line count. Replaces any previous text.
    pub fn put(&mut self, doc_id: &str, text: &str, policy: ChunkingPolicy) -> Result<usize> {
        validate_doc_id(doc_id)?;
        let text = normalize_text(text);
        let total_lines = count_lines(&text);

        let mut line_starts = Vec::with_capacity(total_lines);
        if total_lines > 0 {
            line_starts.push(0);
            line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        }

        self.docs.insert(
            doc_id.to_string(),
            StoredText {
                text,
                line_starts,
                chunks: chunk_lines(total_lines, policy),
            },
        );
        Ok(total_lines)
    }

    pub fn remove(&mut self, doc_id: &str) -> bool {
        self.docs.remove(doc_id).is_some()
    }

    pub fn contains(&self, doc_id: &str) -> bool {
        self.docs.contains_key(doc_id)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn get_full(&self, doc_id: &str) -> Result<&str> {
        Ok(&self.lookup(doc_id)?.text)
    }

    pub fn total_lines(&self, doc_id: &str) -> Result<usize> {
        Ok(self.lookup(doc_id)?.total_lines())
    }

    pub fn chunks(&self, doc_id: &str) -> Result<&[ChunkSpan]> {
        Ok(&self.lookup(doc_id)?.chunks)
    }

    /// Text of a single chunk.
    pub fn chunk_text(&self, doc_id: &str, index: usize) -> Result<&str> {
        let stored = self.lookup(doc_id)?;
        let span = chunk_at(stored, doc_id, index)?;
        Ok(stored.slice(span.line_start, span.line_end))
    }

    /// Slice lines `start..=end` (1-based, inclusive).
    ///
    /// `start` is clamped up to 1 and `end` down to the line count. If the
    /// clamped range is empty (`start > end`) the call fails with
    /// [`CoreError::Validation`]. A zero-line document always yields an
    /// empty, non-partial slice.
    pub fn get_range(&self, doc_id: &str, start: i64, end: i64) -> Result<RangeSlice> {
        let stored = self.lookup(doc_id)?;
        let total = stored.total_lines();
        if total == 0 {
            return Ok(RangeSlice {
                text: String::new(),
                start: 1,
                end: 0,
                total_lines: 0,
                is_partial: false,
            });
        }

        let start = start.max(1);
        let end = end.min(total as i64);
        if start > end {
            return Err(CoreError::validation(format!(
                "empty line range {}..{} for '{}' ({} lines)",
                start, end, doc_id, total
            )));
        }
        let (start, end) = (start as usize, end as usize);

        Ok(RangeSlice {
            text: stored.slice(start, end).to_string(),
            start,
            end,
            total_lines: total,
            is_partial: (start, end) != (1, total),
        })
    }

    /// Lines covered by chunks `index - window ..= index + window`, clipped
    /// to the document's chunk table.
    pub fn get_chunk_window(&self, doc_id: &str, index: usize, window: usize) -> Result<ChunkWindow> {
        let stored = self.lookup(doc_id)?;
        chunk_at(stored, doc_id, index)?;

        let first = index.saturating_sub(window);
        let last = index.saturating_add(window).min(stored.chunks.len() - 1);
        let covered = stored.chunks[first..=last].to_vec();
        let start = covered[0].line_start;
        let end = covered[covered.len() - 1].line_end;
        let total = stored.total_lines();

        Ok(ChunkWindow {
            range: RangeSlice {
                text: stored.slice(start, end).to_string(),
                start,
                end,
                total_lines: total,
                is_partial: (start, end) != (1, total),
            },
            chunks: covered,
            chunk_count: stored.chunks.len(),
        })
    }

    fn lookup(&self, doc_id: &str) -> Result<&StoredText> {
        self.docs
            .get(doc_id)
            .ok_or_else(|| CoreError::not_found(format!("document '{}'", doc_id)))
    }
}

fn chunk_at<'a>(stored: &'a StoredText, doc_id: &str, index: usize) -> Result<&'a ChunkSpan> {
    stored.chunks.get(index).ok_or_else(|| {
        CoreError::not_found(format!(
            "chunk {} of '{}' ({} chunks)",
            index,
            doc_id,
            stored.chunks.len()
        ))
    })
}
