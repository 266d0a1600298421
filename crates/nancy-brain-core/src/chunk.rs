//! Line-based chunking and text normalization.
//!
//! Documents longer than the embedding model's input are split into
//! [`ChunkSpan`]s of at most `max_lines` lines each. Chunks are sequential
//! and never overlap; surrounding context is recovered at read time with
//! chunk windowing instead.
//!
//! # Algorithm
//!
//! 1. Normalize line endings (`\r\n` and `\r` become `\n`) and drop a
//!    single trailing newline.
//! 2. Count lines; an empty text has zero lines and no chunks.
//! 3. Emit spans `[1, n]`, `[n+1, 2n]`, … with the last span ending at
//!    `total_lines`.
//!
//! # Example
//!
//! ```rust
//! use nancy_brain_core::chunk::{chunk_lines, ChunkingPolicy};
//!
//! let spans = chunk_lines(250, ChunkingPolicy::Lines { max_lines: 100 });
//! assert_eq!(spans.len(), 3);
//! assert_eq!((spans[2].line_start, spans[2].line_end), (201, 250));
//! ```

use sha2::{Digest, Sha256};

use crate::models::ChunkSpan;

/// How a document is split at ingestion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkingPolicy {
    /// One chunk spanning the whole document.
    #[default]
    Whole,
    /// Sequential chunks of at most `max_lines` lines.
    Lines { max_lines: usize },
}

impl ChunkingPolicy {
    /// `0` means whole documents.
    pub fn from_max_lines(max_lines: usize) -> Self {
        if max_lines == 0 {
            Self::Whole
        } else {
            Self::Lines { max_lines }
        }
    }
}

/// Compute the chunk table for a document of `total_lines` lines.
///
/// # Guarantees
///
/// - Indices are contiguous: `0, 1, …, N-1`.
/// - Spans tile `[1, total_lines]` exactly once, in order.
/// - A zero-line document yields no chunks.
pub fn chunk_lines(total_lines: usize, policy: ChunkingPolicy) -> Vec<ChunkSpan> {
    if total_lines == 0 {
        return Vec::new();
    }

    let step = match policy {
        ChunkingPolicy::Whole => total_lines,
        ChunkingPolicy::Lines { max_lines } => max_lines.max(1),
    };

    (0..total_lines.div_ceil(step))
        .map(|index| {
            let line_start = index * step + 1;
            ChunkSpan {
                index,
                line_start,
                line_end: (line_start + step - 1).min(total_lines),
            }
        })
        .collect()
}

/// Normalize line endings and drop one trailing newline.
pub fn normalize_text(text: &str) -> String {
    let mut out = text.replace("\r\n", "\n").replace('\r', "\n");
    if out.ends_with('\n') {
        out.pop();
    }
    out
}

/// Number of lines in already-normalized text.
pub fn count_lines(normalized: &str) -> usize {
    if normalized.is_empty() {
        0
    } else {
        normalized.matches('\n').count() + 1
    }
}

/// SHA-256 of the normalized text, lowercase hex.
pub fn content_checksum(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}
