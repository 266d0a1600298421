//! Identifier parsing at the API boundary.
//!
//! Callers address text either by a plain document id
//! (`<category>/<repo>/<relative_path>`) or by a chunk id
//! (`<doc_id>::chunk-0007`). [`Identifier::parse`] is the only place that
//! inspects string shape; everything downstream switches on the variant.
//!
//! Legacy chunk markers (`#chunk-`, `|chunk:`, `@chunk:`) are accepted and
//! canonicalized to `::chunk-NNNN`.

use std::fmt;

use crate::error::{CoreError, Result};

/// Canonical chunk marker.
pub const CHUNK_MARKER: &str = "::chunk-";

const CHUNK_MARKERS: [&str; 4] = [CHUNK_MARKER, "#chunk-", "|chunk:", "@chunk:"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// A whole document.
    Plain(String),
    /// One chunk of a document.
    Chunk { doc_id: String, index: usize },
}

impl Identifier {
    /// Parse a raw identifier.
    ///
    /// Fails with [`CoreError::Validation`] for empty ids, ids containing
    /// control characters, and chunk ids with an empty parent.
    pub fn parse(raw: &str) -> Result<Self> {
        validate_doc_id(raw)?;

        for marker in CHUNK_MARKERS {
            let Some(pos) = raw.rfind(marker) else {
                continue;
            };
            let digits = &raw[pos + marker.len()..];
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            let doc_id = &raw[..pos];
            if doc_id.is_empty() {
                return Err(CoreError::validation(format!(
                    "chunk id '{}' has no parent document",
                    raw
                )));
            }
            let index = digits.parse::<usize>().map_err(|_| {
                CoreError::validation(format!("chunk index out of range in '{}'", raw))
            })?;
            return Ok(Self::Chunk {
                doc_id: doc_id.to_string(),
                index,
            });
        }

        Ok(Self::Plain(raw.to_string()))
    }

    /// The parent document id.
    pub fn doc_id(&self) -> &str {
        match self {
            Self::Plain(doc_id) => doc_id,
            Self::Chunk { doc_id, .. } => doc_id,
        }
    }

    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            Self::Plain(_) => None,
            Self::Chunk { index, .. } => Some(*index),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(doc_id) => f.write_str(doc_id),
            Self::Chunk { doc_id, index } => f.write_str(&chunk_id(doc_id, *index)),
        }
    }
}

/// Format the canonical chunk id for `doc_id` and `index`.
pub fn chunk_id(doc_id: &str, index: usize) -> String {
    format!("{}{}{:04}", doc_id, CHUNK_MARKER, index)
}

/// Reject empty ids and ids carrying control characters.
pub fn validate_doc_id(doc_id: &str) -> Result<()> {
    if doc_id.is_empty() {
        return Err(CoreError::validation("doc_id must not be empty"));
    }
    if doc_id.chars().any(char::is_control) {
        return Err(CoreError::validation(format!(
            "doc_id {:?} contains control characters",
            doc_id
        )));
    }
    Ok(())
}

/// Split a doc id into `(category, repo, relative_path)`.
///
/// Missing segments come back as empty strings.
pub fn split_doc_id(doc_id: &str) -> (&str, &str, &str) {
    let mut parts = doc_id.splitn(3, '/');
    let category = parts.next().unwrap_or("");
    let repo = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("");
    (category, repo, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_id() {
        let id = Identifier::parse("docs/astropy/README.md").unwrap();
        assert_eq!(id, Identifier::Plain("docs/astropy/README.md".into()));
        assert_eq!(id.chunk_index(), None);
    }

    #[test]
    fn test_canonical_chunk_id() {
        let id = Identifier::parse("code/repo/src/a.py::chunk-0003").unwrap();
        assert_eq!(id.doc_id(), "code/repo/src/a.py");
        assert_eq!(id.chunk_index(), Some(3));
        assert_eq!(id.to_string(), "code/repo/src/a.py::chunk-0003");
    }

    #[test]
    fn test_legacy_markers_canonicalize() {
        for raw in ["a/b.py#chunk-0002", "a/b.py|chunk:2", "a/b.py@chunk:02"] {
            let id = Identifier::parse(raw).unwrap();
            assert_eq!(id.to_string(), "a/b.py::chunk-0002", "raw = {}", raw);
        }
    }

    #[test]
    fn test_marker_without_digits_is_plain() {
        let id = Identifier::parse("notes/x::chunk-abc").unwrap();
        assert!(matches!(id, Identifier::Plain(_)));
    }

    #[test]
    fn test_rejects_empty_and_control_chars() {
        assert!(matches!(
            Identifier::parse(""),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            Identifier::parse("a/b\n.py"),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            Identifier::parse("::chunk-0001"),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_split_doc_id() {
        assert_eq!(
            split_doc_id("tools/astropy/docs/index.rst"),
            ("tools", "astropy", "docs/index.rst")
        );
        assert_eq!(split_doc_id("solo"), ("solo", "", ""));
    }
}
