//! Document registry: the namespace directory of the corpus.
//!
//! Maps each doc id to its [`DocumentMeta`] (category, repo, checksum, line
//! count, URL template). Entries are kept in a `BTreeMap` so prefix listings
//! are ordered range scans.
//!
//! # URL templates
//!
//! A template may contain `{path}` (the relative path), `{start}` and
//! `{end}` (the resolved line range):
//!
//! ```text
//! https://github.com/astropy/astropy/blob/main/{path}#L{start}-L{end}
//! ```

use std::collections::btree_map::{self, BTreeMap};
use std::collections::VecDeque;

use crate::error::{CoreError, Result};
use crate::identifier::{split_doc_id, validate_doc_id};
use crate::models::{DocumentMeta, EntryKind, TreeEntry};

/// What a [`DocumentRegistry::register`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Inserted,
    Unchanged,
    /// The checksum differed from the existing entry.
    Updated,
}

#[derive(Debug, Default)]
pub struct DocumentRegistry {
    docs: BTreeMap<String, DocumentMeta>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a document entry.
    ///
    /// Re-registering with the same checksum is a no-op apart from refreshing
    /// the line count and template; a different checksum marks the entry
    /// as updated.
    pub fn register(
        &mut self,
        doc_id: &str,
        category: &str,
        repo: &str,
        checksum: &str,
        total_lines: usize,
        url_template: Option<&str>,
    ) -> Result<RegisterOutcome> {
        validate_doc_id(doc_id)?;
        let (_, _, relative_path) = split_doc_id(doc_id);

        let mut meta = DocumentMeta {
            doc_id: doc_id.to_string(),
            category: category.to_string(),
            repo: repo.to_string(),
            relative_path: relative_path.to_string(),
            content_checksum: checksum.to_string(),
            total_lines,
            source_url_template: url_template.map(str::to_string),
            updated: false,
        };

        let outcome = match self.docs.get(doc_id) {
            None => RegisterOutcome::Inserted,
            Some(existing) if existing.content_checksum == checksum => {
                meta.updated = existing.updated;
                RegisterOutcome::Unchanged
            }
            Some(_) => {
                meta.updated = true;
                RegisterOutcome::Updated
            }
        };
        self.docs.insert(doc_id.to_string(), meta);
        Ok(outcome)
    }

    pub fn remove(&mut self, doc_id: &str) -> Option<DocumentMeta> {
        self.docs.remove(doc_id)
    }

    pub fn resolve(&self, doc_id: &str) -> Result<&DocumentMeta> {
        self.docs
            .get(doc_id)
            .ok_or_else(|| CoreError::not_found(format!("document '{}'", doc_id)))
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

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.docs.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &DocumentMeta> {
        self.docs.values()
    }

    /// Browsable link for `doc_id` covering `start..=end`.
    ///
    /// Returns `Ok(None)` when the document has no template.
    pub fn build_source_url(&self, doc_id: &str, start: usize, end: usize) -> Result<Option<String>> {
        let meta = self.resolve(doc_id)?;
        Ok(meta.source_url_template.as_ref().map(|template| {
            template
                .replace("{path}", &meta.relative_path)
                .replace("{start}", &start.to_string())
                .replace("{end}", &end.to_string())
        }))
    }

    /// Walk the documents under `prefix` as a directory hierarchy.
    ///
    /// The walk is lazy, finite and ordered; every call starts fresh.
    /// `prefix` is matched on whole path segments and a trailing `/` is
    /// ignored. Fails with [`CoreError::Validation`] when `max_depth` is 0.
    pub fn list_tree(&self, prefix: &str, max_depth: usize) -> Result<TreeWalk<'_>> {
        if max_depth == 0 {
            return Err(CoreError::validation("max_depth must be >= 1"));
        }
        let trimmed = prefix.trim_matches('/');
        let base = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}/", trimmed)
        };

        Ok(TreeWalk {
            ids: self.docs.range(base.clone()..),
            base,
            max_depth,
            open: Vec::new(),
            pending: VecDeque::new(),
            done: false,
        })
    }
}

/// Lazy pre-order walk produced by [`DocumentRegistry::list_tree`].
pub struct TreeWalk<'a> {
    ids: btree_map::Range<'a, String, DocumentMeta>,
    base: String,
    max_depth: usize,
    /// Directory path currently open at each depth.
    open: Vec<String>,
    pending: VecDeque<TreeEntry>,
    done: bool,
}

impl TreeWalk<'_> {
    fn expand(&mut self, doc_id: &str) {
        let rel = &doc_id[self.base.len()..];
        let segments: Vec<&str> = rel.split('/').collect();
        let levels = segments.len().min(self.max_depth);

        for depth in 0..levels {
            let path = format!("{}{}", self.base, segments[..=depth].join("/"));
            let is_file = depth + 1 == segments.len();

            if is_file {
                self.open.truncate(depth);
                self.pending.push_back(TreeEntry {
                    path,
                    name: segments[depth].to_string(),
                    kind: EntryKind::File,
                    depth: depth + 1,
                    doc_id: Some(doc_id.to_string()),
                });
            } else if self.open.get(depth) != Some(&path) {
                self.open.truncate(depth);
                self.open.push(path.clone());
                self.pending.push_back(TreeEntry {
                    path,
                    name: segments[depth].to_string(),
                    kind: EntryKind::Directory,
                    depth: depth + 1,
                    doc_id: None,
                });
            }
        }
    }
}

impl Iterator for TreeWalk<'_> {
    type Item = TreeEntry;

    fn next(&mut self) -> Option<TreeEntry> {
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Some(entry);
            }
            if self.done {
                return None;
            }
            match self.ids.next() {
                Some((doc_id, _)) if doc_id.starts_with(&self.base) => self.expand(doc_id),
                _ => self.done = true,
            }
        }
    }
}
