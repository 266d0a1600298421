//! Corpus ingestion: filesystem scan into a published [`Snapshot`].
//!
//! The corpus root is laid out as `<category>/<repo>/<path>`; the relative
//! path of each file (with `/` separators) becomes its doc id. Files shallower
//! than three segments have no repo and are skipped, as are files that are
//! not valid UTF-8.
//!
//! ```text
//! knowledge_base/raw/
//! ├── tools/
//! │   └── astropy/
//! │       ├── README.md          → tools/astropy/README.md
//! │       └── astropy/units.py   → tools/astropy/astropy/units.py
//! └── papers/
//!     └── reviews/notes.txt      → papers/reviews/notes.txt
//! ```

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use nancy_brain_core::embedding::EmbeddingProvider;
use nancy_brain_core::identifier::split_doc_id;
use nancy_brain_core::models::IngestRecord;
use nancy_brain_core::{CorpusBuilder, Snapshot};
use std::path::Path;
use std::time::Instant;
use walkdir::WalkDir;

use crate::config::{Config, CorpusConfig};

/// Walk the corpus root and produce one record per eligible file, sorted by
/// doc id.
pub fn scan_corpus(corpus: &CorpusConfig) -> Result<Vec<IngestRecord>> {
    let root = &corpus.root;
    if !root.exists() {
        bail!("Corpus root does not exist: {}", root.display());
    }

    let include_set = build_globset(&corpus.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/__pycache__/**".to_string(),
    ];
    default_excludes.extend(corpus.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut records = Vec::new();

    let walker = WalkDir::new(root).follow_links(corpus.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let doc_id = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&doc_id) || !include_set.is_match(&doc_id) {
            continue;
        }

        let (category, repo, rest) = split_doc_id(&doc_id);
        if rest.is_empty() {
            tracing::debug!(doc_id = %doc_id, "skipping file outside <category>/<repo>/");
            continue;
        }
        let category = category.to_string();
        let repo = repo.to_string();

        let Some(text) = read_text(path)? else {
            tracing::debug!(doc_id = %doc_id, "skipping non-UTF-8 file");
            continue;
        };

        let url_template = corpus
            .repos
            .get(&format!("{}/{}", category, repo))
            .and_then(|r| r.url_template.clone());

        records.push(IngestRecord {
            doc_id,
            text,
            category,
            repo,
            // Computed by the builder from the normalized text
            checksum: String::new(),
            url_template,
        });
    }

    // Sort for deterministic ordering
    records.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));

    Ok(records)
}

fn read_text(path: &Path) -> Result<Option<String>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8(bytes).ok())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?,
        );
    }
    Ok(builder.build()?)
}

/// Scan, chunk and embed the corpus into a fresh snapshot.
pub async fn build_snapshot(
    config: &Config,
    general: Option<&dyn EmbeddingProvider>,
    code: Option<&dyn EmbeddingProvider>,
) -> Result<Snapshot> {
    let started = Instant::now();
    let records = scan_corpus(&config.corpus)?;
    tracing::info!(
        root = %config.corpus.root.display(),
        files = records.len(),
        "scanned corpus"
    );

    let mut builder = CorpusBuilder::new(config.chunking.policy())
        .with_code_extensions(&config.corpus.code_extensions);
    for record in records {
        let doc_id = record.doc_id.clone();
        if let Err(e) = builder.add(record) {
            tracing::warn!(doc_id = %doc_id, error = %e, "skipping document");
        }
    }

    let documents = builder.len();
    let snapshot = builder
        .build(general, code, config.embedding.batch_size)
        .await
        .context("Failed to embed corpus")?;

    tracing::info!(
        documents,
        general_vectors = snapshot.general_index().len(),
        code_vectors = snapshot.code_index().map(|i| i.len()).unwrap_or(0),
        index_version = snapshot.index_version(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "corpus ready"
    );
    Ok(snapshot)
}
