//! CLI command implementations.
//!
//! Each command loads the corpus through [`App::open`], performs one
//! operation and prints either a human-readable report or, with `--json`,
//! the same payload the HTTP server would return.

use anyhow::Result;
use nancy_brain_core::models::{EntryKind, HealthStatus};
use nancy_brain_core::search::SearchRequest;
use serde::Serialize;

use crate::config::Config;
use crate::service::App;
use crate::weights_file::WeightsFile;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub struct SearchArgs {
    pub query: String,
    pub limit: Option<usize>,
    pub threshold: f64,
    pub category: Option<String>,
    pub doctype: Option<String>,
    pub explain: bool,
    pub json: bool,
}

pub async fn run_search(config: &Config, args: SearchArgs) -> Result<()> {
    let app = App::open(config).await?;

    let mut req = SearchRequest::new(&args.query);
    req.limit = args.limit.unwrap_or(config.retrieval.default_limit);
    req.threshold = args.threshold;
    req.category = args.category.as_deref();
    req.doctype = args.doctype.as_deref();
    req.explain = args.explain;

    let response = app.service().search(&req).await?;
    if args.json {
        return print_json(&response);
    }

    if response.hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in response.hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} (lines {}-{}, {:?})",
            i + 1,
            hit.score,
            hit.source_document,
            hit.line_start,
            hit.line_end,
            hit.source_index
        );
        if let Some(w) = &hit.weights {
            println!(
                "    weights: extension {:.2} × path {:.2} × doc {:.2} = {:.2} (raw {:.3})",
                w.extension, w.path, w.doc, w.total, hit.raw_score
            );
        }
        println!("    excerpt: \"{}\"", hit.text.replace('\n', " ").trim());
        println!("    id: {}", hit.id);
        println!();
    }
    println!("index_version: {}", response.index_version);
    Ok(())
}

pub async fn run_retrieve(
    config: &Config,
    id: &str,
    start: Option<i64>,
    end: Option<i64>,
    window: Option<usize>,
    json: bool,
) -> Result<()> {
    let app = App::open(config).await?;
    let passage = app.service().retrieve(id, start, end, window)?;
    if json {
        return print_json(&passage);
    }

    println!("--- Passage ---");
    println!("doc_id:      {}", passage.doc_id);
    println!(
        "lines:       {}-{} of {}{}",
        passage.start,
        passage.end,
        passage.total_lines,
        if passage.is_partial { " (partial)" } else { "" }
    );
    if let Some(url) = &passage.github_url {
        println!("url:         {}", url);
    }
    println!("sha256:      {}", passage.content_sha256);
    if let Some(chunks) = &passage.chunks {
        let indexes: Vec<String> = chunks.iter().map(|c| c.index.to_string()).collect();
        println!("chunks:      {}", indexes.join(", "));
    }
    println!();
    println!("{}", passage.text);
    Ok(())
}

pub async fn run_tree(
    config: &Config,
    prefix: Option<&str>,
    depth: Option<usize>,
    max_entries: Option<usize>,
    json: bool,
) -> Result<()> {
    let app = App::open(config).await?;
    let tree = app.service().list_tree(prefix, depth, max_entries)?;
    if json {
        return print_json(&tree);
    }

    if tree.entries.is_empty() {
        println!("(empty)");
        return Ok(());
    }
    for entry in &tree.entries {
        let indent = "  ".repeat(entry.depth.saturating_sub(1));
        match entry.kind {
            EntryKind::Directory => println!("{}{}/", indent, entry.name),
            EntryKind::File => println!("{}{}", indent, entry.name),
        }
    }
    if tree.truncated {
        println!("... (truncated at {} entries)", tree.entries.len());
    }
    Ok(())
}

pub async fn run_health(config: &Config, json: bool) -> Result<()> {
    let app = App::open(config).await?;
    let health = app.service().health();
    if json {
        return print_json(&health);
    }

    let status = match health.status {
        HealthStatus::Ok => "ok",
        HealthStatus::Degraded => "degraded",
    };
    println!("status:          {}", status);
    println!("documents:       {}", health.documents_count);
    println!("index_version:   {}", health.index_version);
    println!("last_updated:    {}", health.last_updated);
    Ok(())
}

/// Edit the persisted doc weights without loading the corpus.
///
/// Takes effect the next time the corpus is opened (or on `POST /weights`
/// for a running server).
pub fn run_weight(config: &Config, doc_id: &str, multiplier: Option<f64>) -> Result<()> {
    let path = config.weights.doc_weights_path.as_ref().ok_or_else(|| {
        anyhow::anyhow!("weights.doc_weights_path is not set; nowhere to persist weights")
    })?;
    let file = WeightsFile::new(path);
    let previous = file.set(doc_id, multiplier)?;

    let before = previous
        .map(|p| format!("{}", p))
        .unwrap_or_else(|| "unset".to_string());
    match multiplier {
        Some(m) => println!("{}: {} -> {}", doc_id, before, m),
        None => println!("{}: {} -> unset", doc_id, before),
    }
    Ok(())
}
