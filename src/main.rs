//! # Nancy Brain CLI (`nancy`)
//!
//! Loads a `<category>/<repo>/<path>` corpus, embeds it and answers weighted
//! search and passage retrieval queries, either one-shot from the shell or
//! over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! nancy --config ./config/nancy.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nancy search "<query>"` | Weighted semantic search |
//! | `nancy retrieve <id>` | Print a passage by doc id or chunk id |
//! | `nancy tree [prefix]` | List the corpus as a directory tree |
//! | `nancy health` | Document count, index version, status |
//! | `nancy weight <doc_id> <multiplier>` | Persist a runtime doc weight |
//! | `nancy serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! nancy search "microlensing light curve" --category tools --doctype py
//! nancy retrieve tools/astropy/astropy/units/core.py --start 10 --end 40
//! nancy retrieve "tools/astropy/README.md::chunk-0002" --window 0
//! nancy weight tools/astropy/README.md 2.0
//! nancy weight tools/astropy/README.md --clear
//! NANCY_LOG=debug nancy serve
//! ```

use clap::{Parser, Subcommand};
use nancy_brain::commands::{self, SearchArgs};
use nancy_brain::{config, logging, server, service::App};
use std::path::PathBuf;
use std::sync::Arc;

/// Nancy Brain: weighted retrieval over research code and documentation.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/nancy.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "nancy",
    about = "Nancy Brain: weighted retrieval over research code and documentation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/nancy.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the corpus.
    ///
    /// Embeds the query, pulls an oversized candidate pool from the vector
    /// index (or both indexes in dual mode), applies calibration and weight
    /// multipliers and prints the top hits.
    Search {
        query: String,

        /// Maximum number of hits (defaults to `[retrieval].default_limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Drop hits whose adjusted score is below this value.
        #[arg(long, default_value_t = 0.0)]
        threshold: f64,

        /// Only documents in this category (first path segment).
        #[arg(long)]
        category: Option<String>,

        /// Only documents with this extension, e.g. `py` or `.md`.
        #[arg(long)]
        doctype: Option<String>,

        /// Show the weight breakdown behind each score.
        #[arg(long)]
        explain: bool,

        /// Print the raw JSON response.
        #[arg(long)]
        json: bool,
    },

    /// Retrieve a passage.
    ///
    /// Accepts a doc id (whole document, or `--start`/`--end` range) or a
    /// chunk id (`<doc_id>::chunk-NNNN`, widened by `--window` chunks).
    Retrieve {
        id: String,

        /// First line, 1-based. Clamped to the document.
        #[arg(long, allow_hyphen_values = true)]
        start: Option<i64>,

        /// Last line, inclusive. Clamped to the document.
        #[arg(long, allow_hyphen_values = true)]
        end: Option<i64>,

        /// Neighbouring chunks to include on each side of a chunk id.
        #[arg(long)]
        window: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// List documents as a directory tree.
    Tree {
        /// Only entries under this path, e.g. `tools/astropy`.
        prefix: Option<String>,

        /// Maximum depth below the prefix.
        #[arg(long)]
        depth: Option<usize>,

        /// Stop listing after this many entries (default 500).
        #[arg(long)]
        max_entries: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Report corpus status.
    Health {
        #[arg(long)]
        json: bool,
    },

    /// Set or clear a persisted runtime doc weight.
    ///
    /// Writes `[weights].doc_weights_path`. A running server picks the value
    /// up on restart; use `POST /weights` to change it live.
    Weight {
        doc_id: String,

        /// Multiplier (> 0). Required unless `--clear` is given.
        #[arg(required_unless_present = "clear", conflicts_with = "clear")]
        multiplier: Option<f64>,

        /// Remove the override instead of setting one.
        #[arg(long)]
        clear: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Search {
            query,
            limit,
            threshold,
            category,
            doctype,
            explain,
            json,
        } => {
            commands::run_search(
                &cfg,
                SearchArgs {
                    query,
                    limit,
                    threshold,
                    category,
                    doctype,
                    explain,
                    json,
                },
            )
            .await?;
        }
        Commands::Retrieve {
            id,
            start,
            end,
            window,
            json,
        } => {
            commands::run_retrieve(&cfg, &id, start, end, window, json).await?;
        }
        Commands::Tree {
            prefix,
            depth,
            max_entries,
            json,
        } => {
            commands::run_tree(&cfg, prefix.as_deref(), depth, max_entries, json).await?;
        }
        Commands::Health { json } => {
            commands::run_health(&cfg, json).await?;
        }
        Commands::Weight {
            doc_id,
            multiplier,
            clear,
        } => {
            let value = if clear { None } else { multiplier };
            commands::run_weight(&cfg, &doc_id, value)?;
        }
        Commands::Serve => {
            let app = Arc::new(App::open(&cfg).await?);
            server::run_server(app).await?;
        }
    }

    Ok(())
}
