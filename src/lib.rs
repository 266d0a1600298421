//! # Nancy Brain
//!
//! A weighted retrieval knowledge base for research code and documentation.
//!
//! This crate is the application shell around
//! [`nancy_brain_core`]: it reads configuration, scans the corpus directory,
//! talks to embedding backends, persists runtime weights and exposes the
//! core through a CLI and a JSON HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────────────┐
//! │ corpus dir  │──▶│ ingest       │──▶│ Snapshot           │
//! │ cat/repo/.. │   │ chunk+embed  │   │ registry+text+index│
//! └─────────────┘   └──────────────┘   └─────────┬──────────┘
//!                                                │
//!                       ┌────────────────────────┤
//!                       ▼                        ▼
//!                  ┌──────────┐            ┌──────────┐
//!                  │   CLI    │            │   HTTP   │
//!                  │ (nancy)  │            │  (axum)  │
//!                  └──────────┘            └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Disabled, hashed, Ollama and OpenAI providers |
//! | [`ingest`] | Corpus scan and snapshot build |
//! | [`weights_file`] | Runtime doc weight persistence |
//! | [`service`] | Wiring config into a running service |
//! | [`server`] | HTTP adapter |
//! | [`commands`] | CLI command implementations |
//! | [`logging`] | Tracing subscriber setup |

pub mod commands;
pub mod config;
pub mod embedding;
pub mod ingest;
pub mod logging;
pub mod server;
pub mod service;
pub mod weights_file;
