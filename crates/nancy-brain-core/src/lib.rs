//! # Nancy Brain Core
//!
//! The weighted retrieval core of Nancy Brain: weight registry, document
//! registry, text store, weighted search, passage retrieval and the
//! [`RagService`](rag::RagService) facade that composes them.
//!
//! This crate contains no tokio, HTTP, filesystem I/O, or concrete
//! embedding backends. Those live in the `nancy-brain` app crate, which
//! plugs into the [`EmbeddingProvider`](embedding::EmbeddingProvider) and
//! [`VectorIndex`](index::VectorIndex) traits.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod highlight;
pub mod identifier;
pub mod index;
pub mod models;
pub mod rag;
pub mod registry;
pub mod retrieve;
pub mod search;
pub mod text_store;
pub mod weights;

pub use error::{CoreError, Result};
pub use rag::{CorpusBuilder, RagService, RagSettings, Snapshot};
