//! Vector index abstraction and the in-memory implementation.
//!
//! A [`VectorIndex`] maps an id (doc id or chunk id) to a vector and answers
//! top-k cosine queries. The search engine never looks inside an index; it
//! only consumes `(id, raw_score)` pairs.
//!
//! [`InMemoryIndex`] is a brute-force scan behind `std::sync::RwLock`, good
//! for corpora of a few hundred thousand chunks.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{CoreError, Result};

/// One candidate returned by an index query.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub id: String,
    pub raw_score: f64,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top `k` ids by similarity to `vector`, best first.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RawHit>>;

    /// Number of stored vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct StoredVector {
    id: String,
    vector: Vec<f32>,
}

#[derive(Default)]
pub struct InMemoryIndex {
    vectors: RwLock<Vec<StoredVector>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the vector for `id`.
    ///
    /// All vectors in one index must share a dimensionality.
    pub fn insert(&self, id: &str, vector: Vec<f32>) -> Result<()> {
        let mut vectors = self.vectors.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(first) = vectors.first() {
            if first.vector.len() != vector.len() {
                return Err(CoreError::embedding(format!(
                    "vector for '{}' has {} dims, index holds {}",
                    id,
                    vector.len(),
                    first.vector.len()
                )));
            }
        }
        vectors.retain(|sv| sv.id != id);
        vectors.push(StoredVector {
            id: id.to_string(),
            vector,
        });
        Ok(())
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut vectors = self.vectors.write().unwrap_or_else(PoisonError::into_inner);
        let before = vectors.len();
        vectors.retain(|sv| sv.id != id);
        vectors.len() != before
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RawHit>> {
        let vectors = self.vectors.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(first) = vectors.first() {
            if first.vector.len() != vector.len() {
                return Err(CoreError::embedding(format!(
                    "query has {} dims, index holds {}",
                    vector.len(),
                    first.vector.len()
                )));
            }
        }

        let mut hits: Vec<RawHit> = vectors
            .iter()
            .map(|sv| RawHit {
                id: sv.id.clone(),
                raw_score: cosine_similarity(vector, &sv.vector) as f64,
            })
            .collect();

        hits.sort_by(|a, b| {
            b.raw_score
                .total_cmp(&a.raw_score)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    fn len(&self) -> usize {
        self.vectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
