//! In-memory [`VectorIndex`] for tests and single-process demos.
//!
//! Uses `Vec` and `HashSet` behind `std::sync::RwLock`. Queries are
//! brute-force cosine similarity over every stored vector; equal scores keep
//! insertion order.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{DocumentChunk, ScoredChunk};

use super::{Metric, VectorIndex};

struct StoredVector {
    id: String,
    text: String,
    vector: Vec<f32>,
}

struct IndexState {
    name: String,
    dimension: usize,
}

/// In-memory vector index.
///
/// Upserts and queries fail with `IndexUnavailable` until
/// [`ensure_created`](VectorIndex::ensure_created) has been called.
pub struct InMemoryIndex {
    created: RwLock<HashSet<String>>,
    active: RwLock<Option<IndexState>>,
    vectors: RwLock<Vec<StoredVector>>,
    creations: AtomicUsize,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            created: RwLock::new(HashSet::new()),
            active: RwLock::new(None),
            vectors: RwLock::new(Vec::new()),
            creations: AtomicUsize::new(0),
        }
    }

    /// Number of times an index was actually created.
    pub fn creation_calls(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.vectors.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn active_dimension(&self) -> Result<usize> {
        let active = self.active.read().map_err(poisoned)?;
        active
            .as_ref()
            .map(|state| state.dimension)
            .ok_or_else(|| RagError::IndexUnavailable("index has not been created".to_string()))
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> RagError {
    RagError::IndexUnavailable("in-memory index lock poisoned".to_string())
}

fn check_dimension(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(RagError::Config(format!(
            "vector dimension {} does not match index dimension {}",
            got, expected
        )));
    }
    Ok(())
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn ensure_created(&self, name: &str, dimension: usize, _metric: Metric) -> Result<bool> {
        let mut created = self.created.write().map_err(poisoned)?;
        let mut active = self.active.write().map_err(poisoned)?;
        let is_new = created.insert(name.to_string());
        if is_new {
            self.creations.fetch_add(1, Ordering::SeqCst);
        }
        if is_new || active.as_ref().map(|s| s.name.as_str()) != Some(name) {
            *active = Some(IndexState {
                name: name.to_string(),
                dimension,
            });
        }
        Ok(is_new)
    }

    async fn upsert(&self, chunks: &[DocumentChunk], vectors: &[Vec<f32>]) -> Result<usize> {
        if chunks.len() != vectors.len() {
            return Err(RagError::Config(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        let dimension = self.active_dimension()?;
        for v in vectors {
            check_dimension(dimension, v.len())?;
        }

        let mut stored = self.vectors.write().map_err(poisoned)?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            match stored.iter_mut().find(|sv| sv.id == chunk.id) {
                Some(existing) => {
                    existing.text = chunk.text.clone();
                    existing.vector = vector.clone();
                }
                None => stored.push(StoredVector {
                    id: chunk.id.clone(),
                    text: chunk.text.clone(),
                    vector: vector.clone(),
                }),
            }
        }
        Ok(chunks.len())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let dimension = self.active_dimension()?;
        check_dimension(dimension, vector.len())?;

        let stored = self.vectors.read().map_err(poisoned)?;
        let mut results: Vec<ScoredChunk> = stored
            .iter()
            .map(|sv| ScoredChunk {
                text: sv.text.clone(),
                score: cosine_similarity(vector, &sv.vector),
            })
            .collect();
        // Stable sort keeps insertion order among equal scores.
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(k);
        Ok(results)
    }
}
