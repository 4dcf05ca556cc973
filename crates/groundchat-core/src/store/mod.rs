//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait covers the three operations the chat pipeline
//! needs from a vector store: idempotent creation, upsert of chunk vectors
//! with their text as metadata, and k-nearest-neighbor lookup.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{DocumentChunk, ScoredChunk};

/// Similarity metric an index is created with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    Euclidean,
    Dotproduct,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
            Metric::Dotproduct => "dotproduct",
        };
        f.write_str(name)
    }
}

/// Abstract vector store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ensure_created`](VectorIndex::ensure_created) | Create the index if absent |
/// | [`upsert`](VectorIndex::upsert) | Store chunk vectors keyed by chunk id |
/// | [`query`](VectorIndex::query) | k nearest stored chunks, most similar first |
///
/// Unreachable stores and missing indexes surface as
/// [`RagError::IndexUnavailable`](crate::error::RagError::IndexUnavailable).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the index unless one with this name already exists.
    ///
    /// Returns `true` when a creation happened.
    async fn ensure_created(&self, name: &str, dimension: usize, metric: Metric) -> Result<bool>;

    /// Store one vector per chunk, with the chunk text as metadata.
    ///
    /// Returns the number of vectors written.
    async fn upsert(&self, chunks: &[DocumentChunk], vectors: &[Vec<f32>]) -> Result<usize>;

    /// Return the `k` stored chunks nearest to `vector`, most similar first.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;
}
