//! Error taxonomy shared by every component.
//!
//! Moderation rejections and empty retrievals are not errors; they are
//! reported as [`TurnOutcome`](crate::orchestrator::TurnOutcome) variants.

use serde::Serialize;
use thiserror::Error;

/// Errors raised by ingestion, retrieval and generation.
#[derive(Error, Debug)]
pub enum RagError {
    /// The ingestion source could not be read or parsed.
    #[error("failed to load document: {0}")]
    Load(String),

    /// The vector store is unreachable, or the index is missing.
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// Embedding computation failed.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The language-model endpoint failed or produced a malformed stream.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Machine-readable classification of a [`RagError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Load,
    IndexUnavailable,
    Embedding,
    Generation,
    Config,
}

impl RagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::Load(_) => ErrorKind::Load,
            RagError::IndexUnavailable(_) => ErrorKind::IndexUnavailable,
            RagError::Embedding(_) => ErrorKind::Embedding,
            RagError::Generation(_) => ErrorKind::Generation,
            RagError::Config(_) => ErrorKind::Config,
        }
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;
