//! Ingestion pipeline: document → chunks → embeddings → vector index.
//!
//! Runs offline, once per document version. Chunk ids are fresh UUIDs, so
//! re-ingesting adds a new copy of every chunk rather than replacing the
//! old ones.

use std::path::Path;

use anyhow::{Context, Result};
use groundchat_core::chunk::{split_document, ChunkingParams};
use groundchat_core::embedding::{check_batch, EmbeddingProvider};
use groundchat_core::error::{RagError, Result as RagResult};
use groundchat_core::models::Document;
use groundchat_core::store::{Metric, VectorIndex};
use tracing::info;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::extract::load_document;
use crate::index::create_index;

/// Where and how vectors are stored.
#[derive(Debug, Clone)]
pub struct IndexTarget {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
}

impl IndexTarget {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            name: config.index.resolved_name()?,
            dimension: config.index.dimension,
            metric: config.index.metric,
        })
    }
}

/// Counts from one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub pages: usize,
    pub chunks: usize,
    pub vectors_written: usize,
    pub index_created: bool,
}

/// Split, embed and upsert one document.
///
/// The index is created first if absent. Embedding happens in batches of
/// `batch_size`; every vector is checked against the index dimension before
/// anything is written.
pub async fn ingest_document(
    document: &Document,
    params: &ChunkingParams,
    embedder: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    target: &IndexTarget,
    batch_size: usize,
) -> RagResult<IngestReport> {
    if embedder.dims() != target.dimension {
        return Err(RagError::Config(format!(
            "embedding model '{}' produces {} dimensions but index '{}' expects {}",
            embedder.model_name(),
            embedder.dims(),
            target.name,
            target.dimension
        )));
    }

    let chunks = split_document(document, params);
    if chunks.is_empty() {
        return Err(RagError::Load(format!(
            "{}: no extractable text",
            document.source
        )));
    }
    info!(source = %document.source, pages = document.pages.len(), chunks = chunks.len(), "split document");

    let index_created = index
        .ensure_created(&target.name, target.dimension, target.metric)
        .await?;

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let embedded = embedder.embed(batch).await?;
        check_batch(&embedded, batch.len(), target.dimension)?;
        vectors.extend(embedded);
        info!(embedded = vectors.len(), total = texts.len(), "embedding progress");
    }

    let vectors_written = index.upsert(&chunks, &vectors).await?;
    info!(index = %target.name, vectors = vectors_written, "upserted vectors");

    Ok(IngestReport {
        pages: document.pages.len(),
        chunks: chunks.len(),
        vectors_written,
        index_created,
    })
}

/// Load the configured document and ingest it into `index`.
pub async fn ingest_configured(
    config: &Config,
    embedder: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
) -> Result<IngestReport> {
    let target = IndexTarget::from_config(config)?;
    let document = load_document(&config.document.path)?;
    let report = ingest_document(
        &document,
        &config.chunking.params(),
        embedder,
        index,
        &target,
        config.embedding.batch_size,
    )
    .await
    .with_context(|| format!("Ingestion of {} failed", config.document.path.display()))?;
    Ok(report)
}

/// `groundchat ingest`: build the vector index from the configured document.
///
/// With `dry_run`, only loads and splits the document and prints the counts;
/// no embedding provider or index is contacted.
pub async fn run_ingest(config: &Config, dry_run: bool) -> Result<()> {
    let path: &Path = &config.document.path;

    if dry_run {
        let document = load_document(path)?;
        let chunks = split_document(&document, &config.chunking.params());
        println!("ingest {} (dry-run)", path.display());
        println!("  pages: {}", document.pages.len());
        println!("  chunks: {}", chunks.len());
        println!(
            "  chunk size: {} (overlap {})",
            config.chunking.chunk_size, config.chunking.chunk_overlap
        );
        return Ok(());
    }

    let index_name = config.index.resolved_name()?;
    println!("Loading {}...", path.display());
    let embedder = create_provider(&config.embedding)?;
    let index = create_index(&config.index)?;
    let report = ingest_configured(config, embedder.as_ref(), index.as_ref()).await?;

    println!("ingest {}", path.display());
    println!("  pages: {}", report.pages);
    println!("  chunks: {}", report.chunks);
    println!("  vectors written: {}", report.vectors_written);
    if report.index_created {
        println!("  created index: {}", index_name);
    }
    println!("✅ Vector DB built and uploaded to {}.", index_name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundchat_core::models::Page;
    use groundchat_core::store::memory::InMemoryIndex;
    use groundchat_core::testing::KeywordEmbedder;

    fn document(text: &str) -> Document {
        Document {
            source: "guide.txt".to_string(),
            pages: vec![Page {
                number: 1,
                text: text.to_string(),
            }],
        }
    }

    fn target(dimension: usize) -> IndexTarget {
        IndexTarget {
            name: "guide".to_string(),
            dimension,
            metric: Metric::Cosine,
        }
    }

    #[tokio::test]
    async fn test_ingest_writes_one_vector_per_chunk() {
        let embedder = KeywordEmbedder::new(&["refund", "shipping"]);
        let index = InMemoryIndex::new();
        let text = "Refunds take 30 days.\n\nShipping is free. ".repeat(40);
        let report = ingest_document(
            &document(&text),
            &ChunkingParams::default(),
            &embedder,
            &index,
            &target(2),
            4,
        )
        .await
        .unwrap();
        assert!(report.chunks > 1);
        assert_eq!(report.vectors_written, report.chunks);
        assert_eq!(index.len(), report.chunks);
        assert!(report.index_created);
        // batches of 4
        assert_eq!(embedder.calls(), report.chunks.div_ceil(4));
    }

    #[tokio::test]
    async fn test_second_ingest_does_not_recreate_index() {
        let embedder = KeywordEmbedder::new(&["refund"]);
        let index = InMemoryIndex::new();
        let doc = document("Refunds take 30 days.");
        let params = ChunkingParams::default();
        ingest_document(&doc, &params, &embedder, &index, &target(1), 64)
            .await
            .unwrap();
        let second = ingest_document(&doc, &params, &embedder, &index, &target(1), 64)
            .await
            .unwrap();
        assert!(!second.index_created);
        assert_eq!(index.creation_calls(), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_fails_before_writing() {
        let embedder = KeywordEmbedder::new(&["refund"]);
        let index = InMemoryIndex::new();
        let err = ingest_document(
            &document("Refunds take 30 days."),
            &ChunkingParams::default(),
            &embedder,
            &index,
            &target(512),
            64,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
        assert_eq!(index.creation_calls(), 0);
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_document_is_load_error() {
        let embedder = KeywordEmbedder::new(&["refund"]);
        let index = InMemoryIndex::new();
        let doc = Document {
            source: "empty.pdf".to_string(),
            pages: Vec::new(),
        };
        let err = ingest_document(&doc, &ChunkingParams::default(), &embedder, &index, &target(1), 64)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Load(_)));
    }
}
