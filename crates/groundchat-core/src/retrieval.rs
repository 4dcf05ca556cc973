//! Retrieval service: query text in, grounding context out.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::models::ScoredChunk;
use crate::store::VectorIndex;

/// Number of chunks retrieved per query.
pub const DEFAULT_TOP_K: usize = 3;

/// Embeds queries and looks them up in a vector index.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Top-`k` chunks with their scores, most similar first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let vector = self.embedder.embed_one(query).await?;
        let results = self.index.query(&vector, k).await?;
        debug!(k, found = results.len(), "retrieved chunks");
        Ok(results)
    }

    /// Chunk texts joined with newlines, most relevant first.
    ///
    /// Returns an empty string when nothing was found. The result is neither
    /// deduplicated nor length-capped.
    pub async fn get_context(&self, query: &str, k: usize) -> Result<String> {
        let results = self.search(query, k).await?;
        Ok(results
            .into_iter()
            .map(|r| r.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentChunk;
    use crate::store::memory::InMemoryIndex;
    use crate::store::Metric;
    use crate::testing::KeywordEmbedder;

    fn chunk(id: &str, text: &str) -> DocumentChunk {
        DocumentChunk {
            id: id.to_string(),
            text: text.to_string(),
            source: "guide".to_string(),
            page: 1,
            chunk_index: 0,
            hash: String::new(),
        }
    }

    async fn seeded() -> Retriever {
        let embedder = Arc::new(KeywordEmbedder::new(&["refund", "shipping", "password"]));
        let index = Arc::new(InMemoryIndex::new());
        index.ensure_created("guide", 3, Metric::Cosine).await.unwrap();
        let chunks = vec![
            chunk("1", "Refund requests are accepted for 30 days."),
            chunk("2", "Shipping takes 5 business days."),
            chunk("3", "Reset your password from the login page."),
        ];
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await.unwrap();
        index.upsert(&chunks, &vectors).await.unwrap();
        Retriever::new(embedder, index)
    }

    #[tokio::test]
    async fn test_context_puts_best_match_first() {
        let retriever = seeded().await;
        let context = retriever
            .get_context("What is the refund policy?", DEFAULT_TOP_K)
            .await
            .unwrap();
        let lines: Vec<&str> = context.split('\n').collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Refund requests are accepted for 30 days.");
    }

    #[tokio::test]
    async fn test_context_respects_k() {
        let retriever = seeded().await;
        let context = retriever.get_context("shipping", 1).await.unwrap();
        assert_eq!(context, "Shipping takes 5 business days.");
    }

    #[tokio::test]
    async fn test_empty_index_gives_empty_context() {
        let embedder = Arc::new(KeywordEmbedder::new(&["refund"]));
        let index = Arc::new(InMemoryIndex::new());
        index.ensure_created("guide", 1, Metric::Cosine).await.unwrap();
        let retriever = Retriever::new(embedder, index);
        assert_eq!(retriever.get_context("refund", 3).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_stored_text_returned_verbatim() {
        let retriever = seeded().await;
        let results = retriever.search("password", 1).await.unwrap();
        assert_eq!(results[0].text, "Reset your password from the login page.");
    }
}
