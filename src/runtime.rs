//! Wiring: build a ready-to-use chat orchestrator from configuration.

use std::sync::Arc;

use anyhow::Result;
use groundchat_core::chat::ChatEndpoint;
use groundchat_core::moderation::ModerationFilter;
use groundchat_core::orchestrator::ChatOrchestrator;
use groundchat_core::retrieval::Retriever;
use tracing::{info, warn};

use crate::config::Config;
use crate::embedding::create_provider;
use crate::index::create_index;
use crate::ingest::ingest_configured;
use crate::llm::OpenAiChatEndpoint;

/// Build the orchestrator for `chat` and `serve`.
///
/// The language-model key is checked first: without it no turn can be
/// answered, so startup fails. With `ingest`, the configured document is
/// ingested into the index before returning (needed for the `memory` index).
pub async fn build_orchestrator(config: &Config, ingest: bool) -> Result<Arc<ChatOrchestrator>> {
    let endpoint: Arc<dyn ChatEndpoint> = Arc::new(OpenAiChatEndpoint::new(&config.chat)?);
    let embedder = create_provider(&config.embedding)?;
    let index = create_index(&config.index)?;

    if ingest {
        let report = ingest_configured(config, embedder.as_ref(), index.as_ref()).await?;
        info!(
            chunks = report.chunks,
            vectors = report.vectors_written,
            "ingested document at startup"
        );
    } else if config.index.provider == "memory" {
        warn!("memory index is empty; pass --ingest to load the document");
    }

    let moderation = ModerationFilter::with_extra_terms(&config.moderation.extra_terms)?;
    let retriever = Retriever::new(embedder, index);
    info!(
        model = %config.chat.model,
        embedding = %config.embedding.provider,
        index = %config.index.name,
        "chat pipeline ready"
    );
    Ok(Arc::new(ChatOrchestrator::new(
        moderation,
        retriever,
        endpoint,
        config.turn_settings(),
    )))
}
