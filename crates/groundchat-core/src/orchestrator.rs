//! Chat turn orchestration.
//!
//! One call to [`ChatOrchestrator::process_turn`] takes a user input through
//! the turn state machine:
//!
//! ```text
//! Idle → AwaitingInput → Moderating ─┬─▶ Rejected ──────────────────▶ Idle
//!                                    └─▶ Retrieving ─┬─▶ NoContext ──▶ Idle
//!                                                    └─▶ Generating ─▶ Idle
//! ```
//!
//! Every turn that is not ignored appends the user message and exactly one
//! assistant message to the session. Errors from retrieval or generation do
//! not escape: they become an apology reply and a [`TurnOutcome::Failed`].

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, warn};

use crate::chat::{ChatEndpoint, ChatRequest, SamplingParams};
use crate::error::{ErrorKind, RagError, Result};
use crate::models::ChatMessage;
use crate::moderation::ModerationFilter;
use crate::prompt::{
    build_request_messages, error_reply, system_prompt, DEFAULT_HISTORY_WINDOW,
    MODERATION_REFUSAL, OUT_OF_SCOPE_REPLY,
};
use crate::retrieval::{Retriever, DEFAULT_TOP_K};
use crate::session::Session;

/// Default language model.
pub const DEFAULT_MODEL: &str = "nvidia/llama-3.1-nemotron-ultra-253b-v1";

/// States a turn passes through. Reported in debug logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingInput,
    Moderating,
    Rejected,
    Retrieving,
    NoContext,
    Generating,
}

/// Result of one turn. Every variant except `Ignored` carries the assistant
/// reply that was appended to the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Generated, grounded answer.
    Answered { reply: String },
    /// Input flagged by moderation.
    Rejected { reply: String },
    /// Nothing relevant was retrieved.
    NoContext { reply: String },
    /// Retrieval or generation failed.
    Failed {
        kind: ErrorKind,
        error: String,
        reply: String,
    },
    /// Blank input; the session was not touched.
    Ignored,
}

impl TurnOutcome {
    pub fn reply(&self) -> Option<&str> {
        match self {
            TurnOutcome::Answered { reply }
            | TurnOutcome::Rejected { reply }
            | TurnOutcome::NoContext { reply }
            | TurnOutcome::Failed { reply, .. } => Some(reply),
            TurnOutcome::Ignored => None,
        }
    }

    /// Snake-case variant name, as used in the serialized form.
    pub fn label(&self) -> &'static str {
        match self {
            TurnOutcome::Answered { .. } => "answered",
            TurnOutcome::Rejected { .. } => "rejected",
            TurnOutcome::NoContext { .. } => "no_context",
            TurnOutcome::Failed { .. } => "failed",
            TurnOutcome::Ignored => "ignored",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TurnOutcome::Failed { .. })
    }
}

/// Tunables for generation and retrieval.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub model: String,
    pub sampling: SamplingParams,
    pub top_k: usize,
    pub history_window: usize,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            sampling: SamplingParams::default(),
            top_k: DEFAULT_TOP_K,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }
}

/// Runs chat turns against a moderation filter, a retriever and a chat
/// endpoint. Holds no per-session state.
pub struct ChatOrchestrator {
    moderation: ModerationFilter,
    retriever: Retriever,
    endpoint: Arc<dyn ChatEndpoint>,
    settings: TurnSettings,
}

impl ChatOrchestrator {
    pub fn new(
        moderation: ModerationFilter,
        retriever: Retriever,
        endpoint: Arc<dyn ChatEndpoint>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            moderation,
            retriever,
            endpoint,
            settings,
        }
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Process one user input.
    ///
    /// `on_render` receives the accumulated response text after every
    /// streamed fragment, for progressive display. Fixed replies (refusal,
    /// out-of-scope, apology) are not rendered through it; read them from
    /// the returned outcome.
    pub async fn process_turn<F>(
        &self,
        session: &mut Session,
        input: &str,
        mut on_render: F,
    ) -> TurnOutcome
    where
        F: FnMut(&str) + Send,
    {
        if input.trim().is_empty() {
            return TurnOutcome::Ignored;
        }

        transition(session, TurnState::AwaitingInput);
        session.push(ChatMessage::user(input));

        transition(session, TurnState::Moderating);
        if self.moderation.is_disallowed(input) {
            transition(session, TurnState::Rejected);
            session.push(ChatMessage::assistant(MODERATION_REFUSAL));
            return TurnOutcome::Rejected {
                reply: MODERATION_REFUSAL.to_string(),
            };
        }

        transition(session, TurnState::Retrieving);
        let context = match self
            .retriever
            .get_context(input, self.settings.top_k)
            .await
        {
            Ok(context) => context,
            Err(e) => return fail(session, e),
        };

        if context.is_empty() {
            transition(session, TurnState::NoContext);
            session.push(ChatMessage::assistant(OUT_OF_SCOPE_REPLY));
            return TurnOutcome::NoContext {
                reply: OUT_OF_SCOPE_REPLY.to_string(),
            };
        }

        transition(session, TurnState::Generating);
        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: build_request_messages(
                &system_prompt(&context),
                session.messages(),
                self.settings.history_window,
            ),
            sampling: self.settings.sampling.clone(),
        };

        match self.generate(&request, &mut on_render).await {
            Ok(reply) => {
                session.push(ChatMessage::assistant(reply.clone()));
                transition(session, TurnState::Idle);
                TurnOutcome::Answered { reply }
            }
            Err(e) => fail(session, e),
        }
    }

    async fn generate<F>(&self, request: &ChatRequest, on_render: &mut F) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        let mut stream = self.endpoint.stream_chat(request).await?;
        let mut buffer = String::new();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            if fragment.is_empty() {
                continue;
            }
            buffer.push_str(&fragment);
            on_render(&buffer);
        }
        Ok(buffer)
    }
}

fn transition(session: &Session, state: TurnState) {
    debug!(session = session.id(), state = ?state, "turn state");
}

fn fail(session: &mut Session, error: RagError) -> TurnOutcome {
    warn!(session = session.id(), error = %error, "turn failed");
    let detail = error.to_string();
    let reply = error_reply(&detail);
    session.push(ChatMessage::assistant(reply.clone()));
    transition(session, TurnState::Idle);
    TurnOutcome::Failed {
        kind: error.kind(),
        error: detail,
        reply,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentChunk, Role};
    use crate::store::memory::InMemoryIndex;
    use crate::store::{Metric, VectorIndex};
    use crate::testing::{KeywordEmbedder, ScriptedChatEndpoint};
    use crate::embedding::EmbeddingProvider;

    async fn orchestrator(
        endpoint: Arc<ScriptedChatEndpoint>,
    ) -> (ChatOrchestrator, Arc<KeywordEmbedder>) {
        let embedder = Arc::new(KeywordEmbedder::new(&["refund", "shipping"]));
        let index = Arc::new(InMemoryIndex::new());
        index.ensure_created("guide", 2, Metric::Cosine).await.unwrap();
        let chunk = DocumentChunk {
            id: "c1".to_string(),
            text: "Refunds are processed within 30 days.".to_string(),
            source: "guide".to_string(),
            page: 1,
            chunk_index: 0,
            hash: String::new(),
        };
        let vectors = embedder.embed(&[chunk.text.clone()]).await.unwrap();
        index.upsert(&[chunk], &vectors).await.unwrap();
        let retriever = Retriever::new(embedder.clone(), index);
        let orch = ChatOrchestrator::new(
            ModerationFilter::default(),
            retriever,
            endpoint,
            TurnSettings::default(),
        );
        (orch, embedder)
    }

    #[tokio::test]
    async fn test_blank_input_ignored() {
        let endpoint = Arc::new(ScriptedChatEndpoint::new(vec!["x"]));
        let (orch, embedder) = orchestrator(endpoint.clone()).await;
        let mut session = Session::new();
        let outcome = orch.process_turn(&mut session, "   ", |_| {}).await;
        assert_eq!(outcome, TurnOutcome::Ignored);
        assert!(session.is_empty());
        assert_eq!(embedder.calls(), 1);
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_renders_accumulated_buffer() {
        let endpoint = Arc::new(ScriptedChatEndpoint::new(vec!["Refunds ", "take ", "30 days."]));
        let (orch, _) = orchestrator(endpoint.clone()).await;
        let mut session = Session::new();
        let mut frames = Vec::new();
        let outcome = orch
            .process_turn(&mut session, "refund?", |buf| frames.push(buf.to_string()))
            .await;
        assert_eq!(frames, vec!["Refunds ", "Refunds take ", "Refunds take 30 days."]);
        assert_eq!(outcome.reply(), Some("Refunds take 30 days."));
        assert_eq!(session.messages()[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_request_uses_fixed_sampling_and_model() {
        let endpoint = Arc::new(ScriptedChatEndpoint::new(vec!["ok"]));
        let (orch, _) = orchestrator(endpoint.clone()).await;
        let mut session = Session::new();
        orch.process_turn(&mut session, "refund?", |_| {}).await;
        let request = endpoint.last_request().unwrap();
        assert_eq!(request.model, DEFAULT_MODEL);
        assert_eq!(request.sampling.temperature, 0.6);
        assert_eq!(request.sampling.top_p, 0.95);
        assert_eq!(request.sampling.max_tokens, 4096);
        assert_eq!(request.sampling.frequency_penalty, 0.0);
        assert_eq!(request.sampling.presence_penalty, 0.0);
    }

    #[tokio::test]
    async fn test_embedding_failure_becomes_apology() {
        let endpoint = Arc::new(ScriptedChatEndpoint::new(vec!["never"]));
        let (orch, embedder) = orchestrator(endpoint.clone()).await;
        embedder.fail_with("model not loaded");
        let mut session = Session::new();
        let outcome = orch.process_turn(&mut session, "refund?", |_| {}).await;
        match &outcome {
            TurnOutcome::Failed { kind, error, .. } => {
                assert_eq!(*kind, ErrorKind::Embedding);
                assert!(error.contains("model not loaded"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(session.len(), 2);
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_history_window_applied_to_request() {
        let endpoint = Arc::new(ScriptedChatEndpoint::new(vec!["ok"]));
        let (orch, _) = orchestrator(endpoint.clone()).await;
        let mut session = Session::new();
        for i in 0..6 {
            orch.process_turn(&mut session, &format!("refund {}", i), |_| {})
                .await;
        }
        // 12 messages in history; the request carries the system prompt and
        // the last 10 messages, ending with the newest user message.
        let request = endpoint.last_request().unwrap();
        assert_eq!(request.messages.len(), 11);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[10].content, "refund 5");
        assert_eq!(session.len(), 12);
    }
}
