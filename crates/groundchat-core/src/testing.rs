//! Deterministic in-process stand-ins for the embedding model and the chat
//! endpoint. Used by unit tests here and by the application's integration
//! tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::chat::{ChatEndpoint, ChatRequest, FragmentStream};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Embeds text as keyword occurrence counts, one dimension per keyword.
///
/// Texts sharing a keyword with the query score higher under cosine
/// similarity, which is enough to make retrieval order predictable.
pub struct KeywordEmbedder {
    keywords: Vec<String>,
    calls: AtomicUsize,
    failure: Mutex<Option<String>>,
}

impl KeywordEmbedder {
    pub fn new(keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            calls: AtomicUsize::new(0),
            failure: Mutex::new(None),
        }
    }

    /// Number of `embed` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every later call fail with an embedding error.
    pub fn fail_with(&self, message: &str) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(message.to_string());
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        self.keywords
            .iter()
            .map(|k| lower.matches(k.as_str()).count() as f32)
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-counts"
    }

    fn dims(&self) -> usize {
        self.keywords.len()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failure.lock().ok().and_then(|f| f.clone()) {
            return Err(RagError::Embedding(message));
        }
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }
}

enum Script {
    Fragments(Vec<String>),
    FailMidStream(Vec<String>, String),
    FailToOpen(String),
}

/// Chat endpoint that replays a fixed script and records every request.
pub struct ScriptedChatEndpoint {
    script: Script,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChatEndpoint {
    /// Streams `fragments` in order, then completes.
    pub fn new(fragments: Vec<&str>) -> Self {
        Self::with_script(Script::Fragments(owned(fragments)))
    }

    /// Streams `fragments`, then yields a generation error.
    pub fn failing_mid_stream(fragments: Vec<&str>, message: &str) -> Self {
        Self::with_script(Script::FailMidStream(owned(fragments), message.to_string()))
    }

    /// Fails before any fragment is produced.
    pub fn failing_to_open(message: &str) -> Self {
        Self::with_script(Script::FailToOpen(message.to_string()))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().ok().and_then(|r| r.last().cloned())
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatEndpoint for ScriptedChatEndpoint {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<FragmentStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let items: Vec<Result<String>> = match &self.script {
            Script::Fragments(fragments) => fragments.iter().cloned().map(Ok).collect(),
            Script::FailMidStream(fragments, message) => fragments
                .iter()
                .cloned()
                .map(Ok)
                .chain(std::iter::once(Err(RagError::Generation(message.clone()))))
                .collect(),
            Script::FailToOpen(message) => {
                return Err(RagError::Generation(message.clone()));
            }
        };
        Ok(stream::iter(items).boxed())
    }
}

fn owned(fragments: Vec<&str>) -> Vec<String> {
    fragments.into_iter().map(str::to_string).collect()
}
