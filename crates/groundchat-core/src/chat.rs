//! Language-model endpoint abstraction.
//!
//! A [`ChatEndpoint`] turns a [`ChatRequest`] into a [`FragmentStream`]: a
//! lazy, finite, non-restartable sequence of text fragments. The stream ends
//! when the endpoint signals completion; an `Err` item ends it early.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::ChatMessage;

/// Incremental text fragments of a streamed completion.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Fixed sampling parameters sent with every completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.6,
            top_p: 0.95,
            max_tokens: 4096,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// A streaming chat-completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub sampling: SamplingParams,
}

/// Streaming chat-completion capability.
#[async_trait]
pub trait ChatEndpoint: Send + Sync {
    /// Open a completion stream.
    ///
    /// Errors opening the stream (connection refused, HTTP error status) are
    /// returned directly; errors after the first byte arrive as stream items.
    async fn stream_chat(&self, request: &ChatRequest) -> Result<FragmentStream>;
}
