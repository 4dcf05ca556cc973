//! OpenAI-compatible streaming chat endpoint.
//!
//! Sends `POST {base_url}/chat/completions` with `stream: true` and turns
//! the Server-Sent Events response into a
//! [`FragmentStream`](groundchat_core::chat::FragmentStream).
//!
//! Wire format, one event per `data:` line:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Refunds "}}]}
//!
//! data: {"choices":[{"delta":{"content":"take 30 days."}}]}
//!
//! data: [DONE]
//! ```
//!
//! Only `choices[0].delta.content` is used. Role-only and empty deltas are
//! skipped. An `error` payload or a line that is not valid JSON ends the
//! stream with [`RagError::Generation`].

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use groundchat_core::chat::{ChatEndpoint, ChatRequest, FragmentStream};
use groundchat_core::error::{RagError, Result as RagResult};
use serde::Deserialize;
use tracing::debug;

use crate::config::{require_env, ChatConfig, NVIDIA_API_KEY_VAR};

/// A decoded SSE payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Fragment(String),
    Done,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Incremental decoder for `text/event-stream` bodies.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns the events completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<RagResult<SseEvent>> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<RagResult<SseEvent>> {
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line).into_iter().collect()
    }
}

fn parse_line(raw: &[u8]) -> Option<RagResult<SseEvent>> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\n', '\r']);

    // Comments, `event:`/`id:` fields and blank separators carry no content.
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(Ok(SseEvent::Done));
    }

    let chunk: CompletionChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            return Some(Err(RagError::Generation(format!(
                "malformed stream chunk: {}",
                e
            ))))
        }
    };
    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Some(Err(RagError::Generation(message)));
    }

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|c| !c.is_empty())?;
    Some(Ok(SseEvent::Fragment(content)))
}

struct StreamState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<RagResult<String>>,
    finished: bool,
}

impl StreamState {
    /// Queue decoded events; returns `true` once the stream is complete.
    fn absorb(&mut self, events: Vec<RagResult<SseEvent>>) -> bool {
        for event in events {
            match event {
                Ok(SseEvent::Fragment(text)) => self.pending.push_back(Ok(text)),
                Ok(SseEvent::Done) => return true,
                Err(e) => {
                    self.pending.push_back(Err(e));
                    return true;
                }
            }
        }
        false
    }
}

/// Wrap an SSE byte stream as a fragment stream.
///
/// The result ends after `[DONE]`, at the end of the body, or right after
/// the first error item.
pub fn fragment_stream(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> FragmentStream {
    let state = StreamState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.pending.clear();
                    state.finished = true;
                }
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let events = state.decoder.feed(&bytes);
                    state.finished = state.absorb(events);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((
                        Err(RagError::Generation(format!("stream interrupted: {}", e))),
                        state,
                    ));
                }
                None => {
                    let events = state.decoder.finish();
                    state.absorb(events);
                    state.finished = true;
                    debug!("completion stream ended without [DONE]");
                }
            }
        }
    })
    .boxed()
}

/// Chat endpoint speaking the OpenAI chat-completions protocol.
pub struct OpenAiChatEndpoint {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiChatEndpoint {
    /// Build from config, reading the key from `NVIDIA_API_KEY`.
    ///
    /// # Errors
    ///
    /// Fails when the key is missing; chat cannot work without it.
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let api_key = require_env(NVIDIA_API_KEY_VAR)?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &ChatConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl ChatEndpoint for OpenAiChatEndpoint {
    async fn stream_chat(&self, request: &ChatRequest) -> RagResult<FragmentStream> {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();
        let body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.sampling.temperature,
            "top_p": request.sampling.top_p,
            "max_tokens": request.sampling.max_tokens,
            "frequency_penalty": request.sampling.frequency_penalty,
            "presence_penalty": request.sampling.presence_penalty,
            "stream": true,
        });

        debug!(model = %request.model, messages = messages.len(), "opening completion stream");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Generation(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!(
                "chat API error {}: {}",
                status, body_text
            )));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(fragment_stream(body))
    }
}
