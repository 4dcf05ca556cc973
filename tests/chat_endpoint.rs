//! Streaming chat endpoint against a mock OpenAI-compatible API.

use futures::StreamExt;
use groundchat::config::ChatConfig;
use groundchat::llm::OpenAiChatEndpoint;
use groundchat_core::chat::{ChatEndpoint, ChatRequest, SamplingParams};
use groundchat_core::error::RagError;
use groundchat_core::models::ChatMessage;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn endpoint(server: &MockServer) -> OpenAiChatEndpoint {
    let config = ChatConfig {
        base_url: server.uri(),
        ..ChatConfig::default()
    };
    OpenAiChatEndpoint::with_api_key(&config, "nv-test-key".to_string()).unwrap()
}

fn request() -> ChatRequest {
    ChatRequest {
        model: "meta/llama-3.1-8b-instruct".to_string(),
        messages: vec![
            ChatMessage::system("Answer from the help guide."),
            ChatMessage::user("How long do refunds take?"),
        ],
        sampling: SamplingParams::default(),
    }
}

fn sse_body(parts: &[&str]) -> String {
    let mut body = String::from("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n");
    for part in parts {
        body.push_str(&format!(
            "data: {}\n\n",
            json!({ "choices": [{ "delta": { "content": part } }] })
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

#[tokio::test]
async fn streams_fragments_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer nv-test-key"))
        .and(body_partial_json(json!({
            "model": "meta/llama-3.1-8b-instruct",
            "stream": true,
            "max_tokens": 4096,
            "messages": [
                { "role": "system", "content": "Answer from the help guide." },
                { "role": "user", "content": "How long do refunds take?" }
            ]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(&["Refunds ", "take ", "30 days."])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let stream = endpoint(&server).stream_chat(&request()).await.unwrap();
    let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
    assert_eq!(fragments, vec!["Refunds ", "take ", "30 days."]);
}

#[tokio::test]
async fn error_status_fails_to_open() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let err = match endpoint(&server).stream_chat(&request()).await {
        Ok(_) => panic!("expected the stream to fail to open"),
        Err(e) => e,
    };
    match err {
        RagError::Generation(msg) => {
            assert!(msg.contains("500"));
            assert!(msg.contains("upstream exploded"));
        }
        other => panic!("expected Generation, got {:?}", other),
    }
}

#[tokio::test]
async fn error_payload_ends_stream_with_error() {
    let server = MockServer::start().await;
    let body = format!(
        "{}data: {}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Partial\"}}]}\n\n",
        json!({ "error": { "message": "model overloaded" } })
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let items: Vec<_> = endpoint(&server)
        .stream_chat(&request())
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap(), "Partial");
    assert!(matches!(items[1], Err(RagError::Generation(_))));
}
