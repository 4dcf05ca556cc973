//! Pinecone adapter against a mock Pinecone API.

use groundchat::config::IndexConfig;
use groundchat::pinecone::PineconeIndex;
use groundchat_core::error::RagError;
use groundchat_core::models::DocumentChunk;
use groundchat_core::store::{Metric, VectorIndex};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, max_retries: u32) -> IndexConfig {
    IndexConfig {
        provider: "pinecone".to_string(),
        name: "help-guide".to_string(),
        dimension: 3,
        api_url: server.uri(),
        max_retries,
        ready_timeout_secs: 5,
        ..IndexConfig::default()
    }
}

fn index(server: &MockServer, max_retries: u32) -> PineconeIndex {
    PineconeIndex::with_api_key(&config(server, max_retries), "pc-test-key".to_string()).unwrap()
}

fn description(server: &MockServer) -> serde_json::Value {
    json!({
        "name": "help-guide",
        "dimension": 3,
        "metric": "cosine",
        "host": server.uri(),
        "status": { "ready": true, "state": "Ready" }
    })
}

fn chunk(i: usize) -> DocumentChunk {
    DocumentChunk {
        id: format!("chunk-{}", i),
        text: format!("Help guide paragraph {}", i),
        source: "data/Help-Guide.pdf".to_string(),
        page: 1,
        chunk_index: i,
        hash: format!("hash-{}", i),
    }
}

#[tokio::test]
async fn existing_index_is_not_created_again() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes"))
        .and(header("Api-Key", "pc-test-key"))
        .and(header("X-Pinecone-API-Version", "2025-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "indexes": [description(&server)]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/help-guide"))
        .respond_with(ResponseTemplate::new(200).set_body_json(description(&server)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let created = index(&server, 0)
        .ensure_created("help-guide", 3, Metric::Cosine)
        .await
        .unwrap();
    assert!(!created);
}

#[tokio::test]
async fn missing_index_is_created_serverless() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "indexes": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .and(body_partial_json(json!({
            "name": "help-guide",
            "dimension": 3,
            "metric": "cosine",
            "spec": { "serverless": { "cloud": "aws", "region": "us-east-1" } }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(description(&server)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/help-guide"))
        .respond_with(ResponseTemplate::new(200).set_body_json(description(&server)))
        .mount(&server)
        .await;

    let created = index(&server, 0)
        .ensure_created("help-guide", 3, Metric::Cosine)
        .await
        .unwrap();
    assert!(created);
}

#[tokio::test]
async fn upsert_sends_metadata_in_batches_of_one_hundred() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/help-guide"))
        .respond_with(ResponseTemplate::new(200).set_body_json(description(&server)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .and(header("Api-Key", "pc-test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "upsertedCount": 100 })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "upsertedCount": 20 })))
        .mount(&server)
        .await;

    let chunks: Vec<DocumentChunk> = (0..120).map(chunk).collect();
    let vectors = vec![vec![0.1, 0.2, 0.3]; 120];
    let written = index(&server, 0).upsert(&chunks, &vectors).await.unwrap();
    assert_eq!(written, 120);

    let requests = server.received_requests().await.unwrap();
    let upserts: Vec<serde_json::Value> = requests
        .iter()
        .filter(|r| r.url.path() == "/vectors/upsert")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(upserts.len(), 2);
    assert_eq!(upserts[0]["vectors"].as_array().unwrap().len(), 100);
    assert_eq!(upserts[1]["vectors"].as_array().unwrap().len(), 20);
    let first = &upserts[0]["vectors"][0];
    assert_eq!(first["id"], "chunk-0");
    assert_eq!(first["metadata"]["text"], "Help guide paragraph 0");
    assert_eq!(first["metadata"]["source"], "data/Help-Guide.pdf");
    assert_eq!(first["metadata"]["page"], 1);
}

#[tokio::test]
async fn query_returns_text_and_scores() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/help-guide"))
        .respond_with(ResponseTemplate::new(200).set_body_json(description(&server)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_partial_json(json!({ "topK": 3, "includeMetadata": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [
                { "id": "a", "score": 0.91, "metadata": { "text": "Refunds within 30 days." } },
                { "id": "b", "score": 0.55 },
                { "id": "c", "score": 0.42, "metadata": { "text": "Shipping takes five days." } }
            ],
            "namespace": ""
        })))
        .mount(&server)
        .await;

    let results = index(&server, 0).query(&[1.0, 0.0, 0.0], 3).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].text, "Refunds within 30 days.");
    assert!((results[0].score - 0.91).abs() < 1e-6);
    assert_eq!(results[1].text, "Shipping takes five days.");
}

#[tokio::test]
async fn wrong_dimension_is_rejected_before_any_data_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/help-guide"))
        .respond_with(ResponseTemplate::new(200).set_body_json(description(&server)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = index(&server, 0).query(&[1.0, 0.0], 3).await.unwrap_err();
    assert!(matches!(err, RagError::Config(_)));
}

#[tokio::test]
async fn unknown_index_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/help-guide"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": "NOT_FOUND", "message": "Resource help-guide not found" }
        })))
        .mount(&server)
        .await;

    let err = index(&server, 2).query(&[1.0, 0.0, 0.0], 3).await.unwrap_err();
    match err {
        RagError::IndexUnavailable(msg) => assert!(msg.contains("does not exist")),
        other => panic!("expected IndexUnavailable, got {:?}", other),
    }
    // 404 is not retried.
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn server_error_is_retried_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "indexes": [description(&server)]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/help-guide"))
        .respond_with(ResponseTemplate::new(200).set_body_json(description(&server)))
        .mount(&server)
        .await;

    let created = index(&server, 1)
        .ensure_created("help-guide", 3, Metric::Cosine)
        .await
        .unwrap();
    assert!(!created);
}

#[tokio::test]
async fn server_error_without_retries_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = index(&server, 0)
        .ensure_created("help-guide", 3, Metric::Cosine)
        .await
        .unwrap_err();
    match err {
        RagError::IndexUnavailable(msg) => assert!(msg.contains("500")),
        other => panic!("expected IndexUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn unnamed_index_is_rejected_at_construction() {
    let server = MockServer::start().await;
    let config = IndexConfig {
        name: String::new(),
        ..config(&server, 0)
    };

    let err = match PineconeIndex::with_api_key(&config, "pc-test-key".to_string()) {
        Ok(_) => panic!("expected a missing index name to fail"),
        Err(e) => e,
    };
    assert!(err.to_string().contains("PINECONE_INDEX_NAME"));
    assert!(server.received_requests().await.unwrap().is_empty());
}
