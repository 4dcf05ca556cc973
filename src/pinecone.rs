//! Pinecone vector index adapter.
//!
//! Implements [`VectorIndex`] over the Pinecone REST API.
//!
//! # Endpoints
//!
//! | Plane | Method | Path | Used by |
//! |-------|--------|------|---------|
//! | control | `GET` | `/indexes` | [`ensure_created`](VectorIndex::ensure_created) |
//! | control | `POST` | `/indexes` | [`ensure_created`](VectorIndex::ensure_created) |
//! | control | `GET` | `/indexes/{name}` | host resolution, readiness |
//! | data | `POST` | `/vectors/upsert` | [`upsert`](VectorIndex::upsert) |
//! | data | `POST` | `/query` | [`query`](VectorIndex::query) |
//!
//! Every request carries the `Api-Key` and `X-Pinecone-API-Version`
//! headers. Indexes are created serverless. The data-plane host is resolved
//! once per index name and cached.
//!
//! Every failure surfaces as
//! [`RagError::IndexUnavailable`](groundchat_core::error::RagError::IndexUnavailable),
//! except vectors of the wrong dimension, which are rejected locally with
//! `RagError::Config` before any request is sent.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use groundchat_core::error::{RagError, Result as RagResult};
use groundchat_core::models::{DocumentChunk, ScoredChunk};
use groundchat_core::store::{Metric, VectorIndex};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::{require_env, IndexConfig, PINECONE_API_KEY_VAR};
use crate::http::{send_with_retry, HttpFailure};

/// Maximum vectors per upsert request.
pub const UPSERT_BATCH_SIZE: usize = 100;

const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

#[derive(Debug, Clone, Deserialize)]
struct IndexDescription {
    name: String,
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    status: Option<IndexStatus>,
}

#[derive(Debug, Clone, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Resolved data-plane target.
#[derive(Debug, Clone)]
struct Target {
    name: String,
    host: String,
    dimension: Option<usize>,
}

/// Pinecone-backed vector index.
///
/// Queries and upserts go to the index last passed to
/// [`ensure_created`](VectorIndex::ensure_created), or to the configured
/// `index.name` when `ensure_created` was never called.
pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    api_version: String,
    cloud: String,
    region: String,
    default_name: String,
    max_retries: u32,
    ready_timeout: Duration,
    target: RwLock<Option<Target>>,
}

impl PineconeIndex {
    /// Build from config, reading the key from `PINECONE_API_KEY`.
    ///
    /// Fails when the index name or the key is missing.
    pub fn new(config: &IndexConfig) -> Result<Self> {
        config.resolved_name()?;
        let api_key = require_env(PINECONE_API_KEY_VAR)?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &IndexConfig, api_key: String) -> Result<Self> {
        let default_name = config.resolved_name()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            cloud: config.cloud.clone(),
            region: config.region.clone(),
            default_name,
            max_retries: config.max_retries,
            ready_timeout: Duration::from_secs(config.ready_timeout_secs),
            target: RwLock::new(None),
        })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", &self.api_version)
    }

    async fn list_indexes(&self) -> RagResult<Vec<IndexDescription>> {
        let url = format!("{}/indexes", self.api_url);
        let response = send_with_retry("Pinecone", self.max_retries, || {
            self.request(reqwest::Method::GET, &url)
        })
        .await
        .map_err(unavailable)?;
        let list: IndexList = response.json().await.map_err(|e| {
            RagError::IndexUnavailable(format!("invalid Pinecone index list: {}", e))
        })?;
        Ok(list.indexes)
    }

    async fn describe(&self, name: &str) -> RagResult<IndexDescription> {
        let url = format!("{}/indexes/{}", self.api_url, name);
        let response = send_with_retry("Pinecone", self.max_retries, || {
            self.request(reqwest::Method::GET, &url)
        })
        .await
        .map_err(|e| match e.status {
            Some(StatusCode::NOT_FOUND) => {
                RagError::IndexUnavailable(format!("index '{}' does not exist", name))
            }
            _ => unavailable(e),
        })?;
        response.json().await.map_err(|e| {
            RagError::IndexUnavailable(format!("invalid Pinecone index description: {}", e))
        })
    }

    async fn create(&self, name: &str, dimension: usize, metric: Metric) -> RagResult<()> {
        let url = format!("{}/indexes", self.api_url);
        let body = json!({
            "name": name,
            "dimension": dimension,
            "metric": metric.to_string(),
            "spec": {
                "serverless": {
                    "cloud": self.cloud,
                    "region": self.region,
                }
            }
        });
        send_with_retry("Pinecone", self.max_retries, || {
            self.request(reqwest::Method::POST, &url).json(&body)
        })
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    /// Poll the index description until it reports ready and has a host.
    async fn wait_until_ready(&self, name: &str) -> RagResult<IndexDescription> {
        let deadline = tokio::time::Instant::now() + self.ready_timeout;
        loop {
            let description = self.describe(name).await?;
            let ready = description.status.as_ref().map(|s| s.ready).unwrap_or(true);
            let has_host = description
                .host
                .as_deref()
                .map(|h| !h.is_empty())
                .unwrap_or(false);
            if ready && has_host {
                return Ok(description);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(RagError::IndexUnavailable(format!(
                    "index '{}' not ready after {}s",
                    name,
                    self.ready_timeout.as_secs()
                )));
            }
            debug!(index = name, "waiting for index to become ready");
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn set_target(&self, description: &IndexDescription) -> RagResult<Target> {
        let host = description
            .host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                RagError::IndexUnavailable(format!(
                    "index '{}' has no data-plane host",
                    description.name
                ))
            })?;
        let target = Target {
            name: description.name.clone(),
            host: data_plane_url(host),
            dimension: description.dimension,
        };
        *self.target.write().await = Some(target.clone());
        Ok(target)
    }

    async fn target(&self) -> RagResult<Target> {
        if let Some(target) = self.target.read().await.clone() {
            return Ok(target);
        }
        let description = self.describe(&self.default_name).await?;
        self.set_target(&description).await
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn ensure_created(&self, name: &str, dimension: usize, metric: Metric) -> RagResult<bool> {
        let existing = self.list_indexes().await?;
        if existing.iter().any(|i| i.name == name) {
            debug!(index = name, "index already exists");
            let description = self.describe(name).await?;
            self.set_target(&description).await?;
            return Ok(false);
        }

        info!(index = name, dimension, metric = %metric, cloud = %self.cloud, region = %self.region, "creating index");
        self.create(name, dimension, metric).await?;
        let description = self.wait_until_ready(name).await?;
        self.set_target(&description).await?;
        Ok(true)
    }

    async fn upsert(&self, chunks: &[DocumentChunk], vectors: &[Vec<f32>]) -> RagResult<usize> {
        if chunks.len() != vectors.len() {
            return Err(RagError::Config(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        let target = self.target().await?;
        if let Some(dimension) = target.dimension {
            check_dimension(vectors.iter().map(|v| v.len()), dimension)?;
        }

        let url = format!("{}/vectors/upsert", target.host);
        let mut written = 0;
        for (chunk_batch, vector_batch) in chunks
            .chunks(UPSERT_BATCH_SIZE)
            .zip(vectors.chunks(UPSERT_BATCH_SIZE))
        {
            let records: Vec<serde_json::Value> = chunk_batch
                .iter()
                .zip(vector_batch)
                .map(|(chunk, values)| {
                    json!({
                        "id": chunk.id,
                        "values": values,
                        "metadata": {
                            "text": chunk.text,
                            "source": chunk.source,
                            "page": chunk.page,
                            "chunk_index": chunk.chunk_index,
                            "hash": chunk.hash,
                        }
                    })
                })
                .collect();
            let body = json!({ "vectors": records });

            let response = send_with_retry("Pinecone", self.max_retries, || {
                self.request(reqwest::Method::POST, &url).json(&body)
            })
            .await
            .map_err(unavailable)?;
            let reply: serde_json::Value = response.json().await.unwrap_or_default();
            let count = reply
                .get("upsertedCount")
                .and_then(|c| c.as_u64())
                .map(|c| c as usize)
                .unwrap_or(chunk_batch.len());
            written += count;
            debug!(index = %target.name, batch = chunk_batch.len(), "upserted batch");
        }
        Ok(written)
    }

    async fn query(&self, vector: &[f32], k: usize) -> RagResult<Vec<ScoredChunk>> {
        let target = self.target().await?;
        if let Some(dimension) = target.dimension {
            check_dimension(std::iter::once(vector.len()), dimension)?;
        }

        let url = format!("{}/query", target.host);
        let body = json!({
            "vector": vector,
            "topK": k,
            "includeMetadata": true,
            "includeValues": false,
        });
        let response = send_with_retry("Pinecone", self.max_retries, || {
            self.request(reqwest::Method::POST, &url).json(&body)
        })
        .await
        .map_err(unavailable)?;
        let reply: QueryResponse = response.json().await.map_err(|e| {
            RagError::IndexUnavailable(format!("invalid Pinecone query response: {}", e))
        })?;

        Ok(reply
            .matches
            .into_iter()
            .filter_map(|m| {
                let text = m.metadata?.get("text")?.as_str()?.to_string();
                Some(ScoredChunk {
                    text,
                    score: m.score,
                })
            })
            .collect())
    }
}

fn unavailable(failure: HttpFailure) -> RagError {
    RagError::IndexUnavailable(failure.message)
}

fn check_dimension(mut lengths: impl Iterator<Item = usize>, dimension: usize) -> RagResult<()> {
    match lengths.find(|len| *len != dimension) {
        Some(len) => Err(RagError::Config(format!(
            "vector has {} dimensions but the index expects {}",
            len, dimension
        ))),
        None => Ok(()),
    }
}

/// Pinecone reports hosts without a scheme.
fn data_plane_url(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", host.trim_end_matches('/'))
    }
}
