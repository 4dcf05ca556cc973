//! Local CLIP text embeddings via fastembed.
//!
//! The model is downloaded from Hugging Face on first use and cached; after
//! that embeddings run offline on the CPU. Inference is blocking, so it runs
//! on tokio's blocking pool.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use groundchat_core::embedding::{check_batch, EmbeddingProvider};
use groundchat_core::error::{RagError, Result as RagResult};
use tracing::info;

use crate::config::EmbeddingConfig;

const DEFAULT_LOCAL_MODEL: &str = "clip-vit-b-32";

/// Embedding provider running a fastembed model in-process.
pub struct LocalProvider {
    model_name: String,
    model: EmbeddingModel,
    dims: usize,
    batch_size: usize,
    engine: Arc<Mutex<Option<TextEmbedding>>>,
}

impl LocalProvider {
    /// # Errors
    ///
    /// Unknown model names, or `embedding.dims` differing from the model's
    /// native dimension.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());
        let (model, native_dims) = resolve_model(&model_name)?;
        if config.dims != native_dims {
            bail!(
                "embedding.dims is {} but local model '{}' produces {}-dimensional vectors",
                config.dims,
                model_name,
                native_dims
            );
        }
        Ok(Self {
            model_name,
            model,
            dims: native_dims,
            batch_size: config.batch_size,
            engine: Arc::new(Mutex::new(None)),
        })
    }
}

fn resolve_model(name: &str) -> Result<(EmbeddingModel, usize)> {
    match name {
        "clip-vit-b-32" => Ok((EmbeddingModel::ClipVitB32, 512)),
        "all-minilm-l6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             clip-vit-b-32, all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
            other
        ),
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        let engine = self.engine.clone();
        let model = self.model.clone();
        let model_name = self.model_name.clone();
        let batch_size = self.batch_size;
        let inputs = texts.to_vec();

        let vectors = tokio::task::spawn_blocking(move || -> RagResult<Vec<Vec<f32>>> {
            let mut guard = engine
                .lock()
                .map_err(|_| RagError::Embedding("local embedding model lock poisoned".into()))?;
            if guard.is_none() {
                info!(model = %model_name, "loading local embedding model");
                let loaded = TextEmbedding::try_new(
                    InitOptions::new(model).with_show_download_progress(true),
                )
                .map_err(|e| {
                    RagError::Embedding(format!(
                        "failed to initialize local embedding model: {}",
                        e
                    ))
                })?;
                *guard = Some(loaded);
            }
            let engine = guard
                .as_mut()
                .ok_or_else(|| RagError::Embedding("local embedding model not loaded".into()))?;
            engine
                .embed(inputs, Some(batch_size))
                .map_err(|e| RagError::Embedding(format!("local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| RagError::Embedding(format!("embedding task failed: {}", e)))??;

        check_batch(&vectors, texts.len(), self.dims)?;
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_is_clip() {
        let provider = LocalProvider::new(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.model_name(), "clip-vit-b-32");
        assert_eq!(provider.dims(), 512);
    }

    #[test]
    fn test_dims_must_match_model() {
        let config = EmbeddingConfig {
            dims: 384,
            ..EmbeddingConfig::default()
        };
        let err = LocalProvider::new(&config).err().unwrap();
        assert!(err.to_string().contains("512"));
    }
}
