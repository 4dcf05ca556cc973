//! Configuration parsing and validation.
//!
//! groundchat is configured through a TOML file (default
//! `./config/groundchat.toml`). Every section is optional and falls back to
//! the defaults below; secrets never live in the file and are read from the
//! environment instead.
//!
//! # Example
//!
//! ```toml
//! [document]
//! path = "data/Help-Guide.pdf"
//!
//! [chunking]
//! chunk_size = 500
//! chunk_overlap = 50
//!
//! [embedding]
//! provider = "local"        # local | openai | ollama | disabled
//! dims = 512
//!
//! [index]
//! provider = "pinecone"     # pinecone | memory
//! name = "help-guide"       # required for pinecone; PINECONE_INDEX_NAME overrides
//! dimension = 512
//! metric = "cosine"
//!
//! [retrieval]
//! top_k = 3
//!
//! [chat]
//! base_url = "https://integrate.api.nvidia.com/v1"
//! model = "nvidia/llama-3.1-nemotron-ultra-253b-v1"
//!
//! [server]
//! bind = "127.0.0.1:8501"
//! session_idle_secs = 3600
//! ```
//!
//! # Environment
//!
//! | Variable | Used by |
//! |----------|---------|
//! | `NVIDIA_API_KEY` | chat endpoint (`chat`, `serve`) |
//! | `PINECONE_API_KEY` | Pinecone index |
//! | `PINECONE_INDEX_NAME` | overrides `index.name` |
//! | `OPENAI_API_KEY` | `openai` embedding provider |

use anyhow::{bail, Context, Result};
use groundchat_core::chat::SamplingParams;
use groundchat_core::chunk::{ChunkingParams, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use groundchat_core::orchestrator::{TurnSettings, DEFAULT_MODEL};
use groundchat_core::prompt::DEFAULT_HISTORY_WINDOW;
use groundchat_core::retrieval::DEFAULT_TOP_K;
use groundchat_core::store::Metric;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/groundchat.toml";

pub const NVIDIA_API_KEY_VAR: &str = "NVIDIA_API_KEY";
pub const PINECONE_API_KEY_VAR: &str = "PINECONE_API_KEY";
pub const PINECONE_INDEX_NAME_VAR: &str = "PINECONE_INDEX_NAME";
pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Name of the in-memory index when `index.name` is unset.
pub const MEMORY_INDEX_NAME: &str = "help-guide";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub document: DocumentConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub moderation: ModerationConfig,
    pub chat: ChatConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DocumentConfig {
    pub path: PathBuf,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/Help-Guide.pdf"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkingParams {
        ChunkingParams::new(self.chunk_size, self.chunk_overlap)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    /// Model name; each provider has its own default.
    pub model: Option<String>,
    pub dims: usize,
    /// Base URL for the `openai` and `ollama` providers.
    pub url: Option<String>,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: None,
            dims: 512,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    pub provider: String,
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub cloud: String,
    pub region: String,
    /// Pinecone control-plane URL.
    pub api_url: String,
    pub api_version: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
    /// How long to wait for a freshly created index to become ready.
    pub ready_timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: "pinecone".to_string(),
            name: String::new(),
            dimension: 512,
            metric: Metric::Cosine,
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            api_url: "https://api.pinecone.io".to_string(),
            api_version: "2025-01".to_string(),
            max_retries: 3,
            timeout_secs: 30,
            ready_timeout_secs: 120,
        }
    }
}

impl IndexConfig {
    /// The index to read and write. Pinecone has no default and fails
    /// without a name; the in-memory index falls back to
    /// [`MEMORY_INDEX_NAME`].
    pub fn resolved_name(&self) -> Result<String> {
        let name = self.name.trim();
        if !name.is_empty() {
            return Ok(name.to_string());
        }
        if self.provider == "memory" {
            return Ok(MEMORY_INDEX_NAME.to_string());
        }
        bail!(
            "index name not set: set [index].name or {}",
            PINECONE_INDEX_NAME_VAR
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ModerationConfig {
    /// Terms added to the built-in disallowed list.
    pub extra_terms: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub history_window: usize,
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        let sampling = SamplingParams::default();
        Self {
            base_url: "https://integrate.api.nvidia.com/v1".to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            max_tokens: sampling.max_tokens,
            frequency_penalty: sampling.frequency_penalty,
            presence_penalty: sampling.presence_penalty,
            history_window: DEFAULT_HISTORY_WINDOW,
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Sessions untouched for this long are dropped.
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8501".to_string(),
            session_idle_secs: 3600,
        }
    }
}

impl Config {
    /// Turn settings for the chat orchestrator.
    pub fn turn_settings(&self) -> TurnSettings {
        TurnSettings {
            model: self.chat.model.clone(),
            sampling: SamplingParams {
                temperature: self.chat.temperature,
                top_p: self.chat.top_p,
                max_tokens: self.chat.max_tokens,
                frequency_penalty: self.chat.frequency_penalty,
                presence_penalty: self.chat.presence_penalty,
            },
            top_k: self.retrieval.top_k,
            history_window: self.chat.history_window,
        }
    }
}

/// Load configuration.
///
/// With `path = None` the default location is tried and plain defaults are
/// used when it does not exist. An explicitly given path must exist.
/// `PINECONE_INDEX_NAME` overrides `index.name`.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => parse_file(path)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                parse_file(default)?
            } else {
                Config::default()
            }
        }
    };

    if let Some(name) = env_var(PINECONE_INDEX_NAME_VAR) {
        config.index.name = name;
    }

    validate(&config)?;
    Ok(config)
}

fn parse_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Check cross-field constraints.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.chat.history_window < 1 {
        bail!("chat.history_window must be >= 1");
    }
    if !(0.0..=2.0).contains(&config.chat.temperature) {
        bail!("chat.temperature must be in [0.0, 2.0]");
    }
    if !(config.chat.top_p > 0.0 && config.chat.top_p <= 1.0) {
        bail!("chat.top_p must be in (0.0, 1.0]");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be local, openai, ollama, or disabled.",
            other
        ),
    }
    if config.embedding.dims == 0 {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.index.provider.as_str() {
        "pinecone" | "memory" => {}
        other => bail!(
            "Unknown index provider: '{}'. Must be pinecone or memory.",
            other
        ),
    }
    if config.index.dimension != config.embedding.dims {
        bail!(
            "index.dimension ({}) must equal embedding.dims ({})",
            config.index.dimension,
            config.embedding.dims
        );
    }

    Ok(())
}

/// Read a secret from the environment, failing with a message that names it.
pub fn require_env(name: &str) -> Result<String> {
    env_var(name).with_context(|| format!("{} environment variable not set", name))
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
