//! Vector index selection.

use std::sync::Arc;

use anyhow::{bail, Result};
use groundchat_core::store::memory::InMemoryIndex;
use groundchat_core::store::VectorIndex;

use crate::config::IndexConfig;
use crate::pinecone::PineconeIndex;

/// Create the [`VectorIndex`] named by `config.provider`.
///
/// | Config Value | Index |
/// |-------------|-------|
/// | `"pinecone"` | [`PineconeIndex`] (needs `PINECONE_API_KEY`) |
/// | `"memory"` | [`InMemoryIndex`], empty until ingested into |
pub fn create_index(config: &IndexConfig) -> Result<Arc<dyn VectorIndex>> {
    match config.provider.as_str() {
        "pinecone" => Ok(Arc::new(PineconeIndex::new(config)?)),
        "memory" => Ok(Arc::new(InMemoryIndex::new())),
        other => bail!("Unknown index provider: {}", other),
    }
}
