//! # groundchat
//!
//! Retrieval-augmented chat over a help guide.
//!
//! groundchat ingests a document into a vector index, then answers questions
//! about it through a hosted language model, grounding every answer in the
//! most similar document chunks. Questions with disallowed language are
//! refused before any retrieval happens.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌───────────┐
//! │ Document │──▶│ Chunk+Embed │──▶│ Pinecone  │
//! │  (PDF)   │   │  (ingest)   │   │  index    │
//! └──────────┘   └─────────────┘   └─────┬─────┘
//!                                        │ top-k
//!   user ─▶ moderation ─▶ retrieval ◀────┘
//!                            │
//!                            ▼
//!                   grounded prompt ─▶ LLM (SSE) ─▶ streamed answer
//! ```
//!
//! The pipeline logic lives in `groundchat-core`; this crate supplies the
//! adapters (HTTP, PDF, fastembed), the CLI, and the web server.
//!
//! ## Quick Start
//!
//! ```bash
//! export NVIDIA_API_KEY=... PINECONE_API_KEY=... PINECONE_INDEX_NAME=help-guide
//! groundchat ingest                 # build the index from data/Help-Guide.pdf
//! groundchat search "refund policy" # inspect retrieval
//! groundchat chat                   # terminal chat
//! groundchat serve                  # web chat on http://127.0.0.1:8501
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment secrets |
//! | [`extract`] | Document loading and PDF text extraction |
//! | [`embedding`] | Embedding provider implementations |
//! | [`pinecone`] | Pinecone vector index adapter |
//! | [`index`] | Vector index selection |
//! | [`llm`] | OpenAI-compatible streaming chat endpoint |
//! | [`ingest`] | Ingestion pipeline |
//! | [`search`] | Retrieval inspection command |
//! | [`runtime`] | Orchestrator wiring |
//! | [`repl`] | Terminal chat loop |
//! | [`server`] | Web chat server |

pub mod config;
pub mod embedding;
pub mod extract;
pub mod http;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod pinecone;
pub mod repl;
pub mod runtime;
pub mod search;
pub mod server;
