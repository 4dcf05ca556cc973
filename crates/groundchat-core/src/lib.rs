//! # groundchat core
//!
//! Runtime-agnostic logic for groundchat: data model, chunking, moderation,
//! the capability traits for embeddings, vector indexes and chat endpoints,
//! retrieval, prompt construction and the chat turn orchestrator.
//!
//! This crate contains no tokio, HTTP or filesystem dependencies. Concrete
//! adapters (Pinecone, OpenAI-compatible endpoints, fastembed) live in the
//! `groundchat` app crate.

pub mod chat;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod models;
pub mod moderation;
pub mod orchestrator;
pub mod prompt;
pub mod retrieval;
pub mod session;
pub mod store;
pub mod testing;
