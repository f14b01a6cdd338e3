//! Khet Sahayak knowledge retriever
//!
//! This library provides tools to:
//! - Detect whether the network is reachable
//! - Answer questions from a remote source (Custom Search, Gemini) when online
//! - Fall back to nearest-neighbour search over a local vector index
//! - Build that index from a knowledge-base directory
//! - Keep a SQLite history of asked questions

pub mod config;
pub mod connectivity;
pub mod embedding;
pub mod error;
pub mod history;
pub mod index;
pub mod metrics;
pub mod models;
pub mod prompts;
pub mod remote;
pub mod retriever;

// Re-export common types
pub use config::Config;
pub use connectivity::ConnectivityProbe;
pub use embedding::EmbedBackend;
pub use error::{Error, Result};
pub use index::{IndexBuilder, LocalIndex};
pub use models::{
    Connectivity, FallbackReason, KnowledgeChunk, Query, RemoteAnswer, Retrieval, ScoredChunk,
    SourceLink,
};
pub use prompts::{load_prompt, Prompt};
pub use remote::RemoteSource;
pub use retriever::{Retriever, RetrieverConfig};

// Commands module uses re-exported types, so it must be declared after the re-exports
pub mod commands;
