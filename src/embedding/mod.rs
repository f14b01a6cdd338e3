//! Sentence encoders that map text into the index vector space.
//!
//! - `Hashing`: deterministic, no model files, always available offline
//! - `Ollama`: pretrained encoder served by a local Ollama instance

pub mod hashing;
pub mod ollama;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::info;

pub use hashing::{HashingEmbedder, HASHING_EMBEDDER_ID};
pub use ollama::OllamaEmbedder;

use crate::config::{Config, EmbeddingBackendKind};
use crate::Result;

/// Concurrent requests when embedding many chunks through Ollama.
pub const DEFAULT_EMBED_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub enum EmbedBackend {
    Hashing(HashingEmbedder),
    Ollama(OllamaEmbedder),
}

impl EmbedBackend {
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = match config.embedding_backend {
            EmbeddingBackendKind::Hashing => {
                EmbedBackend::Hashing(HashingEmbedder::new(config.embedding_dim))
            }
            EmbeddingBackendKind::Ollama => EmbedBackend::Ollama(OllamaEmbedder::new(
                &config.ollama_url,
                &config.ollama_model,
                config.embedding_dim,
            )?),
        };
        info!(embedder = %backend.id(), dim = backend.dimension(), "embedding backend ready");
        Ok(backend)
    }

    pub fn hashing(dim: usize) -> Self {
        EmbedBackend::Hashing(HashingEmbedder::new(dim))
    }

    /// Identifier stored in the index so queries use the same encoder.
    pub fn id(&self) -> String {
        match self {
            EmbedBackend::Hashing(_) => HASHING_EMBEDDER_ID.to_string(),
            EmbedBackend::Ollama(ollama) => format!("ollama:{}", ollama.model()),
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            EmbedBackend::Hashing(local) => local.dimension(),
            EmbedBackend::Ollama(ollama) => ollama.dimension(),
        }
    }

    /// The hashing encoder is always available; Ollama needs its server.
    pub async fn is_available(&self) -> bool {
        match self {
            EmbedBackend::Hashing(_) => true,
            EmbedBackend::Ollama(ollama) => ollama.is_running().await,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match self {
            EmbedBackend::Hashing(local) => Ok(local.embed(text)),
            EmbedBackend::Ollama(ollama) => ollama.embed(text).await,
        }
    }

    /// Embed many texts, preserving input order.
    pub async fn embed_batch(&self, texts: &[String], concurrency: usize) -> Result<Vec<Vec<f32>>> {
        match self {
            EmbedBackend::Hashing(local) => Ok(texts.iter().map(|t| local.embed(t)).collect()),
            EmbedBackend::Ollama(ollama) => {
                stream::iter(texts.iter().map(|t| ollama.embed(t)))
                    .buffered(concurrency.max(1))
                    .try_collect()
                    .await
            }
        }
    }
}

/// Scale a vector to unit length; zero vectors are left untouched.
pub fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}
