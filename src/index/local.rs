//! Read-only vector index persisted as JSON.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{KnowledgeChunk, ScoredChunk};
use crate::{Error, Result};

pub const INDEX_FORMAT_VERSION: u32 = 1;

/// On-disk layout of the index file.
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    dimension: usize,
    embedder: String,
    chunks: Vec<KnowledgeChunk>,
}

/// Immutable collection of embedded knowledge chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalIndex {
    dimension: usize,
    embedder: String,
    chunks: Vec<KnowledgeChunk>,
}

/// Summary printed by the `stats` command.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub chunks: usize,
    pub sources: usize,
    pub dimension: usize,
    pub embedder: String,
    pub avg_words: f32,
}

impl LocalIndex {
    /// Build an index from chunks, validating every embedding.
    pub fn from_chunks(
        dimension: usize,
        embedder: impl Into<String>,
        chunks: Vec<KnowledgeChunk>,
    ) -> Result<Self> {
        let index = Self {
            dimension,
            embedder: embedder.into(),
            chunks,
        };
        index.validate()?;
        Ok(index)
    }

    /// Load and validate an index file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::IndexNotFound(path.display().to_string()));
        }

        let content = fs::read_to_string(path)?;
        let file: IndexFile = serde_json::from_str(&content)
            .map_err(|e| Error::InvalidIndex(format!("{}: {}", path.display(), e)))?;

        if file.version != INDEX_FORMAT_VERSION {
            return Err(Error::InvalidIndex(format!(
                "{}: unsupported format version {}",
                path.display(),
                file.version
            )));
        }

        let index = Self::from_chunks(file.dimension, file.embedder, file.chunks)?;
        info!(
            path = %path.display(),
            chunks = index.len(),
            dim = index.dimension,
            embedder = %index.embedder,
            "loaded local index"
        );
        Ok(index)
    }

    /// Write the index as JSON, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = IndexFile {
            version: INDEX_FORMAT_VERSION,
            dimension: self.dimension,
            embedder: self.embedder.clone(),
            chunks: self.chunks.clone(),
        };
        fs::write(path, serde_json::to_string(&file)?)?;
        debug!(path = %path.display(), chunks = self.len(), "saved local index");
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.chunks.is_empty() {
            return Err(Error::EmptyIndex(
                "no knowledge chunks; build the index first".into(),
            ));
        }
        if self.dimension == 0 {
            return Err(Error::InvalidIndex("dimension must be positive".into()));
        }

        for chunk in &self.chunks {
            if chunk.embedding.len() != self.dimension {
                return Err(Error::DimensionMismatch {
                    context: format!("chunk {}", chunk.id),
                    expected: self.dimension,
                    actual: chunk.embedding.len(),
                });
            }
            if chunk.embedding.iter().any(|v| !v.is_finite()) {
                return Err(Error::InvalidIndex(format!(
                    "chunk {} has non-finite embedding values",
                    chunk.id
                )));
            }
        }

        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn embedder(&self) -> &str {
        &self.embedder
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[KnowledgeChunk] {
        &self.chunks
    }

    /// The `k` chunks closest to `query`, ascending by Euclidean distance.
    ///
    /// Equal distances keep index order. Chunks farther than `max_distance`
    /// are dropped.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        max_distance: Option<f32>,
    ) -> Result<Vec<ScoredChunk>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                context: "query embedding".into(),
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut distances: Vec<(usize, f32)> = self
            .chunks
            .par_iter()
            .enumerate()
            .map(|(i, chunk)| (i, euclidean_distance(query, &chunk.embedding)))
            .collect();

        distances.sort_by(|a, b| match a.1.total_cmp(&b.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });

        Ok(distances
            .into_iter()
            .filter(|(_, d)| max_distance.map_or(true, |max| *d <= max))
            .take(k)
            .map(|(i, distance)| ScoredChunk {
                chunk: self.chunks[i].clone(),
                distance,
            })
            .collect())
    }

    pub fn stats(&self) -> IndexStats {
        let mut sources: Vec<&str> = self.chunks.iter().map(|c| c.source.as_str()).collect();
        sources.sort_unstable();
        sources.dedup();

        let words: usize = self
            .chunks
            .iter()
            .map(|c| c.text.split_whitespace().count())
            .sum();

        IndexStats {
            chunks: self.chunks.len(),
            sources: sources.len(),
            dimension: self.dimension,
            embedder: self.embedder.clone(),
            avg_words: words as f32 / self.chunks.len().max(1) as f32,
        }
    }
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
