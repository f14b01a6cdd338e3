//! `build-index` command: knowledge-base directory to index JSON.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::embedding::EmbedBackend;
use crate::index::{Chunker, IndexBuilder, IndexStats, LocalIndex};

/// Build the index, overriding the configured directories when given.
pub async fn run(
    config: &Config,
    kb_dir: Option<PathBuf>,
    out: Option<PathBuf>,
) -> Result<IndexStats> {
    let kb_dir = kb_dir.unwrap_or_else(|| config.knowledge_base_dir.clone());
    let out = out.unwrap_or_else(|| config.index_path.clone());
    let start = Instant::now();

    info!(kb = %kb_dir.display(), out = %out.display(), "building local index");

    let backend = EmbedBackend::from_config(config)?;
    let builder = IndexBuilder::new(Chunker::new(config.chunk_size, config.chunk_overlap), backend);
    let index = builder
        .build_dir(&kb_dir, &out)
        .await
        .with_context(|| format!("failed to build index from {}", kb_dir.display()))?;

    let stats = index.stats();
    info!(
        chunks = stats.chunks,
        sources = stats.sources,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "index ready"
    );
    Ok(stats)
}

/// `stats` command: summary of the index at the configured path.
pub fn show_stats(config: &Config) -> Result<String> {
    let index = LocalIndex::load(&config.index_path)
        .with_context(|| format!("failed to load index {}", config.index_path.display()))?;
    Ok(format!(
        "Index: {}\n{}",
        config.index_path.display(),
        format_stats(&index.stats())
    ))
}

pub fn format_stats(stats: &IndexStats) -> String {
    format!(
        "Chunks: {}\nSources: {}\nDimension: {}\nEmbedder: {}\nAverage words per chunk: {:.1}",
        stats.chunks, stats.sources, stats.dimension, stats.embedder, stats.avg_words
    )
}
