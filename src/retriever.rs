//! Connectivity-aware retrieval.
//!
//! Online queries go to the configured remote source under a timeout. Any
//! remote failure falls back to nearest-neighbour search over the local
//! index, so the caller always gets an answer while the index is usable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connectivity::ConnectivityProbe;
use crate::embedding::EmbedBackend;
use crate::index::LocalIndex;
use crate::metrics;
use crate::models::{Connectivity, FallbackReason, Query, RemoteAnswer, Retrieval, ScoredChunk};
use crate::remote::{weather_location, RemoteSource, WeatherClient};
use crate::{Error, Result};

/// Retrieval tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrieverConfig {
    /// Number of local chunks returned
    pub top_k: usize,
    /// Upper bound on the whole remote call
    pub remote_timeout: Duration,
    /// Drop local chunks farther than this
    pub max_distance: Option<f32>,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: crate::config::DEFAULT_TOP_K,
            remote_timeout: Duration::from_millis(crate::config::DEFAULT_REMOTE_TIMEOUT_MS),
            max_distance: None,
        }
    }
}

impl RetrieverConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.top_k,
            remote_timeout: config.remote_timeout,
            max_distance: config.max_distance,
        }
    }
}

pub struct Retriever {
    index: Arc<LocalIndex>,
    embedder: EmbedBackend,
    probe: ConnectivityProbe,
    remote: Option<RemoteSource>,
    weather: Option<RemoteSource>,
    config: RetrieverConfig,
}

impl Retriever {
    /// Fails when the embedder cannot produce vectors comparable to the index.
    pub fn new(
        index: Arc<LocalIndex>,
        embedder: EmbedBackend,
        probe: ConnectivityProbe,
        config: RetrieverConfig,
    ) -> Result<Self> {
        if config.top_k == 0 {
            return Err(Error::InvalidArgument("top_k must be at least 1".into()));
        }
        if index.is_empty() {
            return Err(Error::EmptyIndex("cannot retrieve from an empty index".into()));
        }
        if embedder.dimension() != index.dimension() {
            return Err(Error::DimensionMismatch {
                context: format!("embedder {}", embedder.id()),
                expected: index.dimension(),
                actual: embedder.dimension(),
            });
        }
        if embedder.id() != index.embedder() {
            return Err(Error::EmbedderMismatch {
                index: index.embedder().to_string(),
                embedder: embedder.id(),
            });
        }

        Ok(Self {
            index,
            embedder,
            probe,
            remote: None,
            weather: None,
            config,
        })
    }

    pub fn with_remote(mut self, remote: RemoteSource) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Questions that name a place and ask about the weather go here
    /// instead of the general remote.
    pub fn with_weather(mut self, client: WeatherClient) -> Self {
        self.weather = Some(RemoteSource::Weather(client));
        self
    }

    pub fn index(&self) -> &LocalIndex {
        &self.index
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn embedder(&self) -> &EmbedBackend {
        &self.embedder
    }

    pub async fn detect_connectivity(&self) -> Connectivity {
        self.probe.detect().await
    }

    /// Probe the network, then retrieve in the detected mode.
    pub async fn retrieve_auto(&self, query: &Query) -> Result<Retrieval> {
        let mode = self.detect_connectivity().await;
        info!(mode = mode.as_str(), "connectivity detected");
        self.retrieve(query, mode).await
    }

    /// Remote failures never surface here; only local search errors do.
    pub async fn retrieve(&self, query: &Query, mode: Connectivity) -> Result<Retrieval> {
        let start = Instant::now();

        let fallback = match mode {
            Connectivity::Offline => None,
            Connectivity::Online => match self.try_remote(query).await {
                Ok(answer) => {
                    metrics::record_retrieval("remote", start.elapsed());
                    return Ok(Retrieval::Remote(answer));
                }
                Err(reason) => {
                    warn!(%reason, "falling back to local index");
                    metrics::record_fallback(&reason);
                    Some(reason)
                }
            },
        };

        let chunks = self.search_local(&query.text).await?;
        metrics::record_retrieval("local", start.elapsed());
        Ok(Retrieval::Local { chunks, fallback })
    }

    fn route(&self, query: &Query) -> Option<&RemoteSource> {
        match &self.weather {
            Some(weather) if weather_location(&query.text).is_some() => Some(weather),
            _ => self.remote.as_ref(),
        }
    }

    async fn try_remote(&self, query: &Query) -> std::result::Result<RemoteAnswer, FallbackReason> {
        let Some(remote) = self.route(query) else {
            return Err(FallbackReason::NoRemoteConfigured);
        };

        let limit = self.config.remote_timeout;
        let outcome = match tokio::time::timeout(limit, remote.fetch(query)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(limit.as_millis() as u64)),
        };

        match outcome {
            Ok(answer) => {
                debug!(remote = remote.name(), sources = answer.sources.len(), "remote answered");
                Ok(answer)
            }
            Err(e) => Err(FallbackReason::from(e)),
        }
    }

    /// Nearest chunks to `text` in the local index.
    pub async fn search_local(&self, text: &str) -> Result<Vec<ScoredChunk>> {
        let query_vec = self.embedder.embed(text).await?;
        // No indexable terms: every chunk would sit at the same distance
        if query_vec.iter().all(|v| *v == 0.0) {
            debug!("query has no indexable terms");
            return Ok(Vec::new());
        }

        let results = self
            .index
            .search(&query_vec, self.config.top_k, self.config.max_distance)?;

        debug!(
            results = results.len(),
            best = results.first().map(|r| r.distance),
            "local search"
        );
        Ok(results)
    }
}
