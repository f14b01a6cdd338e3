//! Configuration for the retriever, its encoders and remote sources
//!
//! Loads configuration from config.yml; `.env` is read first so that
//! `${VAR}` placeholders and credential fallbacks resolve from it.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::{Error, Result};

/// Default constants (fallback if config.yml not found)
pub const CONFIG_FILE: &str = "config.yml";
pub const DEFAULT_INDEX_PATH: &str = "data/knowledge_index.json";
pub const DEFAULT_KB_DIR: &str = "knowledge_base";
pub const DEFAULT_HISTORY_PATH: &str = "chat_history.db";
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_EMBEDDING_DIM: usize = 384;
pub const DEFAULT_CHUNK_SIZE: usize = 120;
pub const DEFAULT_CHUNK_OVERLAP: usize = 20;
pub const DEFAULT_PROBE_ADDR: &str = "8.8.8.8:53";
pub const DEFAULT_PROBE_URL: &str = "https://www.google.com";
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SEARCH_RESULTS: usize = 3;
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "all-minilm";
pub const DEFAULT_HISTORY_THRESHOLD: f32 = 0.3;
pub const DEFAULT_HISTORY_MATCHES: usize = 3;

/// Which sentence encoder embeds queries and chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackendKind {
    /// Deterministic feature hashing, no model files needed
    Hashing,
    /// Local Ollama server
    Ollama,
}

impl EmbeddingBackendKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "hashing" | "hash" | "local" => Ok(Self::Hashing),
            "ollama" => Ok(Self::Ollama),
            other => Err(Error::Config(format!("unknown embedding backend '{}'", other))),
        }
    }
}

/// Which remote information source answers online queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteProviderKind {
    None,
    /// Google Custom Search snippets
    Search,
    /// Gemini answer grounded on Custom Search results
    Gemini,
}

impl RemoteProviderKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "" | "none" | "off" => Ok(Self::None),
            "search" | "google" => Ok(Self::Search),
            "gemini" | "advisor" => Ok(Self::Gemini),
            other => Err(Error::Config(format!("unknown remote provider '{}'", other))),
        }
    }
}

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    index: Option<IndexSection>,
    retriever: Option<RetrieverSection>,
    embedding: Option<EmbeddingSection>,
    connectivity: Option<ConnectivitySection>,
    remote: Option<RemoteSection>,
    google: Option<GoogleSection>,
    weather: Option<WeatherSection>,
    history: Option<HistorySection>,
}

#[derive(Debug, Default, Deserialize)]
struct IndexSection {
    path: Option<String>,
    knowledge_base: Option<String>,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrieverSection {
    top_k: Option<usize>,
    max_distance: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddingSection {
    backend: Option<String>,
    dimension: Option<usize>,
    ollama_url: Option<String>,
    ollama_model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConnectivitySection {
    probe_addr: Option<String>,
    probe_url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RemoteSection {
    provider: Option<String>,
    timeout_ms: Option<u64>,
    search_results: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct GoogleSection {
    api_key: Option<String>,
    cse_id: Option<String>,
    gemini_model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WeatherSection {
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct HistorySection {
    path: Option<String>,
    similarity_threshold: Option<f32>,
    max_matches: Option<usize>,
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub index_path: PathBuf,
    pub knowledge_base_dir: PathBuf,
    pub history_path: PathBuf,
    /// Minimum cosine similarity for a past question to be reused offline
    pub history_threshold: f32,
    pub history_matches: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub max_distance: Option<f32>,
    pub embedding_backend: EmbeddingBackendKind,
    pub embedding_dim: usize,
    pub ollama_url: String,
    pub ollama_model: String,
    /// `None` disables the TCP probe
    pub probe_addr: Option<String>,
    /// `None` disables the HTTP probe
    pub probe_url: Option<String>,
    pub probe_timeout: Duration,
    pub remote_provider: RemoteProviderKind,
    pub remote_timeout: Duration,
    pub search_results: usize,
    pub google_api_key: String,
    pub google_cse_id: String,
    pub gemini_model: String,
    /// Empty disables weather answers
    pub openweather_api_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Load configuration from config.yml or use defaults
    /// Environment variables take precedence over config.yml values
    pub fn new() -> Self {
        Self::discover().unwrap_or_else(|e| {
            warn!(error = %e, "ignoring invalid config file, using defaults");
            Self::defaults()
        })
    }

    /// Load from an explicit path, or from the first config.yml found.
    /// A file that exists but does not parse or validate is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::discover(),
        }
    }

    fn discover() -> Result<Self> {
        Self::load_first_existing(&[
            PathBuf::from(CONFIG_FILE),
            Path::new("..").join(CONFIG_FILE),
        ])
    }

    /// Defaults only when none of `candidates` exists.
    fn load_first_existing(candidates: &[PathBuf]) -> Result<Self> {
        match candidates.iter().find(|path| path.is_file()) {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::defaults()),
        }
    }

    /// Resolve a value: prefer env var if config value looks like ${VAR}
    fn resolve_env_string(value: Option<String>, env_key: &str) -> String {
        if let Some(ref v) = value {
            if let Some(var_name) = v.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
                return std::env::var(var_name)
                    .or_else(|_| std::env::var(env_key))
                    .unwrap_or_default();
            }
            if !v.trim().is_empty() {
                return v.clone();
            }
        }
        std::env::var(env_key).unwrap_or_default()
    }

    /// Optional string where an empty value means "disabled"
    fn optional_target(value: Option<String>, default: &str) -> Option<String> {
        match value {
            None => Some(default.to_string()),
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v),
        }
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_dotenv();

        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let yaml: YamlConfig = if content.trim().is_empty() {
            YamlConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };

        let index = yaml.index.unwrap_or_default();
        let retriever = yaml.retriever.unwrap_or_default();
        let embedding = yaml.embedding.unwrap_or_default();
        let connectivity = yaml.connectivity.unwrap_or_default();
        let remote = yaml.remote.unwrap_or_default();
        let google = yaml.google.unwrap_or_default();
        let weather = yaml.weather.unwrap_or_default();
        let history = yaml.history.unwrap_or_default();

        let embedding_backend = match embedding.backend.as_deref() {
            Some(name) => EmbeddingBackendKind::parse(name)?,
            None => EmbeddingBackendKind::Hashing,
        };
        let remote_provider = match remote.provider.as_deref() {
            Some(name) => RemoteProviderKind::parse(name)?,
            None => RemoteProviderKind::Gemini,
        };

        let ollama_url = {
            let resolved = Self::resolve_env_string(embedding.ollama_url, "OLLAMA_URL");
            if resolved.is_empty() {
                DEFAULT_OLLAMA_URL.to_string()
            } else {
                resolved
            }
        };

        let config = Self {
            index_path: index
                .path
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_PATH)),
            knowledge_base_dir: index
                .knowledge_base
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_KB_DIR)),
            history_path: history
                .path
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY_PATH)),
            history_threshold: history
                .similarity_threshold
                .unwrap_or(DEFAULT_HISTORY_THRESHOLD),
            history_matches: history.max_matches.unwrap_or(DEFAULT_HISTORY_MATCHES),
            chunk_size: index.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            chunk_overlap: index.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP),
            top_k: retriever.top_k.unwrap_or(DEFAULT_TOP_K),
            max_distance: retriever.max_distance,
            embedding_backend,
            embedding_dim: embedding.dimension.unwrap_or(DEFAULT_EMBEDDING_DIM),
            ollama_url,
            ollama_model: embedding
                .ollama_model
                .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            probe_addr: Self::optional_target(connectivity.probe_addr, DEFAULT_PROBE_ADDR),
            probe_url: Self::optional_target(connectivity.probe_url, DEFAULT_PROBE_URL),
            probe_timeout: Duration::from_millis(
                connectivity.timeout_ms.unwrap_or(DEFAULT_PROBE_TIMEOUT_MS),
            ),
            remote_provider,
            remote_timeout: Duration::from_millis(
                remote.timeout_ms.unwrap_or(DEFAULT_REMOTE_TIMEOUT_MS),
            ),
            search_results: remote.search_results.unwrap_or(DEFAULT_SEARCH_RESULTS),
            google_api_key: Self::resolve_env_string(google.api_key, "GOOGLE_API_KEY"),
            google_cse_id: Self::resolve_env_string(google.cse_id, "GOOGLE_CSE_ID"),
            gemini_model: google
                .gemini_model
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            openweather_api_key: Self::resolve_env_string(weather.api_key, "OPENWEATHER_API_KEY"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Create config with defaults; credentials still come from the environment
    pub fn defaults() -> Self {
        Self::load_dotenv();
        Self {
            index_path: PathBuf::from(DEFAULT_INDEX_PATH),
            knowledge_base_dir: PathBuf::from(DEFAULT_KB_DIR),
            history_path: PathBuf::from(DEFAULT_HISTORY_PATH),
            history_threshold: DEFAULT_HISTORY_THRESHOLD,
            history_matches: DEFAULT_HISTORY_MATCHES,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            max_distance: None,
            embedding_backend: EmbeddingBackendKind::Hashing,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            ollama_url: std::env::var("OLLAMA_URL")
                .unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string()),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            probe_addr: Some(DEFAULT_PROBE_ADDR.to_string()),
            probe_url: Some(DEFAULT_PROBE_URL.to_string()),
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            remote_provider: RemoteProviderKind::Gemini,
            remote_timeout: Duration::from_millis(DEFAULT_REMOTE_TIMEOUT_MS),
            search_results: DEFAULT_SEARCH_RESULTS,
            google_api_key: Self::resolve_env_string(None, "GOOGLE_API_KEY"),
            google_cse_id: Self::resolve_env_string(None, "GOOGLE_CSE_ID"),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            openweather_api_key: Self::resolve_env_string(None, "OPENWEATHER_API_KEY"),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::Config("retriever.top_k must be at least 1".into()));
        }
        if self.embedding_dim < 8 {
            return Err(Error::Config(format!(
                "embedding.dimension must be at least 8, got {}",
                self.embedding_dim
            )));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config("index.chunk_size must be at least 1".into()));
        }
        if !self.history_threshold.is_finite() || self.history_threshold > 1.0 {
            return Err(Error::Config(format!(
                "history.similarity_threshold must be at most 1, got {}",
                self.history_threshold
            )));
        }
        if let Some(max) = self.max_distance {
            if !max.is_finite() || max <= 0.0 {
                return Err(Error::Config(format!(
                    "retriever.max_distance must be positive, got {}",
                    max
                )));
            }
        }
        Ok(())
    }
}
