//! Error types for the knowledge retriever

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Index file not found: {0}")]
    IndexNotFound(String),

    #[error("Local index is empty: {0}")]
    EmptyIndex(String),

    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    #[error("Embedding dimension mismatch for {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("Index was built with embedder '{index}' but '{embedder}' is configured")]
    EmbedderMismatch { index: String, embedder: String },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Remote source error: {0}")]
    Remote(String),

    #[error("Malformed remote response: {0}")]
    MalformedResponse(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("History store error: {0}")]
    History(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::History(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}
