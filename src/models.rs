//! Domain types shared by the retriever, the index and the remote sources.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Image attached to a query (e.g. a photo of a diseased leaf).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// A user question, optionally with an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    pub image: Option<ImageAttachment>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        self.image = Some(ImageAttachment {
            data,
            mime_type: mime_type.into(),
        });
        self
    }
}

/// Passage stored in the local index together with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: String,
    pub source: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Chunk returned by a local search with its Euclidean distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: KnowledgeChunk,
    pub distance: f32,
}

impl ScoredChunk {
    /// Cosine similarity implied by the distance between two unit vectors.
    pub fn similarity(&self) -> f32 {
        (1.0 - self.distance * self.distance / 2.0).clamp(-1.0, 1.0)
    }
}

/// A citation attached to a remote answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLink {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

/// Answer produced by a remote information source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAnswer {
    pub provider: String,
    pub text: String,
    pub sources: Vec<SourceLink>,
}

/// Network availability, also used as the retrieval mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Connectivity::Online => "online",
            Connectivity::Offline => "offline",
        }
    }
}

/// Why the online path was abandoned in favour of the local index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    NoRemoteConfigured,
    Timeout,
    RemoteError(String),
    MalformedResponse(String),
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackReason::NoRemoteConfigured => write!(f, "no remote source configured"),
            FallbackReason::Timeout => write!(f, "remote source timed out"),
            FallbackReason::RemoteError(e) => write!(f, "remote source failed: {}", e),
            FallbackReason::MalformedResponse(e) => write!(f, "remote response unusable: {}", e),
        }
    }
}

impl From<Error> for FallbackReason {
    fn from(err: Error) -> Self {
        match err {
            Error::Timeout(_) => FallbackReason::Timeout,
            Error::MalformedResponse(msg) => FallbackReason::MalformedResponse(msg),
            other => FallbackReason::RemoteError(other.to_string()),
        }
    }
}

/// Outcome of a retrieval.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    Remote(RemoteAnswer),
    Local {
        chunks: Vec<ScoredChunk>,
        fallback: Option<FallbackReason>,
    },
}

impl Retrieval {
    pub fn is_remote(&self) -> bool {
        matches!(self, Retrieval::Remote(_))
    }

    /// Local chunks, empty for remote answers.
    pub fn chunks(&self) -> &[ScoredChunk] {
        match self {
            Retrieval::Remote(_) => &[],
            Retrieval::Local { chunks, .. } => chunks,
        }
    }

    pub fn fallback(&self) -> Option<&FallbackReason> {
        match self {
            Retrieval::Remote(_) => None,
            Retrieval::Local { fallback, .. } => fallback.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(distance: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: KnowledgeChunk {
                id: "a#0".into(),
                source: "a".into(),
                text: "text".into(),
                embedding: vec![1.0],
            },
            distance,
        }
    }

    #[test]
    fn similarity_from_unit_distance() {
        assert!((chunk(0.0).similarity() - 1.0).abs() < 1e-6);
        assert!((chunk(1.0).similarity() - 0.5).abs() < 1e-6);
        assert!((chunk(2.0).similarity() + 1.0).abs() < 1e-6);
        // clamped for non-unit inputs
        assert_eq!(chunk(10.0).similarity(), -1.0);
    }

    #[test]
    fn query_with_image() {
        let query = Query::new("leaf spots").with_image(vec![1, 2, 3], "image/jpeg");
        let image = query.image.expect("image");
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.data.len(), 3);
    }

    #[test]
    fn retrieval_accessors() {
        let remote = Retrieval::Remote(RemoteAnswer {
            provider: "search".into(),
            text: "answer".into(),
            sources: vec![],
        });
        assert!(remote.is_remote());
        assert!(remote.chunks().is_empty());
        assert!(remote.fallback().is_none());

        let local = Retrieval::Local {
            chunks: vec![chunk(0.3)],
            fallback: Some(FallbackReason::Timeout),
        };
        assert!(!local.is_remote());
        assert_eq!(local.chunks().len(), 1);
        assert_eq!(local.fallback(), Some(&FallbackReason::Timeout));
    }

    #[test]
    fn fallback_reason_display() {
        assert_eq!(
            FallbackReason::NoRemoteConfigured.to_string(),
            "no remote source configured"
        );
        assert!(FallbackReason::RemoteError("HTTP 503".into())
            .to_string()
            .contains("HTTP 503"));
    }

    #[test]
    fn fallback_reason_from_remote_errors() {
        assert_eq!(FallbackReason::from(Error::Timeout(200)), FallbackReason::Timeout);
        assert_eq!(
            FallbackReason::from(Error::MalformedResponse("not json".into())),
            FallbackReason::MalformedResponse("not json".into())
        );
        assert!(matches!(
            FallbackReason::from(Error::Remote("HTTP 429".into())),
            FallbackReason::RemoteError(msg) if msg.contains("HTTP 429")
        ));
    }

    #[test]
    fn connectivity_labels() {
        assert_eq!(Connectivity::Online.as_str(), "online");
        assert_eq!(Connectivity::Offline.as_str(), "offline");
    }

    #[test]
    fn knowledge_chunk_serde_shape() {
        let json = r#"{"id":"x#0","source":"x","text":"t","embedding":[0.5,0.5]}"#;
        let parsed: KnowledgeChunk = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.embedding, vec![0.5, 0.5]);
    }
}
