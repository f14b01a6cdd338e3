//! Deterministic feature-hashing encoder for fully offline use.

use once_cell::sync::Lazy;
use regex::Regex;

use super::normalize;

pub const HASHING_EMBEDDER_ID: &str = "hashing-v1";

/// Letters, combining marks (Devanagari vowel signs) and digits.
static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{M}\p{N}]+").expect("valid token regex"));

const BIGRAM_WEIGHT: f32 = 0.5;

/// Signed feature hashing of unigrams and adjacent bigrams.
///
/// Uses CRC32 rather than `DefaultHasher` so that an index built today still
/// matches queries embedded by a later toolchain.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn tokenize(text: &str) -> Vec<String> {
        TOKEN_RE
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect()
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let tokens = Self::tokenize(text);
        let mut vec = vec![0.0f32; self.dim];

        for token in &tokens {
            self.add_feature(&mut vec, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vec, &format!("{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }

        normalize(&mut vec);
        vec
    }

    fn add_feature(&self, vec: &mut [f32], feature: &str, weight: f32) {
        let hash = crc32fast::hash(feature.as_bytes());
        let idx = (hash as usize) % self.dim;
        let sign = if hash & 0x8000_0000 == 0 { 1.0 } else { -1.0 };
        vec[idx] += sign * weight;
    }
}
