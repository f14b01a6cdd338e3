//! Local vector index: chunking, building, persistence and search.

pub mod builder;
pub mod chunker;
pub mod local;

pub use builder::IndexBuilder;
pub use chunker::{Chunk, Chunker, ChunkingStrategy};
pub use local::{euclidean_distance, IndexStats, LocalIndex};
