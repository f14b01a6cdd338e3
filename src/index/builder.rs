//! Offline construction of the local index from a knowledge-base directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::chunker::{Chunk, Chunker};
use super::local::LocalIndex;
use crate::embedding::{EmbedBackend, DEFAULT_EMBED_CONCURRENCY};
use crate::models::KnowledgeChunk;
use crate::{Error, Result};

const KB_EXTENSIONS: &[&str] = &["txt", "md"];

/// Chunks, embeds and packs knowledge-base documents into a [`LocalIndex`].
pub struct IndexBuilder {
    chunker: Chunker,
    backend: EmbedBackend,
    concurrency: usize,
}

impl IndexBuilder {
    pub fn new(chunker: Chunker, backend: EmbedBackend) -> Self {
        Self {
            chunker,
            backend,
            concurrency: DEFAULT_EMBED_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Collect `.txt`/`.md` files under `dir`, sorted by relative path.
    pub fn collect_documents(dir: &Path) -> Result<Vec<(String, String)>> {
        if !dir.is_dir() {
            return Err(Error::InvalidArgument(format!(
                "knowledge base directory not found: {}",
                dir.display()
            )));
        }

        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .map_or(false, |ext| KB_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            })
            .collect();
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let relative = path
                .strip_prefix(dir)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");

            match fs::read_to_string(&path) {
                Ok(content) => documents.push((relative, content)),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable file"),
            }
        }

        debug!(count = documents.len(), dir = %dir.display(), "collected knowledge-base files");
        Ok(documents)
    }

    /// Build an index from `(source, text)` pairs.
    pub async fn build_from_documents(&self, documents: &[(String, String)]) -> Result<LocalIndex> {
        let chunks: Vec<Chunk> = documents
            .iter()
            .filter(|(_, text)| !text.trim().is_empty())
            .flat_map(|(source, text)| self.chunker.chunk(text, source))
            .collect();

        if chunks.is_empty() {
            return Err(Error::EmptyIndex(
                "knowledge base produced no chunks".into(),
            ));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.backend.embed_batch(&texts, self.concurrency).await?;

        let knowledge: Vec<KnowledgeChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| KnowledgeChunk {
                id: chunk.id,
                source: chunk.source,
                text: chunk.text,
                embedding,
            })
            .collect();

        info!(
            chunks = knowledge.len(),
            documents = documents.len(),
            embedder = %self.backend.id(),
            "built local index"
        );
        LocalIndex::from_chunks(self.backend.dimension(), self.backend.id(), knowledge)
    }

    /// Build from a directory and write the result to `out`.
    pub async fn build_dir(&self, dir: &Path, out: &Path) -> Result<LocalIndex> {
        let documents = Self::collect_documents(dir)?;
        let index = self.build_from_documents(&documents).await?;
        index.save(out)?;
        info!(path = %out.display(), "index written");
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> IndexBuilder {
        IndexBuilder::new(Chunker::new(8, 2), EmbedBackend::hashing(64))
    }

    #[test]
    fn collects_sorted_text_files_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pests")).unwrap();
        fs::write(dir.path().join("wheat.txt"), "wheat rust").unwrap();
        fs::write(dir.path().join("pests").join("aphid.md"), "aphids").unwrap();
        fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let docs = IndexBuilder::collect_documents(dir.path()).unwrap();
        let names: Vec<&str> = docs.iter().map(|(s, _)| s.as_str()).collect();

        assert_eq!(names, vec!["pests/aphid.md", "wheat.txt"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = IndexBuilder::collect_documents(Path::new("/nonexistent/kb")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn builds_index_with_stable_ids() {
        let docs = vec![
            ("wheat.txt".to_string(), "Wheat rust shows orange pustules.".to_string()),
            ("empty.txt".to_string(), "   ".to_string()),
            ("millet.txt".to_string(), "Millet blast causes grey lesions.".to_string()),
        ];

        let index = builder().build_from_documents(&docs).await.unwrap();
        let ids: Vec<&str> = index.chunks().iter().map(|c| c.id.as_str()).collect();

        assert_eq!(ids, vec!["wheat.txt#0", "millet.txt#0"]);
        assert_eq!(index.dimension(), 64);
        assert_eq!(index.embedder(), "hashing-v1");

        let again = builder().build_from_documents(&docs).await.unwrap();
        assert_eq!(index, again);
    }

    #[tokio::test]
    async fn empty_knowledge_base_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("index.json");

        let err = builder().build_dir(dir.path(), &out).await.unwrap_err();
        assert!(matches!(err, Error::EmptyIndex(_)));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn build_dir_writes_loadable_index() {
        let dir = tempfile::tempdir().unwrap();
        let kb = dir.path().join("kb");
        fs::create_dir_all(&kb).unwrap();
        fs::write(kb.join("a.txt"), "drip irrigation saves water").unwrap();
        let out = dir.path().join("data").join("index.json");

        let built = builder().build_dir(&kb, &out).await.unwrap();
        let loaded = LocalIndex::load(&out).unwrap();

        assert_eq!(built, loaded);
    }
}
