/// Text chunk produced by the chunker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// `<source>#<ordinal>`, stable across rebuilds
    pub id: String,
    /// Raw text of the chunk
    pub text: String,
    /// Word index of the first token
    pub start: usize,
    /// Word index after the last token
    pub end: usize,
    /// Source label (relative file path)
    pub source: String,
}

impl Chunk {
    pub fn new(
        text: String,
        start: usize,
        end: usize,
        source: impl Into<String>,
        ordinal: usize,
    ) -> Self {
        let source = source.into();
        Self {
            id: format!("{}#{}", source, ordinal),
            text,
            start,
            end,
            source,
        }
    }
}

/// Chunking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkingStrategy {
    /// Fixed word windows with overlap
    Words,
    /// Pack whole paragraphs up to the window size; long paragraphs fall back
    /// to word windows (default)
    Paragraphs,
}

/// Word-window chunker with overlap.
#[derive(Debug, Clone)]
pub struct Chunker {
    size: usize,
    overlap: usize,
    strategy: ChunkingStrategy,
}

impl Chunker {
    pub fn new(size: usize, overlap: usize) -> Self {
        Self::with_strategy(size, overlap, ChunkingStrategy::Paragraphs)
    }

    pub fn with_strategy(size: usize, overlap: usize, strategy: ChunkingStrategy) -> Self {
        Self {
            size: size.max(1),
            overlap: overlap.min(size.saturating_sub(1)),
            strategy,
        }
    }

    /// Split text into chunks labelled with `source`.
    pub fn chunk(&self, text: &str, source: &str) -> Vec<Chunk> {
        let spans = match self.strategy {
            ChunkingStrategy::Words => {
                let words: Vec<&str> = text.split_whitespace().collect();
                self.word_windows(&words, 0)
            }
            ChunkingStrategy::Paragraphs => self.pack_paragraphs(text),
        };

        spans
            .into_iter()
            .enumerate()
            .map(|(ordinal, (text, start, end))| Chunk::new(text, start, end, source, ordinal))
            .collect()
    }

    /// Word windows over `words`; offsets are shifted by `base`.
    fn word_windows(&self, words: &[&str], base: usize) -> Vec<(String, usize, usize)> {
        if words.is_empty() {
            return Vec::new();
        }

        let step = self.size.saturating_sub(self.overlap).max(1);
        let mut spans = Vec::new();
        let mut idx = 0;

        while idx < words.len() {
            let end = (idx + self.size).min(words.len());
            spans.push((words[idx..end].join(" "), base + idx, base + end));

            if end == words.len() {
                break;
            }
            idx += step;
        }

        spans
    }

    fn pack_paragraphs(&self, text: &str) -> Vec<(String, usize, usize)> {
        let mut spans = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_start = 0;
        let mut offset = 0;
        let paragraphs = split_paragraphs(text);

        for paragraph in &paragraphs {
            let words: Vec<&str> = paragraph.split_whitespace().collect();
            if words.is_empty() {
                continue;
            }

            if words.len() > self.size {
                if !current.is_empty() {
                    spans.push((current.join(" "), current_start, offset));
                    current.clear();
                }
                spans.extend(self.word_windows(&words, offset));
                offset += words.len();
                current_start = offset;
                continue;
            }

            if current.len() + words.len() > self.size {
                spans.push((current.join(" "), current_start, offset));
                current.clear();
                current_start = offset;
            }
            current.extend(words.iter().copied());
            offset += words.len();
        }

        if !current.is_empty() {
            spans.push((current.join(" "), current_start, offset));
        }

        spans
    }
}

/// Paragraphs are separated by one or more blank lines.
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.trim().is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            current.clear();
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    if !current.trim().is_empty() {
        paragraphs.push(current);
    }

    paragraphs
}
