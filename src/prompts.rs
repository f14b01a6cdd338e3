//! Prompt templates, overridable by files in `prompts/`.

use std::path::PathBuf;

use crate::{Error, Result};

const ADVISOR_PROMPT: &str = r#"You are 'Pahari Khet Sahayak', an expert agricultural assistant for farmers in Uttarakhand.
Give clear, reliable and actionable advice.

--- CONTEXT FROM LIVE SEARCH ---
{context}
--- END OF CONTEXT ---

Question: {question}

Answer using the context above. Summarize the key symptoms or facts, then give
step-by-step treatment or guidance and a short bulleted prevention plan where it applies.
At the end add a section titled "Sources:" listing the Source Title and Source Link of
every search result you used.

If the context does not contain enough information, say exactly:
"I could not find enough specific information to provide a reliable answer. It is best to consult a local agricultural expert."

Respond in Markdown with clear sections."#;

const IMAGE_NOTE: &str =
    "A photo from the farmer is attached. Describe what is visible before giving advice.";

/// Available prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Grounded answer over live search results.
    Advisor,
    /// Extra instruction when the query carries an image.
    ImageNote,
}

impl Prompt {
    pub fn filename(&self) -> &'static str {
        match self {
            Prompt::Advisor => "advisor.md",
            Prompt::ImageNote => "image_note.md",
        }
    }

    fn builtin(&self) -> &'static str {
        match self {
            Prompt::Advisor => ADVISOR_PROMPT,
            Prompt::ImageNote => IMAGE_NOTE,
        }
    }

    /// Load from `prompts/`.
    pub fn load(&self) -> Result<String> {
        load_prompt(self.filename())
    }

    /// File override if present, built-in text otherwise.
    pub fn text(&self) -> String {
        self.load().unwrap_or_else(|_| self.builtin().to_string())
    }
}

pub fn load_prompt(filename: &str) -> Result<String> {
    let path = prompts_dir().join(filename);
    std::fs::read_to_string(&path)
        .map_err(|e| Error::InvalidArgument(format!("failed to load prompt {}: {}", filename, e)))
}

pub fn prompts_dir() -> PathBuf {
    let candidates = [PathBuf::from("prompts"), PathBuf::from("../prompts")];

    for path in candidates {
        if path.exists() {
            return path;
        }
    }

    PathBuf::from("prompts")
}

/// Fill the advisor template with search context and the question.
pub fn render_advisor(template: &str, context: &str, question: &str) -> String {
    template
        .replace("{context}", context)
        .replace("{question}", question)
}
