//! Gemini advisor grounded on live search results.
//!
//! Supports:
//! - text questions with Custom Search context
//! - an attached photo sent as inline data

use std::time::Duration;

use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::search::{format_context, GoogleSearchClient};
use crate::models::{Query, RemoteAnswer, SourceLink};
use crate::prompts::{render_advisor, Prompt};
use crate::{Error, Result};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const NO_LIVE_RESULTS: &str = "No relevant information found in trusted sources.";

#[derive(Debug, Clone)]
pub struct GeminiAdvisor {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    search: Option<GoogleSearchClient>,
}

impl GeminiAdvisor {
    pub fn new<S: Into<String>>(api_key: S, model: &str) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Config("GOOGLE_API_KEY is empty".to_string()));
        }

        let http = Client::builder()
            .user_agent("khet_sahayak/0.1.0")
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Remote(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: GEMINI_API_URL.to_string(),
            model: model.to_string(),
            search: None,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Ground answers on Custom Search results.
    pub fn with_search(mut self, search: GoogleSearchClient) -> Self {
        self.search = Some(search);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Answer `query`, citing the search results used as context.
    pub async fn advise(&self, query: &Query) -> Result<RemoteAnswer> {
        let sources = self.live_sources(&query.text).await;
        let context = if sources.is_empty() {
            NO_LIVE_RESULTS.to_string()
        } else {
            format_context(&sources)
        };

        let mut prompt = render_advisor(&Prompt::Advisor.text(), &context, &query.text);
        if query.image.is_some() {
            prompt.push_str("\n\n");
            prompt.push_str(&Prompt::ImageNote.text());
        }

        let text = self.generate(&prompt, query).await?;

        Ok(RemoteAnswer {
            provider: format!("gemini:{}", self.model),
            text,
            sources,
        })
    }

    /// Search failures are tolerated; the prompt then says there are no live results.
    async fn live_sources(&self, question: &str) -> Vec<SourceLink> {
        let Some(search) = &self.search else {
            return Vec::new();
        };

        match search.search(question).await {
            Ok(sources) => sources,
            Err(e) => {
                warn!(error = %e, "live search failed, asking Gemini without context");
                Vec::new()
            }
        }
    }

    async fn generate(&self, prompt: &str, query: &Query) -> Result<String> {
        let mut parts = Vec::with_capacity(2);
        if let Some(image) = &query.image {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(&image.data),
                },
            });
        }
        parts.push(Part::Text {
            text: prompt.to_string(),
        });

        let payload = GeminiRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts,
            }],
            generation_config: Some(GenerationConfig {
                temperature: 0.4,
                max_output_tokens: 2048,
            }),
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Remote(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Remote(format!("failed to read Gemini response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Remote(format!("Gemini error {}: {}", status, text)));
        }

        let gemini_response: GeminiResponse = serde_json::from_str(&text)
            .map_err(|e| Error::MalformedResponse(format!("Gemini response: {}", e)))?;

        let answer = gemini_response
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        Part::Text { text } => Some(text.as_str()),
                        Part::InlineData { .. } => None,
                    })
                    .collect::<String>()
            })
            .unwrap_or_default();

        if answer.trim().is_empty() {
            return Err(Error::MalformedResponse(
                "empty response from Gemini".to_string(),
            ));
        }

        debug!(model = %self.model, chars = answer.len(), "Gemini answered");
        Ok(answer)
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "generationConfig")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}
