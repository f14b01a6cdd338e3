//! Google Custom Search JSON API client.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::models::SourceLink;
use crate::{Error, Result};

const CUSTOM_SEARCH_URL: &str = "https://www.googleapis.com";

#[derive(Debug, Clone)]
pub struct GoogleSearchClient {
    http: Client,
    api_key: String,
    cse_id: String,
    base_url: String,
    num_results: usize,
}

impl GoogleSearchClient {
    pub fn new<S: Into<String>>(api_key: S, cse_id: S, num_results: usize) -> Result<Self> {
        let api_key = api_key.into();
        let cse_id = cse_id.into();
        if api_key.trim().is_empty() {
            return Err(Error::Config("GOOGLE_API_KEY is empty".to_string()));
        }
        if cse_id.trim().is_empty() {
            return Err(Error::Config("GOOGLE_CSE_ID is empty".to_string()));
        }

        let http = Client::builder()
            .user_agent("khet_sahayak/0.1.0")
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Remote(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            cse_id,
            base_url: CUSTOM_SEARCH_URL.to_string(),
            num_results: num_results.clamp(1, 10),
        })
    }

    /// Point the client at another host (used with mock servers).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Top results for `query`, snippets cleaned for prompting.
    pub async fn search(&self, query: &str) -> Result<Vec<SourceLink>> {
        let num = self.num_results.to_string();
        let response = self
            .http
            .get(format!("{}/customsearch/v1", self.base_url))
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cse_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Remote(format!("search request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Remote(format!("failed to read search response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Remote(format!("search error {}: {}", status, text)));
        }

        let parsed: SearchResponse = serde_json::from_str(&text)
            .map_err(|e| Error::MalformedResponse(format!("search response: {}", e)))?;

        let sources: Vec<SourceLink> = parsed
            .items
            .into_iter()
            .map(|item| SourceLink {
                title: item.title.unwrap_or_else(|| "No Title".to_string()),
                link: item.link.unwrap_or_else(|| "No Link".to_string()),
                snippet: clean_snippet(
                    item.snippet.as_deref().unwrap_or("No snippet available."),
                ),
            })
            .collect();

        debug!(query, results = sources.len(), "custom search finished");
        Ok(sources)
    }
}

/// Collapse newlines and drop the `...` truncation markers.
pub fn clean_snippet(snippet: &str) -> String {
    snippet
        .replace('\n', " ")
        .replace("...", "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render sources as a prompt context block.
pub fn format_context(sources: &[SourceLink]) -> String {
    sources
        .iter()
        .map(|s| {
            format!(
                "Source Title: {}\nSource Link: {}\nContent: {}",
                s.title, s.link, s.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> GoogleSearchClient {
        GoogleSearchClient::new("key", "cse", 3)
            .unwrap()
            .with_base_url(&server.base_url())
    }

    #[tokio::test]
    async fn parses_items_into_sources() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/customsearch/v1")
                .query_param("key", "key")
                .query_param("cx", "cse")
                .query_param("q", "wheat rust")
                .query_param("num", "3");
            then.status(200).json_body(json!({
                "items": [
                    {"title": "Rust of wheat", "link": "https://icar.example/rust", "snippet": "Orange\npustules ..."},
                    {"link": "https://kvk.example"}
                ]
            }));
        });

        let sources = client(&server).search("wheat rust").await.unwrap();

        mock.assert_calls(1);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title, "Rust of wheat");
        assert_eq!(sources[0].snippet, "Orange pustules");
        assert_eq!(sources[1].title, "No Title");
        assert_eq!(sources[1].snippet, "No snippet available.");
    }

    #[tokio::test]
    async fn missing_items_yield_empty_list() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/customsearch/v1");
            then.status(200).json_body(json!({ "kind": "customsearch#search" }));
        });

        assert!(client(&server).search("q").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/customsearch/v1");
            then.status(200).body("<html>captcha</html>");
        });

        let err = client(&server).search("q").await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn http_error_is_remote_failure() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/customsearch/v1");
            then.status(403).body("quota exceeded");
        });

        let err = client(&server).search("q").await.unwrap_err();
        assert!(matches!(err, Error::Remote(_)));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn rejects_blank_credentials() {
        assert!(GoogleSearchClient::new("", "cse", 3).is_err());
        assert!(GoogleSearchClient::new("key", "  ", 3).is_err());
    }

    #[test]
    fn formats_context_blocks() {
        let context = format_context(&[
            SourceLink {
                title: "A".into(),
                link: "https://a".into(),
                snippet: "first".into(),
            },
            SourceLink {
                title: "B".into(),
                link: "https://b".into(),
                snippet: "second".into(),
            },
        ]);

        assert!(context.starts_with("Source Title: A\nSource Link: https://a\nContent: first"));
        assert!(context.contains("\n\n---\n\nSource Title: B"));
    }
}
