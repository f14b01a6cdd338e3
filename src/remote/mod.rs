//! Remote information sources used on the online path.

pub mod gemini;
pub mod search;
pub mod weather;

pub use gemini::GeminiAdvisor;
pub use search::{clean_snippet, format_context, GoogleSearchClient};
pub use weather::{weather_location, WeatherClient, WeatherReport};

use tracing::info;

use crate::config::{Config, RemoteProviderKind};
use crate::models::{Query, RemoteAnswer};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub enum RemoteSource {
    WebSearch(GoogleSearchClient),
    Gemini(GeminiAdvisor),
    /// Current conditions for weather questions
    Weather(WeatherClient),
}

impl RemoteSource {
    /// `Ok(None)` when no provider is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let source = match config.remote_provider {
            RemoteProviderKind::None => return Ok(None),
            RemoteProviderKind::Search => RemoteSource::WebSearch(GoogleSearchClient::new(
                config.google_api_key.as_str(),
                config.google_cse_id.as_str(),
                config.search_results,
            )?),
            RemoteProviderKind::Gemini => {
                let mut advisor =
                    GeminiAdvisor::new(config.google_api_key.as_str(), &config.gemini_model)?;
                if !config.google_cse_id.trim().is_empty() {
                    advisor = advisor.with_search(GoogleSearchClient::new(
                        config.google_api_key.as_str(),
                        config.google_cse_id.as_str(),
                        config.search_results,
                    )?);
                }
                RemoteSource::Gemini(advisor)
            }
        };

        info!(remote = source.name(), "remote source ready");
        Ok(Some(source))
    }

    /// Weather source when an OpenWeatherMap key is configured.
    pub fn weather_from_config(config: &Config) -> Result<Option<Self>> {
        if config.openweather_api_key.trim().is_empty() {
            return Ok(None);
        }
        let source = RemoteSource::Weather(WeatherClient::new(
            config.openweather_api_key.as_str(),
        )?);
        info!(remote = source.name(), "remote source ready");
        Ok(Some(source))
    }

    pub fn name(&self) -> &'static str {
        match self {
            RemoteSource::WebSearch(_) => "search",
            RemoteSource::Gemini(_) => "gemini",
            RemoteSource::Weather(_) => "weather",
        }
    }

    /// Empty answers are reported as malformed so callers fall back.
    pub async fn fetch(&self, query: &Query) -> Result<RemoteAnswer> {
        let answer = match self {
            RemoteSource::WebSearch(client) => {
                let sources = client.search(&query.text).await?;
                RemoteAnswer {
                    provider: "search".to_string(),
                    text: format_context(&sources),
                    sources,
                }
            }
            RemoteSource::Gemini(advisor) => advisor.advise(query).await?,
            RemoteSource::Weather(client) => client.answer(&query.text).await?,
        };

        if answer.text.trim().is_empty() {
            return Err(Error::MalformedResponse(format!(
                "{} returned no results",
                self.name()
            )));
        }
        Ok(answer)
    }
}
