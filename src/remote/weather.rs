//! Current conditions from OpenWeatherMap.
//!
//! Weather questions ("weather in Dehradun?") are answered from live
//! observations instead of search results.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::models::{RemoteAnswer, SourceLink};
use crate::{Error, Result};

const OPENWEATHER_API_URL: &str = "https://api.openweathermap.org";
const OPENWEATHER_SITE: &str = "https://openweathermap.org";

static WEATHER_TERMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(weather|temperature|forecast|humidity|rain|rainfall|wind)\b|मौसम")
        .expect("valid weather regex")
});

/// Place name after "in", "at" or "for"; stops at punctuation.
static LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:in|at|for)\s+(\p{L}[\p{L}\p{M}\s.'-]*)").expect("valid location regex")
});

const TRAILING_WORDS: &[&str] = &["today", "tomorrow", "now", "currently", "right", "please"];

/// Location of a weather question, `None` for anything else.
pub fn weather_location(text: &str) -> Option<String> {
    if !WEATHER_TERMS.is_match(text) {
        return None;
    }

    let caps = LOCATION.captures(text)?;
    let mut words: Vec<&str> = caps[1]
        .split_whitespace()
        .map(|w| w.trim_end_matches(['.', '\'', '-']))
        .filter(|w| !w.is_empty())
        .collect();
    while words
        .last()
        .is_some_and(|w| TRAILING_WORDS.contains(&w.to_lowercase().as_str()))
    {
        words.pop();
    }

    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    cod: Option<serde_json::Value>,
    name: Option<String>,
    sys: Option<SysInfo>,
    #[serde(default)]
    weather: Vec<Condition>,
    main: Option<MainReadings>,
    wind: Option<Wind>,
}

#[derive(Debug, Deserialize)]
struct SysInfo {
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Condition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct Wind {
    speed: f64,
}

/// Current conditions at one place.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub location: String,
    pub country: Option<String>,
    pub conditions: String,
    /// Celsius
    pub temperature: f64,
    /// Percent
    pub humidity: f64,
    /// Metres per second
    pub wind_speed: f64,
}

impl WeatherReport {
    pub fn render(&self) -> String {
        let place = match &self.country {
            Some(country) => format!("{}, {}", self.location, country),
            None => self.location.clone(),
        };
        format!(
            "Current weather in {}:\n  - Conditions: {}\n  - Temperature: {}°C\n  - Humidity: {}%\n  - Wind Speed: {} m/s",
            place,
            title_case(&self.conditions),
            self.temperature,
            self.humidity,
            self.wind_speed
        )
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone)]
pub struct WeatherClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl WeatherClient {
    pub fn new<S: Into<String>>(api_key: S) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Config("OPENWEATHER_API_KEY is empty".to_string()));
        }

        let http = Client::builder()
            .user_agent("khet_sahayak/0.1.0")
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Remote(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: OPENWEATHER_API_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Metric readings for `location`.
    pub async fn current(&self, location: &str) -> Result<WeatherReport> {
        let response = self
            .http
            .get(format!("{}/data/2.5/weather", self.base_url))
            .query(&[
                ("q", location),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .await
            .map_err(|e| Error::Remote(format!("weather request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::NOT_FOUND {
            return Err(Error::Remote(format!(
                "no weather data for location '{}'",
                location
            )));
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Remote("invalid OpenWeatherMap API key".to_string()));
        }
        if !status.is_success() {
            return Err(Error::Remote(format!("OpenWeatherMap HTTP {}: {}", status, body)));
        }

        let parsed: WeatherResponse = serde_json::from_str(&body)
            .map_err(|e| Error::MalformedResponse(format!("weather response: {}", e)))?;

        // `cod` arrives as a number on success and sometimes as a string on errors
        let cod_ok = match &parsed.cod {
            None => true,
            Some(serde_json::Value::Number(n)) => n.as_i64() == Some(200),
            Some(serde_json::Value::String(s)) => s == "200",
            Some(_) => false,
        };
        if !cod_ok {
            return Err(Error::Remote(format!(
                "no weather data for location '{}'",
                location
            )));
        }

        let (Some(main), Some(condition)) = (parsed.main, parsed.weather.into_iter().next()) else {
            return Err(Error::MalformedResponse(
                "weather response lacks readings".to_string(),
            ));
        };

        let report = WeatherReport {
            location: parsed.name.unwrap_or_else(|| location.to_string()),
            country: parsed.sys.and_then(|s| s.country),
            conditions: condition.description,
            temperature: main.temp,
            humidity: main.humidity,
            wind_speed: parsed.wind.map(|w| w.speed).unwrap_or(0.0),
        };
        debug!(location = %report.location, "weather fetched");
        Ok(report)
    }

    /// Answer a weather question; fails when no location can be read from it.
    pub async fn answer(&self, text: &str) -> Result<RemoteAnswer> {
        let location = weather_location(text).ok_or_else(|| {
            Error::InvalidArgument("weather question names no location".to_string())
        })?;
        let report = self.current(&location).await?;

        Ok(RemoteAnswer {
            provider: "weather".to_string(),
            text: report.render(),
            sources: vec![SourceLink {
                title: "OpenWeatherMap".to_string(),
                link: OPENWEATHER_SITE.to_string(),
                snippet: report.conditions.clone(),
            }],
        })
    }
}
