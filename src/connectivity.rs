//! Network reachability checks.
//!
//! A TCP connect to a public resolver is tried first; if that fails an HTTP
//! GET to a probe URL decides. Anything ambiguous counts as offline.

use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::Config;
use crate::metrics;
use crate::models::Connectivity;

/// Default API host checked by [`ConnectivityProbe::check_endpoint`] callers.
pub const GEMINI_API_HOST: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone)]
pub struct ConnectivityProbe {
    tcp_addr: Option<String>,
    http_url: Option<String>,
    timeout: Duration,
    http: Client,
}

impl ConnectivityProbe {
    pub fn new(tcp_addr: Option<String>, http_url: Option<String>, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("khet_sahayak-probe/1.0")
            .build()
            .unwrap_or_default();

        Self {
            tcp_addr,
            http_url,
            timeout,
            http,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.probe_addr.clone(),
            config.probe_url.clone(),
            config.probe_timeout,
        )
    }

    /// Probe that never touches the network; always offline.
    pub fn disabled() -> Self {
        Self::new(None, None, Duration::from_millis(1))
    }

    pub async fn detect(&self) -> Connectivity {
        let start = Instant::now();

        let state = if self.tcp_reachable().await || self.http_ok().await {
            Connectivity::Online
        } else {
            Connectivity::Offline
        };

        metrics::record_probe(state, start.elapsed().as_secs_f64());
        debug!(state = state.as_str(), elapsed_ms = start.elapsed().as_millis() as u64, "connectivity probe");
        state
    }

    async fn tcp_reachable(&self) -> bool {
        let Some(addr) = self.tcp_addr.as_deref() else {
            return false;
        };

        match tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(addr, error = %e, "TCP probe failed");
                false
            }
            Err(_) => {
                debug!(addr, "TCP probe timed out");
                false
            }
        }
    }

    async fn http_ok(&self) -> bool {
        let Some(url) = self.http_url.as_deref() else {
            return false;
        };

        matches!(self.status_of(url).await, Some(StatusCode::OK))
    }

    /// Whether an API host answers at all; 401/403 still mean reachable.
    pub async fn check_endpoint(&self, url: &str) -> bool {
        matches!(
            self.status_of(url).await,
            Some(StatusCode::OK | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
        )
    }

    async fn status_of(&self, url: &str) -> Option<StatusCode> {
        match tokio::time::timeout(self.timeout, self.http.get(url).send()).await {
            Ok(Ok(response)) => Some(response.status()),
            Ok(Err(e)) => {
                debug!(url, error = %e, "HTTP probe failed");
                None
            }
            Err(_) => {
                debug!(url, "HTTP probe timed out");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use tokio::net::TcpListener;

    const SHORT: Duration = Duration::from_millis(500);

    /// An address on localhost with nothing listening.
    async fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        addr
    }

    #[tokio::test]
    async fn reachable_tcp_target_is_online() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let probe = ConnectivityProbe::new(Some(addr), None, SHORT);
        assert_eq!(probe.detect().await, Connectivity::Online);
    }

    #[tokio::test]
    async fn closed_port_without_http_is_offline() {
        let probe = ConnectivityProbe::new(Some(closed_port().await), None, SHORT);
        assert_eq!(probe.detect().await, Connectivity::Offline);
    }

    #[tokio::test]
    async fn http_fallback_requires_200() {
        let ok = MockServer::start_async().await;
        ok.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200);
        });
        let broken = MockServer::start_async().await;
        broken.mock(|when, then| {
            when.method(GET).path("/");
            then.status(500);
        });

        let tcp = closed_port().await;
        let online = ConnectivityProbe::new(Some(tcp.clone()), Some(ok.url("/")), SHORT);
        let offline = ConnectivityProbe::new(Some(tcp), Some(broken.url("/")), SHORT);

        assert_eq!(online.detect().await, Connectivity::Online);
        assert_eq!(offline.detect().await, Connectivity::Offline);
    }

    #[tokio::test]
    async fn slow_http_probe_counts_as_offline() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).delay(Duration::from_millis(800));
        });

        let probe = ConnectivityProbe::new(None, Some(server.url("/")), Duration::from_millis(100));
        assert_eq!(probe.detect().await, Connectivity::Offline);
    }

    #[tokio::test]
    async fn disabled_probe_is_offline() {
        assert_eq!(ConnectivityProbe::disabled().detect().await, Connectivity::Offline);
    }

    #[tokio::test]
    async fn endpoint_check_accepts_auth_errors() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/unauthorized");
            then.status(401);
        });
        server.mock(|when, then| {
            when.method(GET).path("/forbidden");
            then.status(403);
        });
        server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        });

        let probe = ConnectivityProbe::new(None, None, SHORT);
        assert!(probe.check_endpoint(&server.url("/unauthorized")).await);
        assert!(probe.check_endpoint(&server.url("/forbidden")).await);
        assert!(!probe.check_endpoint(&server.url("/missing")).await);
    }
}
