//! `probe` command: report connectivity, remote API reachability and
//! whether the query encoder can be used.

use anyhow::Result;

use crate::config::Config;
use crate::connectivity::{ConnectivityProbe, GEMINI_API_HOST};
use crate::embedding::EmbedBackend;
use crate::models::Connectivity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub connectivity: Connectivity,
    /// `None` when offline (not checked)
    pub api_reachable: Option<bool>,
    pub encoder: String,
    pub encoder_available: bool,
}

impl ProbeReport {
    pub fn render(&self) -> String {
        let mut out = format!("Connectivity: {}", self.connectivity.as_str());
        match self.api_reachable {
            Some(true) => out.push_str("\nGemini API: reachable"),
            Some(false) => out.push_str("\nGemini API: unreachable"),
            None => {}
        }
        out.push_str(&format!(
            "\nEncoder {}: {}",
            self.encoder,
            if self.encoder_available { "available" } else { "unavailable" }
        ));
        out
    }
}

pub async fn run(config: &Config) -> Result<ProbeReport> {
    let probe = ConnectivityProbe::from_config(config);
    let embedder = EmbedBackend::from_config(config)?;
    run_with(&probe, GEMINI_API_HOST, &embedder).await
}

pub async fn run_with(
    probe: &ConnectivityProbe,
    api_url: &str,
    embedder: &EmbedBackend,
) -> Result<ProbeReport> {
    let connectivity = probe.detect().await;
    let api_reachable = match connectivity {
        Connectivity::Online => Some(probe.check_endpoint(api_url).await),
        Connectivity::Offline => None,
    };

    Ok(ProbeReport {
        connectivity,
        api_reachable,
        encoder: embedder.id(),
        encoder_available: embedder.is_available().await,
    })
}
