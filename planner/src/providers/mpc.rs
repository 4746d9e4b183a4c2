//! HTTP client for the Minor Planet Center confirmation services.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};

use super::error::{ProviderError, ProviderResult};
use super::parsers::{parse_ephemeris, parse_feed};
use super::types::{EphemerisRequest, EphemerisSample, FeedEntry};
use super::{CandidateFeed, EphemerisProvider, UncertaintyProvider};
use crate::config::FeedSettings;

/// One shared client for the feed, the uncertainty maps and the ephemerides.
#[derive(Debug, Clone)]
pub struct MpcClient {
    client: Client,
    neocp_url: String,
    uncertainty_url: String,
    ephemeris_url: String,
}

impl MpcClient {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(settings: &FeedSettings, timeout: Duration) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("neo-planner/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            neocp_url: settings.neocp_url.trim_end_matches('/').to_owned(),
            uncertainty_url: settings.uncertainty_url.trim_end_matches('/').to_owned(),
            ephemeris_url: settings.ephemeris_url.trim_end_matches('/').to_owned(),
        })
    }

    async fn get_text(&self, url: Url) -> ProviderResult<String> {
        log::debug!("GET {}", url);
        let response = self.client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "{} answered {}",
                url.path(),
                response.status()
            )));
        }

        Ok(response.text().await?)
    }
}

fn build_url(base: &str, params: &[(&str, String)]) -> ProviderResult<Url> {
    let parsed = if params.is_empty() {
        Url::parse(base)
    } else {
        Url::parse_with_params(base, params)
    };
    parsed.map_err(|e| ProviderError::Unavailable(format!("invalid URL '{}': {}", base, e)))
}

/// Query string of the confirmation-ephemeris form.
pub fn ephemeris_params(request: &EphemerisRequest, start_offset_hours: i64) -> Vec<(&'static str, String)> {
    vec![
        ("mb", "-30".to_string()),
        ("mf", "30".to_string()),
        ("dl", "-90".to_string()),
        ("du", "+90".to_string()),
        ("nl", "0".to_string()),
        ("nu", "100".to_string()),
        ("sort", "d".to_string()),
        ("W", "j".to_string()),
        ("obj", request.designation.clone()),
        ("Parallax", "1".to_string()),
        ("obscode", request.obs_code.clone()),
        ("int", request.cadence.mpc_code().to_string()),
        ("start", start_offset_hours.max(0).to_string()),
        ("raty", "a".to_string()),
        ("mot", "m".to_string()),
        ("dmot", "p".to_string()),
        ("out", "f".to_string()),
        ("sun", "x".to_string()),
        ("oalt", format!("{}", request.altitude_limit.round() as i64)),
    ]
}

#[async_trait]
impl CandidateFeed for MpcClient {
    async fn list_candidates(&self) -> ProviderResult<Vec<FeedEntry>> {
        let url = build_url(&self.neocp_url, &[])?;
        let body = self.get_text(url).await?;
        let entries = parse_feed(&body, Utc::now())?;
        log::info!("Confirmation list returned {} candidates", entries.len());
        Ok(entries)
    }
}

#[async_trait]
impl UncertaintyProvider for MpcClient {
    async fn uncertainty(&self, designation: &str) -> ProviderResult<String> {
        let url = build_url(
            &self.uncertainty_url,
            &[
                ("Obj", designation.to_string()),
                ("JD", String::new()),
                ("Form", "Y".to_string()),
                ("Type", "p".to_string()),
            ],
        )?;
        self.get_text(url).await
    }
}

#[async_trait]
impl EphemerisProvider for MpcClient {
    async fn ephemeris(&self, request: &EphemerisRequest) -> ProviderResult<Vec<EphemerisSample>> {
        // The form only takes a whole-hour offset from the current time.
        let offset = (request.start - Utc::now()).num_hours();
        let url = build_url(&self.ephemeris_url, &ephemeris_params(request, offset))?;
        let body = self.get_text(url).await?;
        let samples = parse_ephemeris(&body)?;
        Ok(samples
            .into_iter()
            .filter(|s| s.time >= request.start - request.cadence.step())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::EphemCadence;

    #[test]
    fn test_ephemeris_params() {
        let request = EphemerisRequest {
            designation: "P21abcd".to_string(),
            start: Utc::now(),
            cadence: EphemCadence::OneMinute,
            altitude_limit: 0.0,
            obs_code: "654".to_string(),
        };
        let params = ephemeris_params(&request, -3);
        let get = |k: &str| params.iter().find(|(key, _)| *key == k).map(|(_, v)| v.clone());
        assert_eq!(get("obj").as_deref(), Some("P21abcd"));
        assert_eq!(get("int").as_deref(), Some("3"));
        assert_eq!(get("start").as_deref(), Some("0"));
        assert_eq!(get("obscode").as_deref(), Some("654"));
    }

    #[test]
    fn test_client_trims_base_urls() {
        let settings = FeedSettings {
            neocp_url: "https://example.org/neocp.json/".to_string(),
            ..FeedSettings::default()
        };
        let client = MpcClient::new(&settings, Duration::from_secs(5)).unwrap();
        assert_eq!(client.neocp_url, "https://example.org/neocp.json");
    }
}
