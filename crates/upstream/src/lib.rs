//! Client for the upstream game-data ranking API.
//!
//! Read-only: two GETs per tick. The client is shared across regions since
//! its state is immutable after construction.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use tracing::debug;

use tracker_core::{BorderResponse, Error, RegionTag, Result, SekaiApiConfig, TopResponse};

/// Total per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Shared-secret header sent when an API token is configured.
const TOKEN_HEADER: &str = "X-Haruki-Sekai-Token";

/// SHA-256 of a response body, hex-encoded.
pub fn body_digest(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Seam between the tracker and the upstream endpoints, so tests can script
/// responses without a network.
#[async_trait]
pub trait RankingApi: Send + Sync {
    /// Fetch the top-N ranking payload.
    async fn get_top(&self, event_id: i32, region: RegionTag) -> Result<TopResponse>;

    /// Fetch the border-band payload. Returns the SHA-256 hex digest of the
    /// raw body alongside the decoded response; the digest feeds the
    /// response-hash cache.
    async fn get_border(&self, event_id: i32, region: RegionTag)
        -> Result<(String, BorderResponse)>;
}

/// HTTP implementation of [`RankingApi`].
pub struct SekaiApiClient {
    endpoint: String,
    client: reqwest::Client,
}

impl SekaiApiClient {
    pub fn new(cfg: &SekaiApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if !cfg.api_token.is_empty() {
            let value = HeaderValue::from_str(&cfg.api_token)
                .map_err(|e| Error::config_invalid(format!("invalid api token: {e}")))?;
            headers.insert(TOKEN_HEADER, value);
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(format!(
                "Haruki-Event-Tracker/{}",
                env!("CARGO_PKG_VERSION")
            ))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::config_invalid(format!("failed to build http client: {e}")))?;
        Ok(Self {
            endpoint: cfg.api_endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, region: RegionTag, event_id: i32, leaf: &str) -> String {
        format!("{}/{}/event/{}/{}", self.endpoint, region, event_id, leaf)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::upstream_unreachable(format!("GET {url}: {e}")))?;
        if response.status() != StatusCode::OK {
            return Err(Error::upstream_unreachable(format!(
                "GET {url}: unexpected status {}",
                response.status()
            )));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::upstream_unreachable(format!("GET {url}: {e}")))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl RankingApi for SekaiApiClient {
    async fn get_top(&self, event_id: i32, region: RegionTag) -> Result<TopResponse> {
        let url = self.url(region, event_id, "ranking-top100");
        let body = self.fetch(&url).await?;
        debug!(url = %url, bytes = body.len(), "fetched top rankings");
        serde_json::from_slice(&body)
            .map_err(|e| Error::upstream_malformed(format!("GET {url}: {e}")))
    }

    async fn get_border(
        &self,
        event_id: i32,
        region: RegionTag,
    ) -> Result<(String, BorderResponse)> {
        let url = self.url(region, event_id, "ranking-border");
        let body = self.fetch(&url).await?;
        let digest = body_digest(&body);
        debug!(url = %url, bytes = body.len(), digest = %digest, "fetched border rankings");
        let border = serde_json::from_slice(&body)
            .map_err(|e| Error::upstream_malformed(format!("GET {url}: {e}")))?;
        Ok((digest, border))
    }
}
