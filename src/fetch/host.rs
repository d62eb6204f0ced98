//! Transport capability over the remote asset host.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = "Mozilla/5.0 (asset-harvester/0.1)";

/// Errors at the transport layer, before any payload validation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

/// A fetched response: HTTP status plus the full payload bytes.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub status: u16,
    pub bytes: Vec<u8>,
}

/// Capability trait over the remote asset host.
///
/// Production uses [`HttpBundleHost`]; tests script the responses.
#[async_trait]
pub trait BundleHost: Send + Sync {
    /// Probe the remote payload size without transferring it.
    ///
    /// Returns `None` on any failure or a missing/non-numeric length header.
    async fn probe_content_length(&self, url: &str) -> Option<u64>;

    /// Fetch the full payload for a URL.
    async fn get(&self, url: &str) -> Result<FetchedBody, TransportError>;
}

/// reqwest-backed host with a per-attempt timeout.
pub struct HttpBundleHost {
    client: reqwest::Client,
}

impl HttpBundleHost {
    pub fn new(timeout_sec: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

#[async_trait]
impl BundleHost for HttpBundleHost {
    async fn probe_content_length(&self, url: &str) -> Option<u64> {
        let response = self.client.head(url).send().await.ok()?;
        if response.status().as_u16() >= 400 {
            return None;
        }
        response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)?
            .to_str()
            .ok()?
            .parse()
            .ok()
    }

    async fn get(&self, url: &str) -> Result<FetchedBody, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        Ok(FetchedBody {
            status,
            bytes: bytes.to_vec(),
        })
    }
}
