//! HTTP fetch abstraction
//!
//! Sources and the backsearch validator fetch pages through the `WebFetcher`
//! trait so tests can substitute canned responses. The production
//! implementation wraps a shared `reqwest::Client`.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// User agent presented to external sites.
const USER_AGENT: &str = "Mozilla/5.0 (compatible; TeilebotResolver/0.1)";

/// Default per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetch error
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("HTTP status {0}")]
    Status(u16),
}

/// A fetched page.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub body: String,
}

/// Minimal GET-only fetch interface.
#[async_trait]
pub trait WebFetcher: Send + Sync {
    /// Fetch a URL, returning the body even on non-2xx statuses
    /// (callers that care about the status check `FetchResponse::status`).
    ///
    /// # Errors
    /// Returns `FetchError::Network` when the request cannot complete.
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

/// Production fetcher backed by `reqwest`.
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebFetcher for ReqwestFetcher {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(FetchResponse { status, body })
    }
}
