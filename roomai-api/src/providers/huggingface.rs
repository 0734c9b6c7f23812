//! HuggingFace inference client for SAM image segmentation
//!
//! The image is posted as raw bytes; the endpoint answers with a list of
//! `{score, label, mask}` where `mask` is a base64 PNG.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::http::{self, DirectRateLimiter};
use super::ProviderError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// One segment returned by the SAM endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SamSegment {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub label: String,
    /// Base64 encoded PNG mask
    #[serde(default)]
    pub mask: String,
}

pub struct HuggingFaceClient {
    client: Client,
    api_token: String,
    rate_limiter: DirectRateLimiter,
}

impl HuggingFaceClient {
    pub fn new(api_token: &str, requests_per_minute: u32) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http::build_client(DEFAULT_TIMEOUT)?,
            api_token: api_token.to_string(),
            rate_limiter: http::rate_limiter(requests_per_minute),
        })
    }

    /// Run image segmentation at `endpoint`
    pub async fn segment(
        &self,
        endpoint: &str,
        image: &[u8],
    ) -> Result<Vec<SamSegment>, ProviderError> {
        self.rate_limiter.until_ready().await;
        debug!(endpoint, bytes = image.len(), "Calling SAM segmentation");

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&self.api_token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await?;
        let response = http::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("SAM response: {}", e)))
    }
}
