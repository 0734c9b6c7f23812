//! Shared HTTP plumbing for provider clients

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{header, Client, Response};
use std::num::NonZeroU32;
use std::time::Duration;

use super::ProviderError;

/// User-Agent sent with every provider request
pub const USER_AGENT: &str = concat!("RoomAI/", env!("CARGO_PKG_VERSION"));

/// Connection establishment limit for all providers
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest error body kept in `ProviderError::Api`
const MAX_ERROR_BODY: usize = 500;

/// Per-client request quota
pub type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Build a client with the shared user agent and the given total timeout
pub fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));

    Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .default_headers(headers)
        .build()
        .map_err(|e| ProviderError::Network(format!("Failed to build HTTP client: {}", e)))
}

/// Quota of `requests_per_minute` (at least one)
pub fn rate_limiter(requests_per_minute: u32) -> DirectRateLimiter {
    let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_minute(per_minute))
}

/// Trailing slashes removed so paths can be appended with `/`
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Turn a non-success status into `ProviderError::Api`
pub async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(MAX_ERROR_BODY).collect();
    Err(ProviderError::Api(status.as_u16(), body))
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}
