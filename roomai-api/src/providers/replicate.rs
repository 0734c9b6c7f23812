//! Replicate predictions API client
//!
//! A prediction is created either for an official model
//! (`POST /v1/models/{owner}/{name}/predictions`) or for a pinned version
//! (`POST /v1/predictions`), then polled at `GET /v1/predictions/{id}` until it
//! reaches a terminal status.

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::http::{self, DirectRateLimiter};
use super::ProviderError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_MAX_POLLS: u32 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }
}

/// First image URL in a prediction output (a string or an array of strings)
pub fn first_output_url(output: &Value) -> Option<String> {
    match output {
        Value::String(url) if !url.is_empty() => Some(url.clone()),
        Value::Array(items) => items.iter().find_map(first_output_url),
        _ => None,
    }
}

pub struct ReplicateClient {
    client: Client,
    base_url: String,
    api_token: String,
    rate_limiter: DirectRateLimiter,
    poll_interval: Duration,
    max_polls: u32,
}

impl ReplicateClient {
    pub fn new(
        base_url: &str,
        api_token: &str,
        requests_per_minute: u32,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http::build_client(DEFAULT_TIMEOUT)?,
            base_url: http::normalize_base_url(base_url),
            api_token: api_token.to_string(),
            rate_limiter: http::rate_limiter(requests_per_minute),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        })
    }

    /// Override polling cadence (tests use short intervals)
    pub fn with_polling(mut self, poll_interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = poll_interval;
        self.max_polls = max_polls;
        self
    }

    /// Run an official model (`owner/name`) and return its output
    pub async fn run_model(&self, model: &str, input: Value) -> Result<Value, ProviderError> {
        let url = format!("{}/v1/models/{}/predictions", self.base_url, model);
        let prediction = self.create(&url, json!({ "input": input })).await?;
        info!(model, prediction_id = %prediction.id, "Replicate prediction started");
        self.wait_for_output(prediction).await
    }

    /// Run a pinned model version and return its output
    pub async fn run_version(&self, version: &str, input: Value) -> Result<Value, ProviderError> {
        let url = format!("{}/v1/predictions", self.base_url);
        let prediction = self
            .create(&url, json!({ "version": version, "input": input }))
            .await?;
        info!(prediction_id = %prediction.id, "Replicate prediction started");
        self.wait_for_output(prediction).await
    }

    async fn create(&self, url: &str, body: Value) -> Result<Prediction, ProviderError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?;
        let response = http::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("Replicate prediction: {}", e)))
    }

    async fn fetch(&self, id: &str) -> Result<Prediction, ProviderError> {
        let response = self
            .client
            .get(format!("{}/v1/predictions/{}", self.base_url, id))
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        let response = http::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("Replicate prediction: {}", e)))
    }

    async fn wait_for_output(&self, mut prediction: Prediction) -> Result<Value, ProviderError> {
        let mut polls = 0;
        while !prediction.is_terminal() {
            if polls >= self.max_polls {
                return Err(ProviderError::Timeout);
            }
            tokio::time::sleep(self.poll_interval).await;
            polls += 1;
            prediction = self.fetch(&prediction.id).await?;
            debug!(
                prediction_id = %prediction.id,
                status = %prediction.status,
                polls,
                "Polled prediction"
            );
        }

        match prediction.status.as_str() {
            "succeeded" => prediction.output.ok_or_else(|| {
                ProviderError::Parse("Prediction succeeded without output".to_string())
            }),
            status => Err(ProviderError::Api(
                422,
                format!(
                    "Prediction {} {}: {}",
                    prediction.id,
                    status,
                    prediction
                        .error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no error message".to_string())
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_support::serve;
    use axum::{extract::Path, routing::get, routing::post, Json, Router};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(client: ReplicateClient) -> ReplicateClient {
        client.with_polling(Duration::from_millis(5), 5)
    }

    #[test]
    fn output_url_from_string_or_array() {
        assert_eq!(
            first_output_url(&json!("https://x/1.webp")).as_deref(),
            Some("https://x/1.webp")
        );
        assert_eq!(
            first_output_url(&json!(["https://x/2.png", "https://x/3.png"])).as_deref(),
            Some("https://x/2.png")
        );
        assert!(first_output_url(&json!(null)).is_none());
        assert!(first_output_url(&json!([])).is_none());
    }

    #[tokio::test]
    async fn model_prediction_completes_synchronously() {
        let router = Router::new().route(
            "/v1/models/black-forest-labs/flux-schnell/predictions",
            post(|Json(body): Json<Value>| async move {
                assert!(body["input"]["prompt"].is_string());
                Json(json!({"id": "p1", "status": "succeeded", "output": ["https://x/out.webp"]}))
            }),
        );
        let base = serve(router).await;
        let client = fast(ReplicateClient::new(&base, "r8", 600).unwrap());

        let output = client
            .run_model("black-forest-labs/flux-schnell", json!({"prompt": "room"}))
            .await
            .unwrap();
        assert_eq!(first_output_url(&output).as_deref(), Some("https://x/out.webp"));
    }

    #[tokio::test]
    async fn version_prediction_is_polled_until_done() {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = polls.clone();
        let router = Router::new()
            .route(
                "/v1/predictions",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["version"], "abc");
                    Json(json!({"id": "p2", "status": "starting"}))
                }),
            )
            .route(
                "/v1/predictions/:id",
                get(move |Path(id): Path<String>| {
                    let counter = counter.clone();
                    async move {
                        assert_eq!(id, "p2");
                        let n = counter.fetch_add(1, Ordering::SeqCst);
                        if n < 2 {
                            Json(json!({"id": "p2", "status": "processing"}))
                        } else {
                            Json(json!({
                                "id": "p2",
                                "status": "succeeded",
                                "output": ["https://x/sdxl.png"]
                            }))
                        }
                    }
                }),
            );
        let base = serve(router).await;
        let client = fast(ReplicateClient::new(&base, "r8", 600).unwrap());

        let output = client.run_version("abc", json!({"prompt": "room"})).await.unwrap();
        assert_eq!(first_output_url(&output).as_deref(), Some("https://x/sdxl.png"));
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_prediction_is_an_error() {
        let router = Router::new().route(
            "/v1/predictions",
            post(|| async { Json(json!({"id": "p3", "status": "failed", "error": "NSFW"})) }),
        );
        let base = serve(router).await;
        let client = fast(ReplicateClient::new(&base, "r8", 600).unwrap());

        let err = client.run_version("abc", json!({})).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api(_, ref msg) if msg.contains("NSFW")));
    }

    #[tokio::test]
    async fn polling_gives_up() {
        let router = Router::new()
            .route(
                "/v1/predictions",
                post(|| async { Json(json!({"id": "p4", "status": "starting"})) }),
            )
            .route(
                "/v1/predictions/:id",
                get(|| async { Json(json!({"id": "p4", "status": "processing"})) }),
            );
        let base = serve(router).await;
        let client = fast(ReplicateClient::new(&base, "r8", 600).unwrap());

        let err = client.run_version("abc", json!({})).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout));
    }
}
