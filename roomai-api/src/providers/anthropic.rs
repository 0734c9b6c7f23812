//! Anthropic Messages API client
//!
//! Endpoint: `POST {base}/v1/messages`, authenticated with `x-api-key`.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::http::{self, DirectRateLimiter};
use super::{ImageInput, ProviderError};

const API_VERSION: &str = "2023-06-01";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Content block of a user message
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub media_type: String,
    pub data: String,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn image(image: &ImageInput) -> Self {
        ContentBlock::Image {
            source: ImageSource {
                kind: "base64",
                media_type: image.media_type.clone(),
                data: image.to_base64(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [UserMessage; 1],
}

#[derive(Debug, Serialize)]
struct UserMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Client for Claude models
pub struct AnthropicClient {
    client: Client,
    base_url: String,
    api_key: String,
    rate_limiter: DirectRateLimiter,
}

impl AnthropicClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        requests_per_minute: u32,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http::build_client(DEFAULT_TIMEOUT)?,
            base_url: http::normalize_base_url(base_url),
            api_key: api_key.to_string(),
            rate_limiter: http::rate_limiter(requests_per_minute),
        })
    }

    /// Send one user message and return the concatenated text reply
    pub async fn message(
        &self,
        model: &str,
        max_tokens: u32,
        content: Vec<ContentBlock>,
    ) -> Result<String, ProviderError> {
        self.rate_limiter.until_ready().await;

        let request = MessagesRequest {
            model,
            max_tokens,
            messages: [UserMessage {
                role: "user",
                content,
            }],
        };

        debug!(model, "Calling Anthropic messages API");

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;
        let response = http::check_status(response).await?;

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("Anthropic response: {}", e)))?;

        let text: String = body
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        if text.trim().is_empty() {
            return Err(ProviderError::Parse(
                "Anthropic response contained no text".to_string(),
            ));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_support::serve;
    use axum::{http::HeaderMap, routing::post, Json, Router};
    use serde_json::{json, Value};

    #[tokio::test]
    async fn sends_image_and_text_blocks() {
        let router = Router::new().route(
            "/v1/messages",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["x-api-key"], "test-key");
                assert_eq!(headers["anthropic-version"], API_VERSION);
                assert_eq!(body["messages"][0]["content"][0]["type"], "image");
                assert_eq!(
                    body["messages"][0]["content"][0]["source"]["media_type"],
                    "image/png"
                );
                assert_eq!(body["messages"][0]["content"][1]["text"], "describe");
                Json(json!({"content": [{"type": "text", "text": "{\"ok\": true}"}]}))
            }),
        );
        let base = serve(router).await;
        let client = AnthropicClient::new(&base, "test-key", 600).unwrap();

        let image = ImageInput::new(vec![1, 2, 3], "image/png");
        let text = client
            .message(
                "claude-test",
                100,
                vec![ContentBlock::image(&image), ContentBlock::text("describe")],
            )
            .await
            .unwrap();
        assert_eq!(text, "{\"ok\": true}");
    }

    #[tokio::test]
    async fn error_status_maps_to_api_error() {
        let router = Router::new().route(
            "/v1/messages",
            post(|| async {
                (
                    axum::http::StatusCode::TOO_MANY_REQUESTS,
                    "rate limited",
                )
            }),
        );
        let base = serve(router).await;
        let client = AnthropicClient::new(&base, "k", 600).unwrap();

        let err = client
            .message("m", 10, vec![ContentBlock::text("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Api(429, ref body) if body == "rate limited"));
    }
}
