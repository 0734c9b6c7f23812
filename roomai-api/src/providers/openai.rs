//! OpenAI API client (chat completions with images, DALL-E image generation)

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::http::{self, DirectRateLimiter};
use super::{ImageInput, ProviderError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    #[serde(default)]
    url: Option<String>,
}

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    rate_limiter: DirectRateLimiter,
}

impl OpenAiClient {
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

    /// Ask a vision-capable chat model about an image
    pub async fn chat_with_image(
        &self,
        model: &str,
        prompt: &str,
        image: &ImageInput,
        max_tokens: u32,
    ) -> Result<String, ProviderError> {
        self.rate_limiter.until_ready().await;
        debug!(model, "Calling OpenAI chat completions");

        let request = json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": prompt},
                    {
                        "type": "image_url",
                        "image_url": {"url": image.to_data_url(), "detail": "high"}
                    },
                ],
            }],
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let response = http::check_status(response).await?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("OpenAI chat response: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| ProviderError::Parse("OpenAI response contained no text".to_string()))
    }

    /// Generate one image and return its URL
    pub async fn generate_image(
        &self,
        model: &str,
        prompt: &str,
        size: &str,
        quality: &str,
    ) -> Result<String, ProviderError> {
        self.rate_limiter.until_ready().await;
        debug!(model, size, "Calling OpenAI image generation");

        let response = self
            .client
            .post(format!("{}/v1/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": model,
                "prompt": prompt,
                "size": size,
                "quality": quality,
                "n": 1,
            }))
            .send()
            .await?;
        let response = http::check_status(response).await?;

        let body: ImagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("OpenAI images response: {}", e)))?;

        body.data
            .into_iter()
            .find_map(|image| image.url)
            .ok_or_else(|| ProviderError::Parse("OpenAI returned no image URL".to_string()))
    }
}
