//! External AI provider adapters
//!
//! Two layers:
//! - HTTP clients, one per vendor API (`anthropic`, `openai`, `replicate`,
//!   `huggingface`), sharing the request plumbing in [`http`]
//! - capabilities the pipelines call (`vision`, `segmentation`, `concepts`,
//!   `image_generation`, `furniture`), each a trait with a production
//!   fallback chain built from whichever vendors have credentials
//!
//! Pipelines only see the capability traits, bundled in [`Providers`].

pub mod anthropic;
pub mod concepts;
pub mod furniture;
pub mod http;
pub mod huggingface;
pub mod image_generation;
pub mod openai;
pub mod replicate;
pub mod segmentation;
pub mod vision;

pub use concepts::{ConceptGenerator, ConceptRequest, TemplateConceptGenerator, Translator};
pub use furniture::{CatalogFurnitureMatcher, FurnitureMatcher, FurnitureRequest, Region};
pub use image_generation::{ImageGenerationChain, ImageGenerator, ImageRequest};
pub use segmentation::{SamSegmenter, SegmentationMask, Segmenter};
pub use vision::{VisionAnalyzer, VisionChain};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use roomai_common::config::TomlConfig;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ProviderCredentials;

/// Provider call failure
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No credential for this provider
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// Connection or transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// Response body did not have the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Request did not finish in time
    #[error("Request timed out")]
    Timeout,

    /// Every provider in a fallback chain failed
    #[error("All providers failed: {}", .0.join("; "))]
    Exhausted(Vec<String>),
}

/// Image handed to vision-capable providers
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    pub bytes: Arc<Vec<u8>>,
    pub media_type: String,
}

impl ImageInput {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: Arc::new(bytes),
            media_type: media_type.into(),
        }
    }

    /// Build from raw bytes, sniffing the media type
    pub fn sniff(bytes: Vec<u8>) -> Self {
        let media_type = infer::get(&bytes)
            .map(|kind| kind.mime_type())
            .filter(|mime| mime.starts_with("image/"))
            .unwrap_or("image/jpeg")
            .to_string();
        Self::new(bytes, media_type)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.bytes.as_slice())
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.to_base64())
    }
}

/// Media type from the leading characters of base64 image data
pub fn media_type_from_base64(data: &str) -> &'static str {
    if data.starts_with("iVBOR") {
        "image/png"
    } else if data.starts_with("UklGR") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

/// Pull a JSON object out of free-form model output
///
/// Tries, in order: the whole text, the first fenced code block, and the
/// span from the first `{` to the last `}`.
pub fn extract_json(text: &str) -> Result<Value, ProviderError> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    if let Some(block) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(block) {
            return Ok(value);
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(ProviderError::Parse(
        "Could not extract JSON from response".to_string(),
    ))
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let header = after_fence[..body_start].trim();
    let body = if header.is_empty() || header.eq_ignore_ascii_case("json") {
        &after_fence[body_start..]
    } else {
        after_fence
    };
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// Capabilities used by the pipelines
#[derive(Clone)]
pub struct Providers {
    pub vision: Arc<dyn VisionAnalyzer>,
    pub segmentation: Arc<dyn Segmenter>,
    pub concepts: Arc<dyn ConceptGenerator>,
    pub images: Arc<dyn ImageGenerator>,
    pub furniture: Arc<dyn FurnitureMatcher>,
}

impl Providers {
    /// Build every capability chain from configuration and credentials
    pub fn from_config(
        config: &TomlConfig,
        credentials: &ProviderCredentials,
    ) -> Result<Self, ProviderError> {
        let settings = &config.providers;
        let rpm = settings.requests_per_minute;

        let anthropic = credentials
            .anthropic_api_key
            .as_ref()
            .map(|key| {
                anthropic::AnthropicClient::new(&settings.anthropic_base_url, key, rpm)
                    .map(Arc::new)
            })
            .transpose()?;
        let openai = credentials
            .openai_api_key
            .as_ref()
            .map(|key| openai::OpenAiClient::new(&settings.openai_base_url, key, rpm).map(Arc::new))
            .transpose()?;
        let replicate = credentials
            .replicate_api_token
            .as_ref()
            .map(|token| {
                replicate::ReplicateClient::new(&settings.replicate_base_url, token, rpm)
                    .map(Arc::new)
            })
            .transpose()?;
        let huggingface = credentials
            .huggingface_api_token
            .as_ref()
            .map(|token| huggingface::HuggingFaceClient::new(token, rpm).map(Arc::new))
            .transpose()?;

        let vision = VisionChain::from_clients(
            anthropic.clone(),
            openai.clone(),
            &settings.anthropic_model,
            &settings.openai_model,
            settings.demo_vision,
        );

        let segmentation = SamSegmenter::new(huggingface, settings.sam_endpoint.clone());

        let translator: Option<Arc<dyn Translator>> = anthropic.clone().map(|client| {
            Arc::new(concepts::ClaudeTranslator::new(
                client,
                settings.anthropic_translation_model.clone(),
            )) as Arc<dyn Translator>
        });
        let concepts = TemplateConceptGenerator::new(translator);

        let images = ImageGenerationChain::from_clients(
            openai,
            replicate,
            settings.sdxl_version.clone(),
        );

        let search: Option<Arc<dyn furniture::ProductSearch>> = anthropic.map(|client| {
            Arc::new(furniture::ClaudeProductSearch::new(
                client,
                settings.anthropic_model.clone(),
            )) as Arc<dyn furniture::ProductSearch>
        });
        let region = Region::parse(&settings.region);
        let furniture = CatalogFurnitureMatcher::new(search, region);

        tracing::info!(
            vision = ?vision.names(),
            images = ?images.names(),
            segmentation = segmentation.is_enabled(),
            region = %region,
            "Provider chains configured"
        );

        Ok(Self {
            vision: Arc::new(vision),
            segmentation: Arc::new(segmentation),
            concepts: Arc::new(concepts),
            images: Arc::new(images),
            furniture: Arc::new(furniture),
        })
    }
}

/// Local stand-ins for vendor APIs
#[cfg(test)]
pub(crate) mod test_support {
    use axum::Router;

    /// Serve `router` on an ephemeral port and return its base URL
    pub async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }
}
