//! Room image generation
//!
//! Fallback order: DALL-E 3, FLUX (1.1 pro, dev, schnell), SDXL, then a
//! style placeholder photo. The chain itself never fails.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::concepts::normalize_style;
use super::openai::OpenAiClient;
use super::replicate::{first_output_url, ReplicateClient};
use super::{ImageInput, ProviderError};

const DALLE_MODEL: &str = "dall-e-3";
const DALLE_SIZE: &str = "1792x1024";
const DALLE_QUALITY: &str = "hd";

const SDXL_NEGATIVE_PROMPT: &str = "blurry, low quality, distorted, ugly, bad anatomy, \
watermark, text, signature, cartoon, anime, drawing, \
sketch, painting, illustration, render, 3d";

const IMG2IMG_NEGATIVE_PROMPT: &str = "different room shape, outdoor, landscape, sky, \
blurry, low quality, distorted, watermark, text";

const PLACEHOLDERS: &[(&str, &str)] = &[
    ("modern", "https://images.unsplash.com/photo-1586023492125-27b2c045efd7?w=1200"),
    ("nordic", "https://images.unsplash.com/photo-1586023492125-27b2c045efd7?w=1200"),
    ("japanese", "https://images.unsplash.com/photo-1583847268964-b28dc8f51f92?w=1200"),
    ("industrial", "https://images.unsplash.com/photo-1600607687939-ce8a6c25118c?w=1200"),
    ("minimalist", "https://images.unsplash.com/photo-1618221195710-dd6b41faaea6?w=1200"),
];

/// Deterministic stock photo for a style (modern when unknown)
pub fn placeholder_url(style: &str) -> &'static str {
    let key = normalize_style(style);
    PLACEHOLDERS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, url)| *url)
        .unwrap_or(PLACEHOLDERS[0].1)
}

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub style: String,
    /// Original room photo for image-to-image capable providers
    pub source_image: Option<ImageInput>,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// URL of the generated image
    async fn generate(&self, request: &ImageRequest) -> Result<String, ProviderError>;
}

pub struct DalleGenerator {
    client: Arc<OpenAiClient>,
}

impl DalleGenerator {
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageGenerator for DalleGenerator {
    fn name(&self) -> &str {
        DALLE_MODEL
    }

    async fn generate(&self, request: &ImageRequest) -> Result<String, ProviderError> {
        let prompt = format!(
            "{}. Professional interior design photograph, architectural photography style, \
             realistic lighting, high resolution, sharp details, magazine quality.",
            request.prompt
        );
        self.client
            .generate_image(DALLE_MODEL, &prompt, DALLE_SIZE, DALLE_QUALITY)
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluxModel {
    Pro,
    Dev,
    Schnell,
}

impl FluxModel {
    pub fn model_path(&self) -> &'static str {
        match self {
            FluxModel::Pro => "black-forest-labs/flux-1.1-pro",
            FluxModel::Dev => "black-forest-labs/flux-dev",
            FluxModel::Schnell => "black-forest-labs/flux-schnell",
        }
    }

    fn input(&self, prompt: &str) -> Value {
        match self {
            FluxModel::Pro => json!({
                "prompt": prompt,
                "aspect_ratio": "16:9",
                "output_format": "webp",
                "output_quality": 95,
                "safety_tolerance": 2,
                "prompt_upsampling": true,
            }),
            FluxModel::Dev => json!({
                "prompt": prompt,
                "num_outputs": 1,
                "aspect_ratio": "16:9",
                "output_format": "webp",
                "output_quality": 90,
                "guidance": 3.5,
                "num_inference_steps": 28,
            }),
            FluxModel::Schnell => json!({
                "prompt": prompt,
                "num_outputs": 1,
                "aspect_ratio": "16:9",
                "output_format": "webp",
                "output_quality": 90,
            }),
        }
    }
}

pub struct FluxGenerator {
    client: Arc<ReplicateClient>,
    model: FluxModel,
}

impl FluxGenerator {
    pub fn new(client: Arc<ReplicateClient>, model: FluxModel) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl ImageGenerator for FluxGenerator {
    fn name(&self) -> &str {
        match self.model {
            FluxModel::Pro => "flux-1.1-pro",
            FluxModel::Dev => "flux-dev",
            FluxModel::Schnell => "flux-schnell",
        }
    }

    async fn generate(&self, request: &ImageRequest) -> Result<String, ProviderError> {
        let prompt = format!(
            "{}, interior design photograph, professional photography, \
             sharp focus, high resolution, photorealistic, \
             natural lighting, clean image, no distortion, no blur",
            request.prompt
        );
        let output = self
            .client
            .run_model(self.model.model_path(), self.model.input(&prompt))
            .await?;
        first_output_url(&output)
            .ok_or_else(|| ProviderError::Parse(format!("No output from {}", self.name())))
    }
}

/// Stable Diffusion XL; image-to-image when a source photo is available
pub struct SdxlGenerator {
    client: Arc<ReplicateClient>,
    version: String,
}

impl SdxlGenerator {
    /// `version` may be given as `owner/model:hash`; only the hash is sent
    pub fn new(client: Arc<ReplicateClient>, version: &str) -> Self {
        let version = version.rsplit(':').next().unwrap_or(version).to_string();
        Self { client, version }
    }

    fn text_input(prompt: &str) -> Value {
        json!({
            "prompt": format!(
                "{}, professional interior photography, architectural digest, \
                 8k uhd, high resolution, photorealistic, detailed textures",
                prompt
            ),
            "negative_prompt": SDXL_NEGATIVE_PROMPT,
            "width": 1344,
            "height": 768,
            "num_outputs": 1,
            "scheduler": "K_EULER",
            "num_inference_steps": 30,
            "guidance_scale": 7.5,
        })
    }

    fn image_input(prompt: &str, source: &ImageInput) -> Value {
        json!({
            "prompt": format!(
                "Same room, same walls, same floor, same ceiling. \
                 ADD these items to the room: {}. \
                 Photorealistic interior photograph, high quality, detailed",
                prompt
            ),
            "image": source.to_data_url(),
            "prompt_strength": 0.55,
            "num_outputs": 1,
            "width": 1024,
            "height": 768,
            "num_inference_steps": 35,
            "guidance_scale": 8.0,
            "negative_prompt": IMG2IMG_NEGATIVE_PROMPT,
        })
    }

    async fn run(&self, input: Value) -> Result<String, ProviderError> {
        let output = self.client.run_version(&self.version, input).await?;
        first_output_url(&output)
            .ok_or_else(|| ProviderError::Parse("No output from SDXL".to_string()))
    }
}

#[async_trait]
impl ImageGenerator for SdxlGenerator {
    fn name(&self) -> &str {
        "sdxl"
    }

    async fn generate(&self, request: &ImageRequest) -> Result<String, ProviderError> {
        if let Some(source) = &request.source_image {
            match self.run(Self::image_input(&request.prompt, source)).await {
                Ok(url) => return Ok(url),
                Err(e) => warn!(error = %e, "SDXL img2img failed, trying text-to-image"),
            }
        }
        self.run(Self::text_input(&request.prompt)).await
    }
}

/// Ordered generators with a placeholder as the last resort
pub struct ImageGenerationChain {
    generators: Vec<Arc<dyn ImageGenerator>>,
}

impl ImageGenerationChain {
    pub fn new(generators: Vec<Arc<dyn ImageGenerator>>) -> Self {
        Self { generators }
    }

    pub fn from_clients(
        openai: Option<Arc<OpenAiClient>>,
        replicate: Option<Arc<ReplicateClient>>,
        sdxl_version: String,
    ) -> Self {
        let mut generators: Vec<Arc<dyn ImageGenerator>> = Vec::new();
        if let Some(client) = openai {
            generators.push(Arc::new(DalleGenerator::new(client)));
        }
        if let Some(client) = replicate {
            for model in [FluxModel::Pro, FluxModel::Dev, FluxModel::Schnell] {
                generators.push(Arc::new(FluxGenerator::new(client.clone(), model)));
            }
            generators.push(Arc::new(SdxlGenerator::new(client, &sdxl_version)));
        }
        Self::new(generators)
    }

    pub fn names(&self) -> Vec<String> {
        self.generators.iter().map(|g| g.name().to_string()).collect()
    }
}

#[async_trait]
impl ImageGenerator for ImageGenerationChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn generate(&self, request: &ImageRequest) -> Result<String, ProviderError> {
        for generator in &self.generators {
            match generator.generate(request).await {
                Ok(url) => {
                    info!(provider = generator.name(), "Image generated");
                    return Ok(url);
                }
                Err(e) => warn!(provider = generator.name(), error = %e, "Image generation failed"),
            }
        }
        let url = placeholder_url(&request.style);
        info!(style = %request.style, "Using placeholder image");
        Ok(url.to_string())
    }
}
