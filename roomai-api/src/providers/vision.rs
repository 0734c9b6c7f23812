//! Room analysis from a photo (Claude -> OpenAI -> optional demo data)

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::anthropic::{AnthropicClient, ContentBlock};
use super::openai::OpenAiClient;
use super::{extract_json, ImageInput, ProviderError};
use crate::models::{Language, RoomAnalysis};

const MAX_TOKENS: u32 = 2048;

pub const ROOM_ANALYSIS_PROMPT: &str = r#"
分析这张室内照片,提供以下信息(以JSON格式返回):

{
  "room_type": "房间类型(living/bedroom/kitchen/bathroom/office/dining/other)",
  "dimensions": {
    "width": "估计宽度(米,数字)",
    "length": "估计长度(米,数字)",
    "height": "估计层高(米,数字)"
  },
  "existing_furniture": ["现有家具列表"],
  "current_style": "当前装修风格描述",
  "lighting": "光线情况描述",
  "problems": ["发现的问题列表"],
  "potential": "空间改造潜力分析",
  "confidence": "分析置信度(0-1之间的数字)"
}

请确保返回有效的JSON格式。对于dimensions中的数值,请只返回数字,不要包含单位。
"#;

pub const ROOM_ANALYSIS_PROMPT_EN: &str = r#"
Analyze this interior photo and return the following as JSON:

{
  "room_type": "room type (living/bedroom/kitchen/bathroom/office/dining/other)",
  "dimensions": {
    "width": "estimated width in meters (number)",
    "length": "estimated length in meters (number)",
    "height": "estimated ceiling height in meters (number)"
  },
  "existing_furniture": ["furniture currently in the room"],
  "current_style": "current decoration style",
  "lighting": "lighting conditions",
  "problems": ["problems you notice"],
  "potential": "renovation potential of the space",
  "confidence": "confidence of the analysis (number between 0 and 1)"
}

Return valid JSON only. Dimension values must be plain numbers without units.
"#;

/// Analysis prompt asking for descriptions in `language`
pub fn analysis_prompt(language: Language) -> &'static str {
    match language {
        Language::Zh => ROOM_ANALYSIS_PROMPT,
        Language::En => ROOM_ANALYSIS_PROMPT_EN,
    }
}

/// Something that can describe a room from a photo
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(
        &self,
        image: &ImageInput,
        language: Language,
    ) -> Result<RoomAnalysis, ProviderError>;
}

pub struct ClaudeVision {
    client: Arc<AnthropicClient>,
    model: String,
}

impl ClaudeVision {
    pub fn new(client: Arc<AnthropicClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl VisionAnalyzer for ClaudeVision {
    fn name(&self) -> &str {
        "claude"
    }

    async fn analyze(
        &self,
        image: &ImageInput,
        language: Language,
    ) -> Result<RoomAnalysis, ProviderError> {
        let text = self
            .client
            .message(
                &self.model,
                MAX_TOKENS,
                vec![
                    ContentBlock::image(image),
                    ContentBlock::text(analysis_prompt(language)),
                ],
            )
            .await?;
        Ok(RoomAnalysis::normalize(&extract_json(&text)?))
    }
}

pub struct OpenAiVision {
    client: Arc<OpenAiClient>,
    model: String,
}

impl OpenAiVision {
    pub fn new(client: Arc<OpenAiClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl VisionAnalyzer for OpenAiVision {
    fn name(&self) -> &str {
        "openai"
    }

    async fn analyze(
        &self,
        image: &ImageInput,
        language: Language,
    ) -> Result<RoomAnalysis, ProviderError> {
        let text = self
            .client
            .chat_with_image(&self.model, analysis_prompt(language), image, MAX_TOKENS)
            .await?;
        Ok(RoomAnalysis::normalize(&extract_json(&text)?))
    }
}

/// Canned analysis for development setups without credentials
pub struct DemoVision;

#[async_trait]
impl VisionAnalyzer for DemoVision {
    fn name(&self) -> &str {
        "demo"
    }

    async fn analyze(
        &self,
        _image: &ImageInput,
        _language: Language,
    ) -> Result<RoomAnalysis, ProviderError> {
        Ok(RoomAnalysis::demo())
    }
}

/// Tries each analyzer in order, returning the first success
pub struct VisionChain {
    analyzers: Vec<Arc<dyn VisionAnalyzer>>,
}

impl VisionChain {
    pub fn new(analyzers: Vec<Arc<dyn VisionAnalyzer>>) -> Self {
        Self { analyzers }
    }

    pub fn from_clients(
        anthropic: Option<Arc<AnthropicClient>>,
        openai: Option<Arc<OpenAiClient>>,
        anthropic_model: &str,
        openai_model: &str,
        demo_vision: bool,
    ) -> Self {
        let mut analyzers: Vec<Arc<dyn VisionAnalyzer>> = Vec::new();
        if let Some(client) = anthropic {
            analyzers.push(Arc::new(ClaudeVision::new(client, anthropic_model)));
        }
        if let Some(client) = openai {
            analyzers.push(Arc::new(OpenAiVision::new(client, openai_model)));
        }
        if demo_vision {
            analyzers.push(Arc::new(DemoVision));
        }
        if analyzers.is_empty() {
            warn!("No vision provider configured; room analysis jobs will fail");
        }
        Self::new(analyzers)
    }

    pub fn names(&self) -> Vec<String> {
        self.analyzers.iter().map(|a| a.name().to_string()).collect()
    }
}

#[async_trait]
impl VisionAnalyzer for VisionChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn analyze(
        &self,
        image: &ImageInput,
        language: Language,
    ) -> Result<RoomAnalysis, ProviderError> {
        let mut failures = Vec::new();
        for analyzer in &self.analyzers {
            match analyzer.analyze(image, language).await {
                Ok(analysis) => {
                    info!(
                        provider = analyzer.name(),
                        room_type = %analysis.room_type,
                        "Room analyzed"
                    );
                    return Ok(analysis);
                }
                Err(e) => {
                    warn!(provider = analyzer.name(), error = %e, "Vision provider failed");
                    failures.push(format!("{}: {}", analyzer.name(), e));
                }
            }
        }
        if failures.is_empty() {
            failures.push("no vision provider configured".to_string());
        }
        Err(ProviderError::Exhausted(failures))
    }
}
