//! Design generation pipeline
//!
//! concepts (required, 20 -> 40), images (required, 40 -> 85, 15 points per
//! concept) and furniture (optional, 85 -> 90). The result is the list of
//! [`DesignProposal`]s.
//!
//! When the request references an analysis job, its room type and uploaded
//! photo feed the furniture search and image-to-image generation.

use async_trait::async_trait;
use roomai_common::{Error, JobKind, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{PipelineContext, ProgressReporter, Stage, StageError, StageRequirement};
use crate::models::{AnalysisInput, DesignConcept, DesignInput, DesignProposal, FurnitureItem};
use crate::providers::{
    ConceptGenerator, ConceptRequest, FurnitureMatcher, FurnitureRequest, ImageGenerator,
    ImageInput, ImageRequest,
};

const DEFAULT_ROOM_TYPE: &str = "living";
const IMAGES_START: u8 = 40;
const IMAGES_DONE: u8 = 85;
const IMAGE_PROGRESS_STEP: usize = 15;
const FURNITURE_DONE: u8 = 90;

pub struct DesignState {
    pub job_id: Uuid,
    pub input: DesignInput,
    /// Style identifier from the preferences
    pub style: String,
    pub room_type: String,
    pub source_image: Option<ImageInput>,
    pub concepts: Vec<DesignConcept>,
    pub image_urls: Vec<String>,
    pub furniture: Option<Vec<FurnitureItem>>,
}

pub struct ConceptsStage {
    concepts: Arc<dyn ConceptGenerator>,
    count: usize,
}

#[async_trait]
impl Stage<DesignState> for ConceptsStage {
    fn name(&self) -> &'static str {
        "concepts"
    }

    fn requirement(&self) -> StageRequirement {
        StageRequirement::Required
    }

    fn progress_span(&self) -> (u8, u8) {
        (20, IMAGES_START)
    }

    fn running_message(&self) -> &'static str {
        "Generating design concepts"
    }

    fn done_message(&self) -> &'static str {
        "Design concepts ready"
    }

    async fn run(
        &self,
        state: &mut DesignState,
        _progress: &ProgressReporter,
    ) -> std::result::Result<(), StageError> {
        let preferences = &state.input.preferences;
        let request = ConceptRequest {
            style: state.style.clone(),
            requirements: preferences.requirements.clone(),
            special_needs: preferences.combined_requirements(),
            room_description: preferences.room_description.clone(),
            language: state.input.language,
            count: self.count,
        };
        let concepts = self.concepts.generate(&request).await?;
        if concepts.is_empty() {
            return Err(StageError::Invalid("No design concepts generated".to_string()));
        }
        info!(job_id = %state.job_id, count = concepts.len(), "Design concepts generated");
        state.concepts = concepts;
        Ok(())
    }
}

pub struct ImagesStage {
    images: Arc<dyn ImageGenerator>,
    /// Pause between consecutive generation calls
    delay: Duration,
}

#[async_trait]
impl Stage<DesignState> for ImagesStage {
    fn name(&self) -> &'static str {
        "images"
    }

    fn requirement(&self) -> StageRequirement {
        StageRequirement::Required
    }

    fn progress_span(&self) -> (u8, u8) {
        (IMAGES_START, IMAGES_DONE)
    }

    fn running_message(&self) -> &'static str {
        "Generating design images"
    }

    fn done_message(&self) -> &'static str {
        "Design images ready"
    }

    async fn run(
        &self,
        state: &mut DesignState,
        progress: &ProgressReporter,
    ) -> std::result::Result<(), StageError> {
        let total = state.concepts.len();
        let mut urls = Vec::with_capacity(total);

        for (i, concept) in state.concepts.iter().enumerate() {
            let percent = (IMAGES_START as usize + i * IMAGE_PROGRESS_STEP)
                .min(IMAGES_DONE as usize) as u8;
            progress
                .report(percent, format!("Generating image {}/{}", i + 1, total))
                .await?;

            if i > 0 && !self.delay.is_zero() {
                debug!(
                    job_id = %state.job_id,
                    delay_ms = self.delay.as_millis() as u64,
                    "Pausing before next image"
                );
                tokio::time::sleep(self.delay).await;
            }

            let request = ImageRequest {
                prompt: concept.prompt.clone(),
                style: state.style.clone(),
                source_image: state.source_image.clone(),
            };
            urls.push(self.images.generate(&request).await?);
        }

        state.image_urls = urls;
        Ok(())
    }
}

pub struct FurnitureStage {
    furniture: Arc<dyn FurnitureMatcher>,
}

#[async_trait]
impl Stage<DesignState> for FurnitureStage {
    fn name(&self) -> &'static str {
        "furniture"
    }

    fn requirement(&self) -> StageRequirement {
        StageRequirement::Optional
    }

    fn progress_span(&self) -> (u8, u8) {
        (IMAGES_DONE, FURNITURE_DONE)
    }

    fn running_message(&self) -> &'static str {
        "Matching furniture"
    }

    fn done_message(&self) -> &'static str {
        "Furniture matched"
    }

    async fn run(
        &self,
        state: &mut DesignState,
        _progress: &ProgressReporter,
    ) -> std::result::Result<(), StageError> {
        let preferences = &state.input.preferences;
        let request = FurnitureRequest {
            style: state.style.clone(),
            room_type: state.room_type.clone(),
            budget: preferences.budget,
            user_needs: preferences.user_needs(),
            exclude: preferences.keep_furniture.clone(),
            language: state.input.language,
        };
        let items = self.furniture.match_furniture(&request).await?;
        info!(job_id = %state.job_id, count = items.len(), "Furniture matched");
        state.furniture = Some(items);
        Ok(())
    }
}

fn finish(state: DesignState) -> std::result::Result<Value, StageError> {
    if state.concepts.len() != state.image_urls.len() {
        return Err(StageError::Invalid(format!(
            "Generated {} images for {} concepts",
            state.image_urls.len(),
            state.concepts.len()
        )));
    }

    let job_id = state.job_id;
    let style = state.style;
    let furniture = state.furniture;
    let proposals: Vec<DesignProposal> = state
        .concepts
        .into_iter()
        .zip(state.image_urls)
        .enumerate()
        .map(|(i, (concept, image_url))| {
            DesignProposal {
                id: DesignProposal::proposal_id(job_id, i),
                name: concept.name,
                description: concept.description,
                image_url,
                style: style.clone(),
                confidence: concept.confidence,
                furniture: None,
                total_cost: 0.0,
                highlights: concept.highlights,
            }
            .with_furniture(furniture.clone())
        })
        .collect();

    serde_json::to_value(proposals).map_err(|e| StageError::Invalid(e.to_string()))
}

/// Room type and source photo of the referenced analysis job, if usable
async fn analysis_context(
    ctx: &PipelineContext,
    analysis_id: Uuid,
) -> (Option<String>, Option<ImageInput>) {
    let job = match ctx.store.get(analysis_id).await {
        Ok(Some(job)) if job.kind == JobKind::Analysis => job,
        Ok(Some(_)) => {
            warn!(analysis_id = %analysis_id, "Referenced job is not an analysis job");
            return (None, None);
        }
        Ok(None) => {
            warn!(analysis_id = %analysis_id, "Referenced analysis job not found");
            return (None, None);
        }
        Err(e) => {
            warn!(analysis_id = %analysis_id, error = %e, "Could not load analysis job");
            return (None, None);
        }
    };

    let room_type = job
        .result
        .as_ref()
        .and_then(|r| r.get("room_type"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let source_image = match serde_json::from_value::<AnalysisInput>(job.payload) {
        Ok(input) => match ctx.storage.get(&input.image_key).await {
            Ok(bytes) => Some(ImageInput::new(bytes, input.content_type)),
            Err(e) => {
                warn!(analysis_id = %analysis_id, error = %e, "Source image unavailable");
                None
            }
        },
        Err(e) => {
            warn!(analysis_id = %analysis_id, error = %e, "Analysis payload unreadable");
            None
        }
    };

    (room_type, source_image)
}

/// Run the design pipeline for a stored job
pub async fn run_design(ctx: PipelineContext, job_id: Uuid) -> Result<()> {
    let runner = ctx.runner();
    let job = ctx
        .store
        .get(job_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Design job not found: {}", job_id)))?;

    let input: DesignInput = match serde_json::from_value(job.payload) {
        Ok(input) => input,
        Err(e) => {
            runner
                .fail(job_id, JobKind::Design, None, format!("Invalid job payload: {}", e))
                .await?;
            return Ok(());
        }
    };

    let (room_type, source_image) = match input.analysis_id {
        Some(analysis_id) => analysis_context(&ctx, analysis_id).await,
        None => (None, None),
    };

    let style = input.preferences.style.id().to_string();
    info!(
        job_id = %job_id,
        style = %style,
        analysis_id = ?input.analysis_id,
        img2img = source_image.is_some(),
        "Starting design generation"
    );

    let state = DesignState {
        job_id,
        style,
        room_type: room_type.unwrap_or_else(|| DEFAULT_ROOM_TYPE.to_string()),
        source_image,
        input,
        concepts: Vec::new(),
        image_urls: Vec::new(),
        furniture: None,
    };
    let stages: Vec<Box<dyn Stage<DesignState>>> = vec![
        Box::new(ConceptsStage {
            concepts: ctx.providers.concepts.clone(),
            count: ctx.settings.concepts_per_design,
        }),
        Box::new(ImagesStage {
            images: ctx.providers.images.clone(),
            delay: Duration::from_millis(ctx.settings.image_request_delay_ms),
        }),
        Box::new(FurnitureStage {
            furniture: ctx.providers.furniture.clone(),
        }),
    ];

    runner.run(job_id, JobKind::Design, state, stages, finish).await?;
    Ok(())
}
