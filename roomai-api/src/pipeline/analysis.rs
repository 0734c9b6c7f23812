//! Room analysis pipeline
//!
//! vision (required, 20 -> 50) then segmentation (optional, 60 -> 90).
//! The result is a [`RoomAnalysisResult`].

use async_trait::async_trait;
use roomai_common::{Error, JobKind, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{PipelineContext, ProgressReporter, Stage, StageError, StageRequirement};
use crate::models::{AnalysisInput, RoomAnalysis, RoomAnalysisResult};
use crate::providers::{ImageInput, Segmenter, VisionAnalyzer};
use crate::storage::LocalStorage;

pub struct AnalysisState {
    pub job_id: Uuid,
    pub input: AnalysisInput,
    pub image: ImageInput,
    pub analysis: Option<RoomAnalysis>,
    pub segmentation_url: Option<String>,
}

/// Storage key of the segmentation mask of a job
pub fn segmentation_key(job_id: Uuid) -> String {
    format!("rooms/{}/segmentation.png", job_id)
}

pub struct VisionStage {
    vision: Arc<dyn VisionAnalyzer>,
}

#[async_trait]
impl Stage<AnalysisState> for VisionStage {
    fn name(&self) -> &'static str {
        "vision"
    }

    fn requirement(&self) -> StageRequirement {
        StageRequirement::Required
    }

    fn progress_span(&self) -> (u8, u8) {
        (20, 50)
    }

    fn running_message(&self) -> &'static str {
        "Analyzing room layout"
    }

    fn done_message(&self) -> &'static str {
        "Room analysis complete"
    }

    async fn run(
        &self,
        state: &mut AnalysisState,
        _progress: &ProgressReporter,
    ) -> std::result::Result<(), StageError> {
        let analysis = self
            .vision
            .analyze(&state.image, state.input.language)
            .await?;
        state.analysis = Some(analysis);
        Ok(())
    }
}

pub struct SegmentationStage {
    segmenter: Arc<dyn Segmenter>,
    storage: LocalStorage,
}

#[async_trait]
impl Stage<AnalysisState> for SegmentationStage {
    fn name(&self) -> &'static str {
        "segmentation"
    }

    fn requirement(&self) -> StageRequirement {
        StageRequirement::Optional
    }

    fn progress_span(&self) -> (u8, u8) {
        (60, 90)
    }

    fn running_message(&self) -> &'static str {
        "Segmenting objects"
    }

    fn done_message(&self) -> &'static str {
        "Segmentation complete"
    }

    async fn run(
        &self,
        state: &mut AnalysisState,
        _progress: &ProgressReporter,
    ) -> std::result::Result<(), StageError> {
        match self.segmenter.segment(&state.image).await? {
            Some(mask) => {
                let url = self
                    .storage
                    .put(&segmentation_key(state.job_id), &mask.png)
                    .await?;
                debug!(
                    job_id = %state.job_id,
                    label = %mask.label,
                    score = mask.score,
                    "Stored segmentation mask"
                );
                state.segmentation_url = Some(url);
            }
            None => debug!(job_id = %state.job_id, "No segmentation available"),
        }
        Ok(())
    }
}

fn finish(state: AnalysisState) -> std::result::Result<Value, StageError> {
    let analysis = state
        .analysis
        .ok_or_else(|| StageError::Invalid("Room analysis produced no result".to_string()))?;
    let result = RoomAnalysisResult {
        id: state.job_id,
        image_url: state.input.image_url,
        segmentation_url: state.segmentation_url,
        analysis,
    };
    serde_json::to_value(result).map_err(|e| StageError::Invalid(e.to_string()))
}

/// Run the analysis pipeline for a stored job
pub async fn run_analysis(ctx: PipelineContext, job_id: Uuid) -> Result<()> {
    let runner = ctx.runner();
    let job = ctx
        .store
        .get(job_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Analysis job not found: {}", job_id)))?;

    let input: AnalysisInput = match serde_json::from_value(job.payload) {
        Ok(input) => input,
        Err(e) => {
            runner
                .fail(job_id, JobKind::Analysis, None, format!("Invalid job payload: {}", e))
                .await?;
            return Ok(());
        }
    };

    let bytes = match ctx.storage.get(&input.image_key).await {
        Ok(bytes) => bytes,
        Err(e) => {
            runner
                .fail(job_id, JobKind::Analysis, None, format!("Uploaded image unavailable: {}", e))
                .await?;
            return Ok(());
        }
    };

    info!(job_id = %job_id, bytes = bytes.len(), "Starting room analysis");

    let state = AnalysisState {
        job_id,
        image: ImageInput::new(bytes, input.content_type.clone()),
        input,
        analysis: None,
        segmentation_url: None,
    };
    let stages: Vec<Box<dyn Stage<AnalysisState>>> = vec![
        Box::new(VisionStage {
            vision: ctx.providers.vision.clone(),
        }),
        Box::new(SegmentationStage {
            segmenter: ctx.providers.segmentation.clone(),
            storage: ctx.storage.clone(),
        }),
    ];

    runner
        .run(job_id, JobKind::Analysis, state, stages, finish)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Language;
    use crate::pipeline::test_support::{context, FakeSegmenter, FakeVision};
    use roomai_common::JobStatus;

    async fn submit(ctx: &PipelineContext) -> Uuid {
        submit_in(ctx, Language::Zh).await
    }

    async fn submit_in(ctx: &PipelineContext, language: Language) -> Uuid {
        let url = ctx.storage.put("rooms/upload/photo.jpg", b"jpeg-bytes").await.unwrap();
        let input = AnalysisInput {
            image_url: url,
            image_key: "rooms/upload/photo.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            language,
        };
        ctx.store
            .create(JobKind::Analysis, serde_json::to_value(input).unwrap())
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn completes_with_segmentation() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), |p| {
            p.segmentation = Arc::new(FakeSegmenter::mask(b"png-mask"));
        });
        let id = submit(&ctx).await;

        run_analysis(ctx.clone(), id).await.unwrap();

        let job = ctx.store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        let result: RoomAnalysisResult = serde_json::from_value(job.result.unwrap()).unwrap();
        assert_eq!(result.id, id);
        assert_eq!(result.image_url, "/uploads/rooms/upload/photo.jpg");
        assert_eq!(result.analysis, RoomAnalysis::demo());
        assert_eq!(
            result.segmentation_url,
            Some(format!("/uploads/rooms/{}/segmentation.png", id))
        );
        assert_eq!(ctx.storage.get(&segmentation_key(id)).await.unwrap(), b"png-mask");
    }

    #[tokio::test]
    async fn segmentation_failure_still_completes() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), |p| {
            p.segmentation = Arc::new(FakeSegmenter::failing());
        });
        let id = submit(&ctx).await;

        run_analysis(ctx.clone(), id).await.unwrap();

        let job = ctx.store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.unwrap()["segmentation_url"], Value::Null);
    }

    #[tokio::test]
    async fn vision_is_asked_in_job_language() {
        let dir = tempfile::tempdir().unwrap();
        let vision = Arc::new(FakeVision::demo());
        let ctx = context(dir.path(), |p| p.vision = vision.clone());
        let id = submit_in(&ctx, Language::En).await;

        run_analysis(ctx.clone(), id).await.unwrap();

        assert_eq!(vision.languages.lock().unwrap().as_slice(), [Language::En]);
    }

    #[tokio::test]
    async fn vision_failure_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), |p| {
            p.vision = Arc::new(FakeVision::failing());
        });
        let id = submit(&ctx).await;

        run_analysis(ctx.clone(), id).await.unwrap();

        let job = ctx.store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().starts_with("vision: All providers failed"));
        assert!(job.result.is_none());
    }

    #[tokio::test]
    async fn missing_upload_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), |_| {});
        let input = AnalysisInput {
            image_url: "/uploads/rooms/x/gone.jpg".to_string(),
            image_key: "rooms/x/gone.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            language: Language::En,
        };
        let id = ctx
            .store
            .create(JobKind::Analysis, serde_json::to_value(input).unwrap())
            .await
            .unwrap()
            .id;

        run_analysis(ctx.clone(), id).await.unwrap();

        let job = ctx.store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("Uploaded image unavailable"));
    }
}
