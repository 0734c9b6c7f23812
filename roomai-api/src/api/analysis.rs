//! Room analysis API handlers
//!
//! POST /api/v1/analysis/upload, GET /api/v1/analysis/status/{id},
//! GET /api/v1/analysis/demo

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use roomai_common::{JobKind, JobStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{find_job, submit_job, SubmitResponse};
use crate::error::{ApiError, ApiResult};
use crate::models::{AnalysisInput, Language, RoomAnalysis};
use crate::pipeline::analysis::run_analysis;
use crate::storage::sanitize_filename;
use crate::AppState;

/// Accepted upload media types, checked against both header and content
pub const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    pub language: Option<String>,
}

/// GET /api/v1/analysis/status/{id} response
#[derive(Debug, Serialize)]
pub struct AnalysisStatusResponse {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// Canned analysis served by the demo endpoint
#[derive(Debug, Serialize)]
pub struct DemoAnalysis {
    pub id: &'static str,
    pub image_url: &'static str,
    pub segmentation_url: Option<String>,
    #[serde(flatten)]
    pub analysis: RoomAnalysis,
}

struct UploadedFile {
    file_name: String,
    bytes: Vec<u8>,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

/// POST /api/v1/analysis/upload
///
/// Multipart form with the photo in `file`; `language` may come as query
/// parameter or form field. Returns the job id to poll.
pub async fn upload_room_image(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> ApiResult<Json<SubmitResponse>> {
    let max_bytes = state.config.upload.max_bytes;
    let mut language = query.language;
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) {
                    return Err(ApiError::BadRequest(format!(
                        "Unsupported file type. Supported types: {}",
                        ALLOWED_IMAGE_TYPES.join(", ")
                    )));
                }
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                upload = Some(UploadedFile {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            "language" if language.is_none() => {
                language = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| ApiError::BadRequest("Missing file field".to_string()))?;
    if upload.bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }
    if upload.bytes.len() > max_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "File size cannot exceed {} bytes",
            max_bytes
        )));
    }

    let kind = infer::get(&upload.bytes)
        .filter(|kind| ALLOWED_IMAGE_TYPES.contains(&kind.mime_type()))
        .ok_or_else(|| {
            ApiError::BadRequest("File content is not a JPEG, PNG or WebP image".to_string())
        })?;

    let language = match language.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
        Some(raw) => raw.parse::<Language>()?,
        None => Language::default(),
    };

    // The job id is assigned by the store, so uploads get their own folder id
    let upload_id = Uuid::new_v4();
    let key = format!(
        "rooms/{}/{}",
        upload_id,
        sanitize_filename(&upload.file_name, kind.extension())
    );
    let image_url = state.storage.put(&key, &upload.bytes).await?;

    let input = AnalysisInput {
        image_url,
        image_key: key,
        content_type: kind.mime_type().to_string(),
        language,
    };
    let payload = serde_json::to_value(&input).map_err(|e| ApiError::Internal(e.to_string()))?;
    let job = submit_job(&state, JobKind::Analysis, payload, run_analysis).await?;

    tracing::info!(
        job_id = %job.id,
        bytes = upload.bytes.len(),
        content_type = kind.mime_type(),
        language = %language,
        "Room image uploaded"
    );

    Ok(Json(SubmitResponse {
        id: job.id,
        status: job.status,
        message: "Image uploaded successfully, analysis in progress...".to_string(),
    }))
}

/// GET /api/v1/analysis/status/{id}
pub async fn get_analysis_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<AnalysisStatusResponse>> {
    let job = find_job(&state, &job_id, JobKind::Analysis).await?;

    tracing::debug!(
        job_id = %job.id,
        status = %job.status,
        progress = job.progress,
        "Status query"
    );

    Ok(Json(AnalysisStatusResponse {
        id: job.id,
        status: job.status,
        progress: job.progress,
        result: job.result.filter(|_| job.status == JobStatus::Completed),
        error: job.error.filter(|_| job.status == JobStatus::Failed),
    }))
}

/// GET /api/v1/analysis/demo
pub async fn get_demo_analysis() -> Json<DemoAnalysis> {
    Json(DemoAnalysis {
        id: "demo-001",
        image_url: "https://example.com/demo-room.jpg",
        segmentation_url: None,
        analysis: RoomAnalysis::demo(),
    })
}

pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/analysis/upload", post(upload_room_image))
        .route("/api/v1/analysis/status/:job_id", get(get_analysis_status))
        .route("/api/v1/analysis/demo", get(get_demo_analysis))
}
