//! Design generation API handlers
//!
//! POST /api/v1/design/generate, GET /api/v1/design/status/{id},
//! GET /api/v1/design/demo

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use roomai_common::{JobKind, JobStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{find_job, submit_job, SubmitResponse};
use crate::error::{ApiError, ApiResult};
use crate::models::{DesignInput, DesignPreferences, DesignProposal, Language};
use crate::pipeline::design::run_design;
use crate::AppState;

/// Placeholder analysis id sent by clients working from the demo analysis
const DEMO_ANALYSIS_ID: &str = "demo";

/// POST /api/v1/design/generate request
#[derive(Debug, Deserialize)]
pub struct GenerateDesignRequest {
    #[serde(default)]
    pub analysis_id: Option<String>,
    #[serde(default)]
    pub preferences: DesignPreferences,
    #[serde(default)]
    pub language: Option<String>,
}

/// GET /api/v1/design/status/{id} response
#[derive(Debug, Serialize)]
pub struct DesignStatusResponse {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub proposals: Option<Value>,
    pub error: Option<String>,
}

impl GenerateDesignRequest {
    fn into_input(self) -> ApiResult<DesignInput> {
        let analysis_id = match self.analysis_id.as_deref().map(str::trim) {
            None | Some("") | Some(DEMO_ANALYSIS_ID) => None,
            Some(raw) => Some(
                Uuid::parse_str(raw)
                    .map_err(|_| ApiError::BadRequest(format!("Invalid analysis_id: {}", raw)))?,
            ),
        };
        let language = match self.language.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            Some(raw) => raw.parse::<Language>()?,
            None => Language::default(),
        };
        Ok(DesignInput {
            analysis_id,
            preferences: self.preferences,
            language,
        })
    }
}

/// POST /api/v1/design/generate
pub async fn generate_designs(
    State(state): State<AppState>,
    request: Result<Json<GenerateDesignRequest>, JsonRejection>,
) -> ApiResult<Json<SubmitResponse>> {
    let Json(request) = request.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let input = request.into_input()?;

    let style = input.preferences.style.id().to_string();
    let analysis_id = input.analysis_id;
    let payload = serde_json::to_value(&input).map_err(|e| ApiError::Internal(e.to_string()))?;
    let job = submit_job(&state, JobKind::Design, payload, run_design).await?;

    tracing::info!(
        job_id = %job.id,
        style = %style,
        analysis_id = ?analysis_id,
        "Design generation requested"
    );

    Ok(Json(SubmitResponse {
        id: job.id,
        status: job.status,
        message: "Generating design proposals...".to_string(),
    }))
}

/// GET /api/v1/design/status/{id}
pub async fn get_design_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<DesignStatusResponse>> {
    let job = find_job(&state, &job_id, JobKind::Design).await?;

    Ok(Json(DesignStatusResponse {
        id: job.id,
        status: job.status,
        progress: job.progress,
        proposals: job.result.filter(|_| job.status == JobStatus::Completed),
        error: job.error.filter(|_| job.status == JobStatus::Failed),
    }))
}

/// GET /api/v1/design/demo
pub async fn get_demo_designs() -> Json<Vec<DesignProposal>> {
    Json(DesignProposal::demo())
}

pub fn design_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/design/generate", post(generate_designs))
        .route("/api/v1/design/status/:job_id", get(get_design_status))
        .route("/api/v1/design/demo", get(get_demo_designs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: Value) -> ApiResult<DesignInput> {
        serde_json::from_value::<GenerateDesignRequest>(body)
            .unwrap()
            .into_input()
    }

    #[test]
    fn demo_analysis_id_means_none() {
        let input =
            parse(json!({"analysis_id": "demo", "preferences": {"style": "nordic"}})).unwrap();
        assert!(input.analysis_id.is_none());
        assert_eq!(input.preferences.style.id(), "nordic");
        assert_eq!(input.language, Language::Zh);
    }

    #[test]
    fn analysis_id_must_be_uuid() {
        let id = Uuid::new_v4();
        let input = parse(json!({"analysis_id": id.to_string(), "language": "en"})).unwrap();
        assert_eq!(input.analysis_id, Some(id));
        assert_eq!(input.language, Language::En);

        assert!(matches!(
            parse(json!({"analysis_id": "room-7"})),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn unsupported_language_is_rejected() {
        assert!(parse(json!({"language": "fr"})).is_err());
    }
}
