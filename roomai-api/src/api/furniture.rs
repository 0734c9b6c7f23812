//! Furniture matching API handlers
//!
//! POST /api/v1/furniture/match, GET /api/v1/furniture/demo/items

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::{FurnitureItem, Language};
use crate::providers::FurnitureRequest;
use crate::AppState;

const DEFAULT_ROOM_TYPE: &str = "living";

/// POST /api/v1/furniture/match request
#[derive(Debug, Deserialize)]
pub struct MatchFurnitureRequest {
    pub style: String,
    #[serde(default)]
    pub room_type: Option<String>,
    pub budget: f64,
    /// Furniture the user already owns and keeps
    #[serde(default, alias = "existing_furniture")]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MatchFurnitureResponse {
    pub matches: Vec<FurnitureItem>,
    pub total_cost: f64,
    pub within_budget: bool,
}

impl MatchFurnitureRequest {
    fn into_request(self) -> ApiResult<FurnitureRequest> {
        let style = self.style.trim().to_lowercase();
        if style.is_empty() {
            return Err(ApiError::BadRequest("style must not be empty".to_string()));
        }
        if !self.budget.is_finite() || self.budget < 0.0 {
            return Err(ApiError::BadRequest(format!("Invalid budget: {}", self.budget)));
        }
        let language = match self.language.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            Some(raw) => raw.parse::<Language>()?,
            None => Language::default(),
        };
        let room_type = self
            .room_type
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_ROOM_TYPE.to_string());

        Ok(FurnitureRequest {
            style,
            room_type,
            budget: self.budget,
            user_needs: self.requirements.join(" "),
            exclude: self.exclude,
            language,
        })
    }
}

/// POST /api/v1/furniture/match
///
/// Runs the product matcher directly, outside any job.
pub async fn match_furniture(
    State(state): State<AppState>,
    request: Result<Json<MatchFurnitureRequest>, JsonRejection>,
) -> ApiResult<Json<MatchFurnitureResponse>> {
    let Json(request) = request.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let request = request.into_request()?;

    let matches = state
        .providers
        .furniture
        .match_furniture(&request)
        .await
        .map_err(|e| ApiError::Internal(format!("Furniture matching failed: {}", e)))?;

    let total_cost: f64 = matches.iter().map(|item| item.price).sum();
    tracing::info!(
        style = %request.style,
        room_type = %request.room_type,
        matches = matches.len(),
        total_cost,
        "Furniture matched"
    );

    Ok(Json(MatchFurnitureResponse {
        within_budget: total_cost <= request.budget,
        total_cost,
        matches,
    }))
}

/// GET /api/v1/furniture/demo/items
pub async fn get_demo_furniture() -> Json<Vec<FurnitureItem>> {
    Json(FurnitureItem::demo_items())
}

pub fn furniture_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/furniture/match", post(match_furniture))
        .route("/api/v1/furniture/demo/items", get(get_demo_furniture))
}
