//! roomai-api library interface
//!
//! Exposes the router, state and building blocks for integration testing.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod retention;
pub mod storage;
pub mod store;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use roomai_common::config::TomlConfig;
use roomai_common::events::EventBus;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::pipeline::{JobExecutor, PipelineContext, PipelineRunner};
use crate::providers::Providers;
use crate::storage::{LocalStorage, UPLOADS_URL_PREFIX};
use crate::store::JobStore;

/// Room for multipart boundaries and text fields on top of the image itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub executor: JobExecutor,
    pub storage: LocalStorage,
    pub providers: Providers,
    pub config: Arc<TomlConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn JobStore>,
        event_bus: EventBus,
        storage: LocalStorage,
        providers: Providers,
        config: TomlConfig,
    ) -> Self {
        let recovery = PipelineRunner::new(
            store.clone(),
            event_bus.clone(),
            Duration::from_secs(config.pipeline.stage_timeout_secs),
        );
        Self {
            executor: JobExecutor::new(config.pipeline.max_concurrent_jobs).with_recovery(recovery),
            store,
            event_bus,
            storage,
            providers,
            config: Arc::new(config),
            startup_time: Utc::now(),
        }
    }

    /// Everything a pipeline run needs, detached from the HTTP layer
    pub fn pipeline_context(&self) -> PipelineContext {
        PipelineContext {
            store: self.store.clone(),
            events: self.event_bus.clone(),
            providers: self.providers.clone(),
            storage: self.storage.clone(),
            settings: self.config.pipeline.clone(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.upload.max_bytes + MULTIPART_OVERHEAD_BYTES;
    let uploads = ServeDir::new(state.storage.base_dir());

    Router::new()
        .route("/", get(api::root))
        .merge(api::health_routes())
        .merge(api::analysis_routes())
        .merge(api::design_routes())
        .merge(api::furniture_routes())
        .route("/api/v1/jobs/events", get(api::job_events))
        .nest_service(UPLOADS_URL_PREFIX, uploads)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
