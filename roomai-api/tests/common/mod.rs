//! Shared helpers for roomai-api integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use roomai_api::models::{JobRecord, Language, RoomAnalysis};
use roomai_api::providers::{
    CatalogFurnitureMatcher, ImageGenerator, ImageInput, ImageRequest, ProviderError, Providers,
    Region, SegmentationMask, Segmenter, TemplateConceptGenerator, VisionAnalyzer,
};
use roomai_api::storage::LocalStorage;
use roomai_api::store::MemoryJobStore;
use roomai_api::AppState;
use roomai_common::config::{StoreBackend, TomlConfig};
use roomai_common::events::EventBus;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const BOUNDARY: &str = "roomai-test-boundary";

/// Smallest byte prefix recognised as PNG
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";

pub struct StaticVision;

#[async_trait]
impl VisionAnalyzer for StaticVision {
    fn name(&self) -> &str {
        "static"
    }

    async fn analyze(
        &self,
        _image: &ImageInput,
        _language: Language,
    ) -> Result<RoomAnalysis, ProviderError> {
        Ok(RoomAnalysis::demo())
    }
}

pub struct OfflineVision;

#[async_trait]
impl VisionAnalyzer for OfflineVision {
    fn name(&self) -> &str {
        "offline"
    }

    async fn analyze(
        &self,
        _image: &ImageInput,
        _language: Language,
    ) -> Result<RoomAnalysis, ProviderError> {
        Err(ProviderError::Exhausted(vec!["offline: no route".to_string()]))
    }
}

pub struct NoSegmentation;

#[async_trait]
impl Segmenter for NoSegmentation {
    async fn segment(
        &self,
        _image: &ImageInput,
    ) -> Result<Option<SegmentationMask>, ProviderError> {
        Ok(None)
    }
}

pub struct NumberedImages;

#[async_trait]
impl ImageGenerator for NumberedImages {
    fn name(&self) -> &str {
        "numbered"
    }

    async fn generate(&self, request: &ImageRequest) -> Result<String, ProviderError> {
        Ok(format!("https://img.test/{}.png", request.style))
    }
}

pub fn fake_providers() -> Providers {
    Providers {
        vision: Arc::new(StaticVision),
        segmentation: Arc::new(NoSegmentation),
        concepts: Arc::new(TemplateConceptGenerator::new(None)),
        images: Arc::new(NumberedImages),
        furniture: Arc::new(CatalogFurnitureMatcher::new(None, Region::Ca)),
    }
}

pub fn test_config() -> TomlConfig {
    let mut config = TomlConfig::default();
    config.store.backend = StoreBackend::Memory;
    config.pipeline.stage_timeout_secs = 5;
    config.pipeline.image_request_delay_ms = 0;
    config
}

pub fn test_state(dir: &Path, config: TomlConfig, providers: Providers) -> AppState {
    AppState::new(
        Arc::new(MemoryJobStore::new()),
        EventBus::new(256),
        LocalStorage::new(dir.join("uploads")),
        providers,
        config,
    )
}

/// Multipart upload request with one file part and optional extra text fields
pub fn upload_request(
    uri: &str,
    content_type: &str,
    filename: &str,
    bytes: &[u8],
    fields: &[(&str, &str)],
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    use tower::util::ServiceExt;
    app.clone().oneshot(request).await.unwrap()
}

/// Poll the store until the job is completed or failed
pub async fn wait_for_terminal(state: &AppState, id: Uuid) -> JobRecord {
    for _ in 0..500 {
        let job = state.store.get(id).await.unwrap().unwrap();
        if job.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish", id);
}
