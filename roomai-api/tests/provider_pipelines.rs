//! End-to-end pipeline runs against local stand-ins for the vendor APIs

mod common;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use common::*;
use roomai_api::build_router;
use roomai_api::config::ProviderCredentials;
use roomai_api::providers::Providers;
use roomai_common::events::RoomAiEvent;
use roomai_common::JobStatus;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const API_KEY: &str = "sk-test";

#[derive(Clone, Default)]
struct OpenAiStub {
    chats: Arc<AtomicUsize>,
    images: Arc<AtomicUsize>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", API_KEY))
}

async fn chat(
    State(stub): State<OpenAiStub>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    stub.chats.fetch_add(1, Ordering::SeqCst);
    let image_url = body["messages"][0]["content"][1]["image_url"]["url"]
        .as_str()
        .unwrap_or_default();
    assert!(image_url.starts_with("data:image/png;base64,"));

    let analysis = json!({
        "room_type": "bedroom",
        "dimensions": {"width": 3.6, "length": 4.0, "height": 2.7},
        "existing_furniture": ["bed", "wardrobe"],
        "current_style": "minimal",
        "lighting": "north window",
        "problems": ["clutter"],
        "potential": "add shelving",
        "confidence": 0.81
    });
    Ok(Json(json!({
        "choices": [{"message": {"content": format!("```json\n{}\n```", analysis)}}]
    })))
}

async fn images(
    State(stub): State<OpenAiStub>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let n = stub.images.fetch_add(1, Ordering::SeqCst) + 1;
    Ok(Json(json!({"data": [{"url": format!("https://cdn.test/dalle-{}.png", n)}]})))
}

async fn serve_stub(stub: OpenAiStub) -> String {
    let router = Router::new()
        .route("/v1/chat/completions", post(chat))
        .route("/v1/images/generations", post(images))
        .with_state(stub);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn analysis_then_design_through_openai() {
    let stub = OpenAiStub::default();
    let base_url = serve_stub(stub.clone()).await;

    let mut config = test_config();
    config.providers.openai_base_url = base_url;
    config.providers.requests_per_minute = 600;
    let credentials = ProviderCredentials {
        openai_api_key: Some(API_KEY.to_string()),
        ..ProviderCredentials::default()
    };
    let providers = Providers::from_config(&config, &credentials).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), config, providers);
    let mut events = state.event_bus.subscribe();
    let app = build_router(state.clone());

    // Room analysis
    let body = body_json(
        send(
            &app,
            upload_request("/api/v1/analysis/upload", "image/png", "room.png", PNG_BYTES, &[]),
        )
        .await,
    )
    .await;
    let analysis_id: Uuid = body["id"].as_str().unwrap().parse().unwrap();
    let analysis = wait_for_terminal(&state, analysis_id).await;
    assert_eq!(analysis.status, JobStatus::Completed, "{:?}", analysis.error);
    let result = analysis.result.unwrap();
    assert_eq!(result["room_type"], "bedroom");
    assert_eq!(result["segmentation_url"], Value::Null);
    assert_eq!(stub.chats.load(Ordering::SeqCst), 1);

    // Design generation building on it
    let body = body_json(
        send(
            &app,
            json_request(
                "POST",
                "/api/v1/design/generate",
                &json!({
                    "analysis_id": analysis_id.to_string(),
                    "preferences": {"style": "modern", "keep_furniture": ["沙发"]}
                }),
            ),
        )
        .await,
    )
    .await;
    let design_id: Uuid = body["id"].as_str().unwrap().parse().unwrap();
    let design = wait_for_terminal(&state, design_id).await;
    assert_eq!(design.status, JobStatus::Completed, "{:?}", design.error);

    let proposals = design.result.unwrap();
    let proposals = proposals.as_array().unwrap();
    assert_eq!(proposals.len(), 3);
    assert_eq!(proposals[0]["image_url"], "https://cdn.test/dalle-1.png");
    assert_eq!(proposals[2]["image_url"], "https://cdn.test/dalle-3.png");
    assert_eq!(stub.images.load(Ordering::SeqCst), 3);
    for item in proposals[0]["furniture"].as_array().unwrap() {
        assert!(!item["name"].as_str().unwrap().contains("沙发"));
    }

    // Lifecycle events for both jobs reached the bus
    let mut completed = Vec::new();
    while completed.len() < 2 {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        if let RoomAiEvent::JobCompleted { job_id, .. } = event {
            completed.push(job_id);
        }
    }
    assert_eq!(completed, vec![analysis_id, design_id]);
}

#[tokio::test]
async fn image_outage_falls_back_to_placeholders() {
    // Nothing listens on this address
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let mut config = test_config();
    config.providers.openai_base_url = dead_url;
    let credentials = ProviderCredentials {
        openai_api_key: Some(API_KEY.to_string()),
        ..ProviderCredentials::default()
    };
    let mut providers = Providers::from_config(&config, &credentials).unwrap();
    providers.vision = Arc::new(StaticVision);

    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), config, providers);
    let app = build_router(state.clone());

    let body = body_json(
        send(
            &app,
            json_request(
                "POST",
                "/api/v1/design/generate",
                &json!({"preferences": {"style": "nordic"}}),
            ),
        )
        .await,
    )
    .await;
    let id: Uuid = body["id"].as_str().unwrap().parse().unwrap();
    let job = wait_for_terminal(&state, id).await;
    assert_eq!(job.status, JobStatus::Completed, "{:?}", job.error);

    let result = job.result.unwrap();
    for proposal in result.as_array().unwrap() {
        assert_eq!(
            proposal["image_url"],
            roomai_api::providers::image_generation::placeholder_url("nordic")
        );
    }
}
