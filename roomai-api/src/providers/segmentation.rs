//! Object segmentation (HuggingFace SAM)
//!
//! Segmentation is an enhancement: without a token the segmenter reports
//! `Ok(None)` and the analysis completes without a mask.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::sync::Arc;
use tracing::{debug, warn};

use super::huggingface::HuggingFaceClient;
use super::{ImageInput, ProviderError};

/// Decoded mask of the best segment
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMask {
    pub label: String,
    pub score: f64,
    pub png: Vec<u8>,
}

#[async_trait]
pub trait Segmenter: Send + Sync {
    /// `Ok(None)` when segmentation is not available
    async fn segment(&self, image: &ImageInput) -> Result<Option<SegmentationMask>, ProviderError>;
}

pub struct SamSegmenter {
    client: Option<Arc<HuggingFaceClient>>,
    endpoint: String,
}

impl SamSegmenter {
    pub fn new(client: Option<Arc<HuggingFaceClient>>, endpoint: String) -> Self {
        Self { client, endpoint }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }
}

#[async_trait]
impl Segmenter for SamSegmenter {
    async fn segment(&self, image: &ImageInput) -> Result<Option<SegmentationMask>, ProviderError> {
        let Some(client) = &self.client else {
            debug!("HuggingFace token not set, skipping segmentation");
            return Ok(None);
        };

        let mut segments = client.segment(&self.endpoint, &image.bytes).await?;
        segments.sort_by(|a, b| b.score.total_cmp(&a.score));

        for segment in segments {
            if segment.mask.is_empty() {
                continue;
            }
            match BASE64.decode(segment.mask.as_bytes()) {
                Ok(png) => {
                    return Ok(Some(SegmentationMask {
                        label: segment.label,
                        score: segment.score,
                        png,
                    }))
                }
                Err(e) => warn!(label = %segment.label, error = %e, "Undecodable SAM mask"),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_support::serve;
    use axum::{routing::post, Json, Router};
    use serde_json::json;

    #[tokio::test]
    async fn disabled_without_client() {
        let segmenter = SamSegmenter::new(None, "http://unused".to_string());
        assert!(!segmenter.is_enabled());
        let image = ImageInput::new(vec![1, 2, 3], "image/png");
        assert_eq!(segmenter.segment(&image).await.unwrap(), None);
    }

    #[tokio::test]
    async fn picks_highest_scoring_decodable_mask() {
        let router = Router::new().route(
            "/sam",
            post(|| async {
                Json(json!([
                    {"score": 0.5, "label": "floor", "mask": "Zmxvb3I="},
                    {"score": 0.99, "label": "broken", "mask": "%%%not-base64"},
                    {"score": 0.8, "label": "wall", "mask": "d2FsbA=="}
                ]))
            }),
        );
        let base = serve(router).await;
        let client = Arc::new(HuggingFaceClient::new("hf", 600).unwrap());
        let segmenter = SamSegmenter::new(Some(client), format!("{}/sam", base));

        let image = ImageInput::new(vec![1, 2, 3], "image/png");
        let mask = segmenter.segment(&image).await.unwrap().unwrap();
        assert_eq!(mask.label, "wall");
        assert_eq!(mask.png, b"wall");
    }
}
