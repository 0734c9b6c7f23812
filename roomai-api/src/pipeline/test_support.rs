//! Fake providers and a ready-made context for pipeline tests

use async_trait::async_trait;
use roomai_common::config::PipelineConfig;
use roomai_common::events::EventBus;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::PipelineContext;
use crate::models::{FurnitureItem, Language, RoomAnalysis};
use crate::providers::furniture::{FurnitureMatcher, FurnitureRequest};
use crate::providers::{
    CatalogFurnitureMatcher, ImageGenerator, ImageInput, ImageRequest, ProviderError, Providers,
    Region, SegmentationMask, Segmenter, TemplateConceptGenerator, VisionAnalyzer,
};
use crate::storage::LocalStorage;
use crate::store::MemoryJobStore;

pub struct FakeVision {
    fail: bool,
    /// Languages the analyzer was asked for, in call order
    pub languages: Mutex<Vec<Language>>,
}

impl FakeVision {
    pub fn demo() -> Self {
        Self {
            fail: false,
            languages: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            languages: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VisionAnalyzer for FakeVision {
    fn name(&self) -> &str {
        "fake"
    }

    async fn analyze(
        &self,
        _image: &ImageInput,
        language: Language,
    ) -> Result<RoomAnalysis, ProviderError> {
        self.languages.lock().unwrap().push(language);
        if self.fail {
            Err(ProviderError::Exhausted(vec!["fake: offline".to_string()]))
        } else {
            Ok(RoomAnalysis::demo())
        }
    }
}

pub struct FakeSegmenter {
    outcome: Result<Option<Vec<u8>>, ()>,
}

impl FakeSegmenter {
    pub fn none() -> Self {
        Self { outcome: Ok(None) }
    }

    pub fn mask(png: &[u8]) -> Self {
        Self {
            outcome: Ok(Some(png.to_vec())),
        }
    }

    pub fn failing() -> Self {
        Self { outcome: Err(()) }
    }
}

#[async_trait]
impl Segmenter for FakeSegmenter {
    async fn segment(
        &self,
        _image: &ImageInput,
    ) -> Result<Option<SegmentationMask>, ProviderError> {
        match &self.outcome {
            Ok(png) => Ok(png.clone().map(|png| SegmentationMask {
                label: "wall".to_string(),
                score: 0.9,
                png,
            })),
            Err(()) => Err(ProviderError::Api(503, "model loading".to_string())),
        }
    }
}

/// Records every request and answers with numbered URLs
#[derive(Default)]
pub struct FakeImages {
    pub requests: Mutex<Vec<ImageRequest>>,
}

#[async_trait]
impl ImageGenerator for FakeImages {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, request: &ImageRequest) -> Result<String, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        Ok(format!("https://img.test/{}.png", requests.len()))
    }
}

pub struct FailingFurniture;

#[async_trait]
impl FurnitureMatcher for FailingFurniture {
    async fn match_furniture(
        &self,
        _request: &FurnitureRequest,
    ) -> Result<Vec<FurnitureItem>, ProviderError> {
        Err(ProviderError::Timeout)
    }
}

pub fn providers() -> Providers {
    Providers {
        vision: Arc::new(FakeVision::demo()),
        segmentation: Arc::new(FakeSegmenter::none()),
        concepts: Arc::new(TemplateConceptGenerator::new(None)),
        images: Arc::new(FakeImages::default()),
        furniture: Arc::new(CatalogFurnitureMatcher::new(None, Region::Ca)),
    }
}

/// Context over an in-memory store and storage under `dir`
pub fn context(dir: &Path, customize: impl FnOnce(&mut Providers)) -> PipelineContext {
    let mut providers = providers();
    customize(&mut providers);
    PipelineContext {
        store: Arc::new(MemoryJobStore::new()),
        events: EventBus::new(256),
        providers,
        storage: LocalStorage::new(dir.join("uploads")),
        settings: PipelineConfig {
            stage_timeout_secs: 5,
            image_request_delay_ms: 0,
            ..PipelineConfig::default()
        },
    }
}
