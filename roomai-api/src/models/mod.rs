//! Data models for roomai-api
//!
//! - Job records and partial updates (store contract)
//! - Room analysis payloads and results
//! - Design preferences, concepts and proposals

pub mod analysis;
pub mod design;
pub mod job;

pub use analysis::{AnalysisInput, Language, RoomAnalysis, RoomAnalysisResult, RoomDimensions};
pub use design::{
    DesignConcept, DesignInput, DesignPreferences, DesignProposal, FurnitureItem, FurnitureLink,
    StyleChoice,
};
pub use job::{JobRecord, JobUpdate, ResolvedUpdate};
