//! # RoomAI Common Library
//!
//! Shared code for the RoomAI services:
//! - Error type shared by stores and services
//! - Bootstrap configuration (TOML) and root folder resolution
//! - Job vocabulary (kind, status state machine)
//! - Job event types and the broadcast EventBus
//! - SSE helpers

pub mod config;
pub mod error;
pub mod events;
pub mod job;
pub mod sse;

pub use error::{Error, Result};
pub use job::{JobKind, JobStatus};
