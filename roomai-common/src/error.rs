//! Common error types for RoomAI

use thiserror::Error;

/// Common result type for RoomAI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across RoomAI services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Job status change that would move a job backwards or re-open a finished job
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// JSON encode/decode failure for stored payloads and results
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the error only means "no such record"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
