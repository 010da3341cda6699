//! Error types shared by the harvesting crates.

use thiserror::Error;

use crate::time::TimeParseError;

/// Result type alias using HarvestError.
pub type HarvestResult<T> = Result<T, HarvestError>;

/// Primary error type for configuration and shared utilities.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Failed to read config {path}: {message}")]
    ConfigRead { path: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    InvalidTime(#[from] TimeParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
