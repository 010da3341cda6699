//! Error types for storage collaborators.

use thiserror::Error;

/// Result type alias using StorageError.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid storage configuration: {0}")]
    Config(String),

    #[error("Failed to read local file: {0}")]
    LocalRead(#[from] std::io::Error),

    #[error("Object storage error: {0}")]
    ObjectStore(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Index rejected update with status {status}: {body}")]
    IndexRejected { status: u16, body: String },

    #[error("Unexpected index response: {0}")]
    InvalidResponse(String),
}
