//! Error types for the harvesting crate.

use thiserror::Error;

use harvest_common::{HarvestError, TimeParseError};
use netcdf_parser::NetCdfError;
use storage::StorageError;

/// Errors raised while synchronizing a dataset.
///
/// Only the catalog, snapshot and configuration variants abort a run; every
/// other variant is confined to the catalog entry that produced it.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Catalog request failed: {0}")]
    Catalog(String),

    #[error("Failed to parse catalog feed: {0}")]
    FeedParse(String),

    #[error("Index snapshot failed: {0}")]
    Snapshot(String),

    #[error(transparent)]
    Config(#[from] HarvestError),

    #[error("Catalog entry rejected: {0}")]
    Entry(String),

    #[error(transparent)]
    InvalidTime(#[from] TimeParseError),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Decompression failed: {0}")]
    Decompression(String),

    #[error("Failed to split aggregate: {0}")]
    Split(#[from] NetCdfError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl SyncError {
    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Catalog(_)
                | SyncError::FeedParse(_)
                | SyncError::Snapshot(_)
                | SyncError::Config(_)
        )
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Task(err.to_string())
    }
}

/// Result type for synchronization operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
