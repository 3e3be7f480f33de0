//! Storage error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during result cache operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Write failed for {path}: {message}")]
    WriteFailed { path: PathBuf, message: String },

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    pub fn write_failed(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::WriteFailed {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn delete_failed(msg: impl Into<String>) -> Self {
        Self::DeleteFailed(msg.into())
    }
}
