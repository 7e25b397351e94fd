//! Storage abstraction trait

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<StorageError> for advisor_core::AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => {
                advisor_core::AppError::NotFound(format!("Stored file {} not found", key))
            }
            StorageError::InvalidKey(msg) => advisor_core::AppError::InvalidInput(msg),
            other => advisor_core::AppError::Storage(other.to_string()),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Blob storage used for source CSVs and rendered reports.
///
/// Keys are relative paths such as `reports/{id}/report.pdf`; see [`crate::keys`].
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write `data` at `key`, replacing any existing object.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Stream an object in chunks, for downloads served over HTTP.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Delete an object. Missing objects are not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Cheap round trip used by `/health`.
    async fn health_check(&self) -> StorageResult<()>;

    fn backend_type(&self) -> StorageBackend;
}
