//! Advisor Core Library
//!
//! Domain models, error types and configuration shared by every crate of the
//! Azure Advisor reports platform.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;
pub mod task_error;

pub use config::{BaseConfig, Config, ServiceConfig};
pub use error::{AppError, ErrorMetadata, FieldErrors, LogLevel};
pub use storage_types::StorageBackend;
pub use task_error::{TaskError, TaskResultExt};
