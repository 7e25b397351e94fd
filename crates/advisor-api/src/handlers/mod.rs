pub mod analytics;
pub mod auth;
pub mod clients;
pub mod recommendations;
pub mod reports;
pub mod shares;
pub mod tasks;
pub mod templates;
pub mod users;

use advisor_core::AppError;
use uuid::Uuid;

pub(crate) fn not_found(kind: &str, id: Uuid) -> AppError {
    tracing::debug!(kind, id = %id, "Resource not found");
    AppError::NotFound(format!("{} not found", kind))
}
