mod purge_handler;
mod report_handler;

pub use purge_handler::PurgeReportFilesHandler;
pub use report_handler::GenerateReportHandler;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::state::AppState;
use advisor_core::models::Task;

/// One implementation per task type.
///
/// CPU-heavy steps (CSV parsing, PDF layout) belong in
/// `tokio::task::spawn_blocking` so they do not stall the runtime.
#[async_trait]
pub trait TaskHandler {
    async fn process(&self, task: &Task, state: Arc<AppState>) -> Result<serde_json::Value>;
}
