//! TaskHandlerContext implementation for AppState.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use advisor_core::models::{Task, TaskType};
use advisor_worker::TaskHandlerContext;

use crate::state::AppState;
use crate::task_handlers::{GenerateReportHandler, PurgeReportFilesHandler, TaskHandler};

#[async_trait]
impl TaskHandlerContext for AppState {
    async fn dispatch_task(self: Arc<Self>, task: &Task) -> Result<serde_json::Value> {
        match task.task_type {
            TaskType::GenerateReport => GenerateReportHandler.process(task, self).await,
            TaskType::PurgeReportFiles => PurgeReportFilesHandler.process(task, self).await,
        }
    }
}
