use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use advisor_core::models::{GenerateReportPayload, Task};
use advisor_core::{AppError, TaskError, TaskResultExt};

use super::TaskHandler;
use crate::services::ReportPipeline;
use crate::state::AppState;

pub struct GenerateReportHandler;

#[async_trait]
impl TaskHandler for GenerateReportHandler {
    #[tracing::instrument(skip(self, task, state), fields(task.id = %task.id, report.id = tracing::field::Empty))]
    async fn process(&self, task: &Task, state: Arc<AppState>) -> Result<serde_json::Value> {
        let payload: GenerateReportPayload = task
            .try_payload_as()
            .unrecoverable()
            .map_err(anyhow::Error::new)?;

        tracing::Span::current().record("report.id", payload.report_id.to_string());

        let pipeline = ReportPipeline::new(state.db.clone(), &state.files);
        // recoverability follows the error: bad CSV, missing file or a
        // cancelled report fail the task at once
        let report = match pipeline.run(payload.report_id, &payload.formats).await {
            Ok(report) => report,
            Err(err @ AppError::Conflict(_)) if report_is_busy(&state, payload.report_id).await => {
                // an earlier attempt of this task is still settling the report
                return Err(anyhow::Error::new(TaskError::recoverable(err)));
            }
            Err(err) => return Err(anyhow::Error::new(TaskError::from(err))),
        };

        Ok(json!({
            "report_id": report.id,
            "status": report.status,
            "available_formats": report.available_formats(),
        }))
    }
}

async fn report_is_busy(state: &AppState, report_id: Uuid) -> bool {
    matches!(
        state.db.report_repository.get(report_id).await,
        Ok(Some(report)) if report.status.is_in_progress()
    )
}
