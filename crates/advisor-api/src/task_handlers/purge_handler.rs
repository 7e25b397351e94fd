use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use advisor_core::models::{PurgeReportFilesPayload, Task};
use advisor_core::TaskResultExt;
use advisor_storage::StorageError;

use super::TaskHandler;
use crate::state::AppState;

/// Deletes the stored files of a report that no longer exists.
pub struct PurgeReportFilesHandler;

#[async_trait]
impl TaskHandler for PurgeReportFilesHandler {
    #[tracing::instrument(skip(self, task, state), fields(task.id = %task.id))]
    async fn process(&self, task: &Task, state: Arc<AppState>) -> Result<serde_json::Value> {
        let payload: PurgeReportFilesPayload = task
            .try_payload_as()
            .unrecoverable()
            .map_err(anyhow::Error::new)?;

        let mut deleted = 0usize;
        for key in &payload.storage_keys {
            match state.files.storage.delete(key).await {
                Ok(()) | Err(StorageError::NotFound(_)) => deleted += 1,
                Err(e) => {
                    tracing::warn!(report_id = %payload.report_id, key = %key, error = %e, "Failed to delete report file");
                    return Err(anyhow::Error::new(e).context(format!("Failed to delete {}", key)));
                }
            }
        }

        tracing::info!(report_id = %payload.report_id, files = deleted, "Report files purged");
        Ok(json!({
            "report_id": payload.report_id,
            "deleted": deleted,
        }))
    }
}
