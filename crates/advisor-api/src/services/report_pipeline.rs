//! Report generation: uploaded CSV to stored recommendations to rendered files.
//!
//! A run first claims the report with a compare-and-set status update, so the
//! HTTP handler and queue workers can call [`ReportPipeline::run`] concurrently
//! and only one of them proceeds. Any failure after the claim marks the report
//! `failed` and consumes one retry. The claimed part runs on a spawned task,
//! so it always reaches a terminal status even if the caller stops waiting.

use crate::state::{DbState, FileState};
use advisor_core::models::{
    AnalysisSummary, NewRecommendation, Report, ReportFormat, ReportStatus,
};
use advisor_core::{AppError, ErrorMetadata};
use advisor_processing::{summarize, CsvImporter, HtmlRenderer, RenderContext};
use advisor_storage::keys::report_file_key;
use advisor_storage::Storage;
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Longest failure message kept on the report.
const MAX_FAILURE_MESSAGE_LEN: usize = 2000;

#[derive(Clone)]
pub struct ReportPipeline {
    db: DbState,
    storage: Arc<dyn Storage>,
    max_csv_rows: usize,
}

impl ReportPipeline {
    pub fn new(db: DbState, files: &FileState) -> Self {
        Self {
            db,
            storage: files.storage.clone(),
            max_csv_rows: files.max_csv_rows,
        }
    }

    /// Rejects format selections this server cannot produce.
    pub fn check_formats(formats: &[ReportFormat]) -> Result<(), AppError> {
        if formats.is_empty() {
            return Err(AppError::field(
                "formats",
                "Choose at least one output format (html, pdf)",
            ));
        }
        #[cfg(not(feature = "pdf"))]
        if formats.contains(&ReportFormat::Pdf) {
            return Err(AppError::BadRequest(
                "PDF rendering is not enabled on this server".to_string(),
            ));
        }
        Ok(())
    }

    /// Status a run of `report` would start in: `processing` until the CSV has
    /// been ingested, `generating` afterwards.
    pub async fn entry_status(&self, report: &Report) -> Result<ReportStatus, AppError> {
        if report.csv_file.is_none() {
            return Err(AppError::BadRequest(
                "Upload a CSV file before generating the report".to_string(),
            ));
        }
        let ingested = self
            .db
            .recommendation_repository
            .count_for_report(report.id)
            .await?;
        Ok(if ingested == 0 {
            ReportStatus::Processing
        } else {
            ReportStatus::Generating
        })
    }

    /// Preflight used before queueing: same checks as a run, without claiming.
    pub async fn check_startable(
        &self,
        report: &Report,
        formats: &[ReportFormat],
    ) -> Result<ReportStatus, AppError> {
        Self::check_formats(formats)?;
        let target = self.entry_status(report).await?;
        if !report.status.can_transition_to(target, report.retry_count) {
            return Err(self.not_startable(report));
        }
        Ok(target)
    }

    fn not_startable(&self, report: &Report) -> AppError {
        if report.status == ReportStatus::Failed && report.retries_remaining() == 0 {
            AppError::Conflict(format!(
                "Report has failed {} times; upload a new CSV file to try again",
                report.retry_count
            ))
        } else {
            AppError::Conflict(format!(
                "Report status is {}, it cannot be generated now",
                report.status
            ))
        }
    }

    #[tracing::instrument(skip(self, formats), fields(report.id = %report_id))]
    pub async fn run(&self, report_id: Uuid, formats: &[ReportFormat]) -> Result<Report, AppError> {
        Self::check_formats(formats)?;
        let report = self
            .db
            .report_repository
            .get(report_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Report not found".to_string()))?;
        let target = self.entry_status(&report).await?;
        let report = self.db.report_repository.begin_run(report_id, target).await?;

        // Once claimed, the run settles the report on its own task: a caller
        // that times out or is dropped must not leave it in processing/generating.
        let pipeline = self.clone();
        let formats = formats.to_vec();
        tokio::spawn(async move { pipeline.settle(report, &formats).await })
            .await
            .map_err(|e| AppError::Internal(format!("Report pipeline task failed: {}", e)))?
    }

    async fn settle(&self, report: Report, formats: &[ReportFormat]) -> Result<Report, AppError> {
        let report_id = report.id;
        let started = std::time::Instant::now();
        match self.execute(report, formats).await {
            Ok(done) => {
                tracing::info!(
                    report_id = %report_id,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Report pipeline finished"
                );
                Ok(done)
            }
            Err(err) => {
                let message = failure_message(&err);
                if let Err(mark_err) = self
                    .db
                    .report_repository
                    .mark_failed(report_id, &message)
                    .await
                {
                    tracing::error!(
                        report_id = %report_id,
                        error = %mark_err,
                        "Failed to record report failure"
                    );
                }
                Err(err)
            }
        }
    }

    async fn execute(&self, report: Report, formats: &[ReportFormat]) -> Result<Report, AppError> {
        let (recommendations, summary) = if report.status == ReportStatus::Processing {
            self.ingest(&report).await?
        } else {
            self.load_ingested(&report).await?
        };
        self.render(&report, recommendations, summary, formats).await
    }

    async fn ingest(
        &self,
        report: &Report,
    ) -> Result<(Vec<NewRecommendation>, AnalysisSummary), AppError> {
        let key = report
            .csv_file
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("Report has no CSV file".to_string()))?;
        let data = self.storage.get(key).await?;

        let importer = CsvImporter::new(self.max_csv_rows);
        let (recommendations, summary) = tokio::task::spawn_blocking(move || {
            importer.parse(&data).map(|rows| {
                let summary = summarize(&rows);
                (rows, summary)
            })
        })
        .await
        .map_err(|e| AppError::Internal(format!("CSV import task failed: {}", e)))??;

        let analysis = serde_json::to_value(&summary)?;
        self.db
            .report_repository
            .complete_ingestion(report.id, &recommendations, analysis)
            .await?;
        Ok((recommendations, summary))
    }

    async fn load_ingested(
        &self,
        report: &Report,
    ) -> Result<(Vec<NewRecommendation>, AnalysisSummary), AppError> {
        let recommendations: Vec<NewRecommendation> = self
            .db
            .recommendation_repository
            .list_for_report(report.id)
            .await?
            .into_iter()
            .map(NewRecommendation::from)
            .collect();
        let summary = summarize(&recommendations);
        if report.analysis_data.is_none() {
            self.db
                .report_repository
                .set_analysis(report.id, serde_json::to_value(&summary)?)
                .await?;
        }
        Ok((recommendations, summary))
    }

    async fn render(
        &self,
        report: &Report,
        recommendations: Vec<NewRecommendation>,
        summary: AnalysisSummary,
        formats: &[ReportFormat],
    ) -> Result<Report, AppError> {
        let (_, client_name) = self
            .db
            .report_repository
            .get_with_client_name(report.id)
            .await?
            .ok_or_else(|| AppError::NotFound("Report not found".to_string()))?;
        let template = self
            .db
            .template_repository
            .find_for_report(report.template_id, report.report_type)
            .await?;

        let ctx = RenderContext {
            title: report.title.clone(),
            client_name,
            report_type: report.report_type,
            generated_at: Utc::now(),
            summary,
            recommendations,
        };

        let mut html_key: Option<String> = None;
        if formats.contains(&ReportFormat::Html) {
            let html = HtmlRenderer::new().render(&ctx, template.as_ref())?;
            html_key = Some(self.store(report.id, ReportFormat::Html, html.into_bytes()).await?);
        }

        #[cfg_attr(not(feature = "pdf"), allow(unused_mut))]
        let mut pdf_key: Option<String> = None;
        #[cfg(feature = "pdf")]
        if formats.contains(&ReportFormat::Pdf) {
            let pdf_ctx = ctx.clone();
            let pdf = tokio::task::spawn_blocking(move || {
                advisor_processing::PdfRenderer::new().render(&pdf_ctx)
            })
            .await
            .map_err(|e| AppError::Internal(format!("PDF render task failed: {}", e)))??;
            pdf_key = Some(self.store(report.id, ReportFormat::Pdf, pdf).await?);
        }

        // outputs not produced this time are dropped so downloads never serve a stale file
        for (format, fresh) in [
            (ReportFormat::Html, html_key.is_some()),
            (ReportFormat::Pdf, pdf_key.is_some()),
        ] {
            if fresh {
                continue;
            }
            if let Some(old) = report.file_key(format) {
                if let Err(e) = self.storage.delete(old).await {
                    tracing::warn!(report_id = %report.id, key = %old, error = %e, "Failed to delete stale output");
                }
            }
        }

        self.db
            .report_repository
            .mark_completed(report.id, html_key.as_deref(), pdf_key.as_deref())
            .await
    }

    async fn store(
        &self,
        report_id: Uuid,
        format: ReportFormat,
        data: Vec<u8>,
    ) -> Result<String, AppError> {
        let key = report_file_key(report_id, format);
        let size = data.len();
        self.storage
            .put(&key, Bytes::from(data), format.content_type())
            .await?;
        tracing::debug!(report_id = %report_id, format = %format, size, "Report output stored");
        Ok(key)
    }
}

/// Text stored in `reports.error_message`.
fn failure_message(err: &AppError) -> String {
    let message = match err {
        AppError::CsvFormat {
            message,
            row_errors,
        } if !row_errors.is_empty() => format!("{}: {}", message, row_errors.join("; ")),
        err if err.is_sensitive() => err.client_message(),
        err => err.to_string(),
    };
    if message.len() <= MAX_FAILURE_MESSAGE_LEN {
        return message;
    }
    let mut end = MAX_FAILURE_MESSAGE_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &message[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_failures_keep_row_details() {
        let message = failure_message(&AppError::CsvFormat {
            message: "2 rows could not be imported".to_string(),
            row_errors: vec!["line 3: unknown category".to_string()],
        });
        assert_eq!(message, "2 rows could not be imported: line 3: unknown category");
    }

    #[test]
    fn internal_failures_are_not_leaked() {
        let message = failure_message(&AppError::Internal("pool timed out at 10.0.0.4".to_string()));
        assert!(!message.contains("10.0.0.4"));
    }

    #[test]
    fn long_messages_are_truncated_on_a_char_boundary() {
        let message = failure_message(&AppError::BadRequest("é".repeat(3000)));
        assert!(message.len() <= MAX_FAILURE_MESSAGE_LEN + 3);
        assert!(message.ends_with("..."));
    }

    #[test]
    fn empty_format_list_is_rejected() {
        let err = ReportPipeline::check_formats(&[]).unwrap_err();
        assert!(err.field_errors().unwrap().contains_key("formats"));
        assert!(ReportPipeline::check_formats(&[ReportFormat::Html]).is_ok());
    }
}
