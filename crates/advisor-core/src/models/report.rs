use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::constants::MAX_REPORT_RETRIES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "report_type", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Detailed,
    Executive,
    Cost,
    Security,
    Operations,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Detailed => "detailed",
            ReportType::Executive => "executive",
            ReportType::Cost => "cost",
            ReportType::Security => "security",
            ReportType::Operations => "operations",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReportType::Detailed => "Detailed",
            ReportType::Executive => "Executive Summary",
            ReportType::Cost => "Cost Optimization",
            ReportType::Security => "Security Assessment",
            ReportType::Operations => "Operational Excellence",
        }
    }
}

impl Display for ReportType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "detailed" => Ok(ReportType::Detailed),
            "executive" => Ok(ReportType::Executive),
            "cost" => Ok(ReportType::Cost),
            "security" => Ok(ReportType::Security),
            "operations" => Ok(ReportType::Operations),
            _ => Err(anyhow::anyhow!("Invalid report type: {}", s)),
        }
    }
}

/// Lifecycle of a report:
/// `pending -> uploaded -> processing -> generating -> completed`, with `failed`
/// reachable from the two working states and `cancelled` as a terminal branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "report_status", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Uploaded,
    Processing,
    Generating,
    Completed,
    Failed,
    Cancelled,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 7] = [
        ReportStatus::Pending,
        ReportStatus::Uploaded,
        ReportStatus::Processing,
        ReportStatus::Generating,
        ReportStatus::Completed,
        ReportStatus::Failed,
        ReportStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Uploaded => "uploaded",
            ReportStatus::Processing => "processing",
            ReportStatus::Generating => "generating",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
            ReportStatus::Cancelled => "cancelled",
        }
    }

    /// A pipeline run currently owns the report.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, ReportStatus::Processing | ReportStatus::Generating)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Cancelled)
    }

    /// Statuses from which `to` may be entered. Does not consider the retry budget;
    /// see [`ReportStatus::can_transition_to`].
    pub fn allowed_sources(to: ReportStatus) -> &'static [ReportStatus] {
        use ReportStatus::*;
        match to {
            Pending => &[],
            Uploaded => &[Pending, Uploaded, Completed, Failed],
            Processing => &[Uploaded, Failed],
            Generating => &[Uploaded, Processing, Completed, Failed],
            Completed => &[Generating],
            Failed => &[Processing, Generating],
            Cancelled => &[Pending, Uploaded, Failed],
        }
    }

    /// Transition check including the retry ceiling: a failed report only
    /// re-enters the pipeline while `retry_count` is below the cap.
    pub fn can_transition_to(&self, to: ReportStatus, retry_count: i32) -> bool {
        if !Self::allowed_sources(to).contains(self) {
            return false;
        }
        if *self == ReportStatus::Failed && to.is_in_progress() {
            return retry_count < MAX_REPORT_RETRIES;
        }
        true
    }
}

impl Display for ReportStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportStatus::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Invalid report status: {}", s))
    }
}

/// Rendered or source file attached to a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Csv,
    Html,
    Pdf,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Csv => "csv",
            ReportFormat::Html => "html",
            ReportFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Csv => "text/csv; charset=utf-8",
            ReportFormat::Html => "text/html; charset=utf-8",
            ReportFormat::Pdf => "application/pdf",
        }
    }
}

impl Display for ReportFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ReportFormat::Csv),
            "html" => Ok(ReportFormat::Html),
            "pdf" => Ok(ReportFormat::Pdf),
            _ => Err(anyhow::anyhow!("Unsupported format: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Report {
    pub id: Uuid,
    pub client_id: Uuid,
    pub created_by: Option<Uuid>,
    pub title: String,
    pub report_type: ReportType,
    pub status: ReportStatus,
    pub template_id: Option<Uuid>,
    pub csv_file: Option<String>,
    pub html_file: Option<String>,
    pub pdf_file: Option<String>,
    pub analysis_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    pub fn file_key(&self, format: ReportFormat) -> Option<&str> {
        match format {
            ReportFormat::Csv => self.csv_file.as_deref(),
            ReportFormat::Html => self.html_file.as_deref(),
            ReportFormat::Pdf => self.pdf_file.as_deref(),
        }
    }

    pub fn available_formats(&self) -> Vec<ReportFormat> {
        [ReportFormat::Csv, ReportFormat::Html, ReportFormat::Pdf]
            .into_iter()
            .filter(|format| self.file_key(*format).is_some())
            .collect()
    }

    pub fn retries_remaining(&self) -> i32 {
        (MAX_REPORT_RETRIES - self.retry_count).max(0)
    }
}

/// Report joined with its client's name, as listed over the API
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportResponse {
    pub id: Uuid,
    pub client_id: Uuid,
    pub client_name: Option<String>,
    pub created_by: Option<Uuid>,
    pub title: String,
    pub report_type: ReportType,
    pub status: ReportStatus,
    pub template_id: Option<Uuid>,
    pub available_formats: Vec<ReportFormat>,
    pub analysis_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReportResponse {
    pub fn from_report(report: Report, client_name: Option<String>) -> Self {
        let available_formats = report.available_formats();
        ReportResponse {
            id: report.id,
            client_id: report.client_id,
            client_name,
            created_by: report.created_by,
            title: report.title,
            report_type: report.report_type,
            status: report.status,
            template_id: report.template_id,
            available_formats,
            analysis_data: report.analysis_data,
            error_message: report.error_message,
            retry_count: report.retry_count,
            processing_started_at: report.processing_started_at,
            processing_completed_at: report.processing_completed_at,
            created_at: report.created_at,
            updated_at: report.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct CreateReportRequest {
    pub client_id: Uuid,
    pub report_type: ReportType,
    #[validate(length(
        min = 1,
        max = 255,
        message = "Title must be between 1 and 255 characters"
    ))]
    pub title: Option<String>,
    pub template_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ReportListQuery {
    pub client_id: Option<Uuid>,
    pub status: Option<ReportStatus>,
    pub report_type: Option<ReportType>,
    /// Matches the report title or client name
    pub search: Option<String>,
    /// `created_at`, `updated_at`, `title`, `status`; prefix with `-` for descending
    pub ordering: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct GenerateReportRequest {
    /// Queue the work and return a task id instead of waiting
    #[serde(default, rename = "async")]
    pub run_async: bool,
    /// Rendered outputs; defaults to HTML and PDF
    #[serde(default)]
    pub formats: Option<Vec<ReportFormat>>,
}

impl GenerateReportRequest {
    /// Requested render formats, deduplicated, CSV excluded.
    pub fn render_formats(&self) -> Vec<ReportFormat> {
        let requested = self
            .formats
            .clone()
            .unwrap_or_else(|| vec![ReportFormat::Html, ReportFormat::Pdf]);
        let mut formats = Vec::new();
        for format in requested {
            if format != ReportFormat::Csv && !formats.contains(&format) {
                formats.push(format);
            }
        }
        formats
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerateAcceptedResponse {
    pub task_id: Uuid,
    pub report_id: Uuid,
    pub status: String,
    pub status_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReportStatus::*;

    #[test]
    fn happy_path_transitions() {
        assert!(Pending.can_transition_to(Uploaded, 0));
        assert!(Uploaded.can_transition_to(Processing, 0));
        assert!(Processing.can_transition_to(Generating, 0));
        assert!(Generating.can_transition_to(Completed, 0));
    }

    #[test]
    fn cannot_skip_upload() {
        assert!(!Pending.can_transition_to(Processing, 0));
        assert!(!Pending.can_transition_to(Generating, 0));
        assert!(!Pending.can_transition_to(Completed, 0));
    }

    #[test]
    fn cancelled_is_terminal() {
        for to in ReportStatus::ALL {
            assert!(!Cancelled.can_transition_to(to, 0), "cancelled -> {}", to);
        }
    }

    #[test]
    fn in_progress_reports_cannot_be_cancelled_or_reuploaded() {
        assert!(!Processing.can_transition_to(Cancelled, 0));
        assert!(!Generating.can_transition_to(Uploaded, 0));
    }

    #[test]
    fn failed_retry_respects_ceiling() {
        assert!(Failed.can_transition_to(Processing, 4));
        assert!(!Failed.can_transition_to(Processing, MAX_REPORT_RETRIES));
        assert!(!Failed.can_transition_to(Generating, MAX_REPORT_RETRIES));
        // a fresh CSV resets the budget
        assert!(Failed.can_transition_to(Uploaded, MAX_REPORT_RETRIES));
    }

    #[test]
    fn completed_reports_can_be_regenerated() {
        assert!(Completed.can_transition_to(Generating, 0));
        assert!(!Completed.can_transition_to(Completed, 0));
    }

    #[test]
    fn generate_request_defaults_and_dedupes() {
        let req: GenerateReportRequest = serde_json::from_str("{}").unwrap();
        assert!(!req.run_async);
        assert_eq!(req.render_formats(), vec![ReportFormat::Html, ReportFormat::Pdf]);

        let req: GenerateReportRequest =
            serde_json::from_str(r#"{"async": true, "formats": ["pdf", "pdf", "csv"]}"#).unwrap();
        assert!(req.run_async);
        assert_eq!(req.render_formats(), vec![ReportFormat::Pdf]);
    }

    #[test]
    fn status_parses() {
        assert_eq!("generating".parse::<ReportStatus>().unwrap(), Generating);
        assert!("done".parse::<ReportStatus>().is_err());
    }
}
