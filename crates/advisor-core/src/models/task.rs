use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::report::ReportFormat;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    GenerateReport,
    PurgeReportFiles,
}

impl Display for TaskType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskType::GenerateReport => write!(f, "generate_report"),
            TaskType::PurgeReportFiles => write!(f, "purge_report_files"),
        }
    }
}

impl FromStr for TaskType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generate_report" => Ok(TaskType::GenerateReport),
            "purge_report_files" => Ok(TaskType::PurgeReportFiles),
            _ => Err(anyhow::anyhow!("Invalid task type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "task_status", rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Scheduled,
    Cancelled,
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Scheduled => write!(f, "scheduled"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "scheduled" => Ok(TaskStatus::Scheduled),
            "cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid task status: {}", s)),
        }
    }
}

/// Task state as reported to polling clients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    Pending,
    Started,
    Success,
    Failure,
    Retry,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 3,
    #[default]
    Normal = 5,
    High = 7,
}

impl Priority {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub priority: i32,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub timeout_seconds: Option<i32>,
    pub report_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Task {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Task {
            id: row.try_get("id")?,
            task_type: row.try_get::<String, _>("task_type")?.parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse task_type: {}", e).into())
            })?,
            status: row.try_get("status")?,
            priority: row.try_get("priority")?,
            payload: row.try_get("payload")?,
            result: row.try_get("result")?,
            scheduled_at: row.try_get("scheduled_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            timeout_seconds: row.try_get("timeout_seconds")?,
            report_id: row.try_get("report_id")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl Task {
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Maps the queue status onto the five polling states.
    pub fn state(&self) -> TaskState {
        match self.status {
            TaskStatus::Pending | TaskStatus::Scheduled if self.retry_count > 0 => TaskState::Retry,
            TaskStatus::Pending | TaskStatus::Scheduled => TaskState::Pending,
            TaskStatus::Running => TaskState::Started,
            TaskStatus::Completed => TaskState::Success,
            TaskStatus::Failed | TaskStatus::Cancelled => TaskState::Failure,
        }
    }

    /// Failure text recorded by the worker in `result.error`.
    pub fn error_message(&self) -> Option<String> {
        if !matches!(self.status, TaskStatus::Failed | TaskStatus::Cancelled)
            && self.retry_count == 0
        {
            return None;
        }
        self.result
            .as_ref()
            .and_then(|r| r.get("error"))
            .and_then(|e| e.as_str())
            .map(String::from)
    }

    pub fn try_payload_as<P: TaskPayload>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    pub fn payload_from<P: TaskPayload>(payload: &P) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(payload)
    }
}

/// Typed payload stored in `tasks.payload`
pub trait TaskPayload: Serialize + for<'de> Deserialize<'de> {
    fn task_type() -> TaskType;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateReportPayload {
    pub report_id: Uuid,
    pub formats: Vec<ReportFormat>,
}

impl TaskPayload for GenerateReportPayload {
    fn task_type() -> TaskType {
        TaskType::GenerateReport
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurgeReportFilesPayload {
    pub report_id: Uuid,
    pub storage_keys: Vec<String>,
}

impl TaskPayload for PurgeReportFilesPayload {
    fn task_type() -> TaskType {
        TaskType::PurgeReportFiles
    }
}

/// Polling view of a task
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub task_type: TaskType,
    pub state: TaskState,
    pub status: TaskStatus,
    pub report_id: Option<Uuid>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Task> for TaskStatusResponse {
    fn from(task: Task) -> Self {
        TaskStatusResponse {
            state: task.state(),
            error: task.error_message(),
            task_id: task.id,
            task_type: task.task_type,
            status: task.status,
            report_id: task.report_id,
            result: task.result,
            retry_count: task.retry_count,
            max_retries: task.max_retries,
            scheduled_at: task.scheduled_at,
            created_at: task.created_at,
            started_at: task.started_at,
            completed_at: task.completed_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TaskStats {
    pub total: i64,
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub scheduled: i64,
    pub cancelled: i64,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct TaskListQuery {
    pub status: Option<TaskStatus>,
    pub report_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Default for TaskListQuery {
    fn default() -> Self {
        Self {
            status: None,
            report_id: None,
            limit: Some(50),
            offset: Some(0),
        }
    }
}
