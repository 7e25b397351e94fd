//! Domain methods for the Advisor API client.
//!
//! Response types come from `advisor_core::models`; the few wrapper shapes that only
//! exist at the HTTP layer are defined here.

use crate::ApiClient;
use advisor_core::models::{
    Client, ClientListQuery, ClientStatus, ClientStatistics, CreateClientRequest, CreateReportRequest,
    DashboardStats, GenerateAcceptedResponse, GenerateReportRequest, LoginRequest, Paginated,
    ReportFormat, ReportListQuery, ReportResponse, ReportStatus, TaskStatusResponse,
    TokenResponse, UserResponse,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Matches `GET /tasks`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskStatusResponse>,
    pub count: usize,
}

/// Result of `POST /reports/{id}/generate`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerateOutcome {
    /// Async request: the work was queued
    Queued(GenerateAcceptedResponse),
    /// Synchronous request: the report as it stands after the run
    Finished(Box<ReportResponse>),
}

fn page_query(page: Option<i64>, page_size: Option<i64>) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(page) = page {
        query.push(("page", page.to_string()));
    }
    if let Some(size) = page_size {
        query.push(("page_size", size.to_string()));
    }
    query
}

impl ApiClient {
    /// Exchanges credentials for tokens. Does not change this client's token.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.post_json("/auth/login", &request).await
    }

    pub async fn me(&self) -> Result<UserResponse> {
        self.get("/auth/me", &[]).await
    }

    pub async fn list_clients(
        &self,
        filter: &ClientListQuery,
        page: Option<i64>,
        page_size: Option<i64>,
    ) -> Result<Paginated<Client>> {
        let mut query = page_query(page, page_size);
        if let Some(status) = filter.status {
            let status = match status {
                ClientStatus::Active => "active",
                ClientStatus::Inactive => "inactive",
            };
            query.push(("status", status.to_string()));
        }
        if let Some(industry) = &filter.industry {
            query.push(("industry", industry.clone()));
        }
        if let Some(search) = &filter.search {
            query.push(("search", search.clone()));
        }
        if let Some(ordering) = &filter.ordering {
            query.push(("ordering", ordering.clone()));
        }
        self.get("/clients", &query).await
    }

    pub async fn create_client(&self, request: &CreateClientRequest) -> Result<Client> {
        self.post_json("/clients", request).await
    }

    pub async fn get_client(&self, id: Uuid) -> Result<Client> {
        self.get(&format!("/clients/{}", id), &[]).await
    }

    pub async fn client_statistics(&self, id: Uuid) -> Result<ClientStatistics> {
        self.get(&format!("/clients/{}/statistics", id), &[]).await
    }

    pub async fn list_reports(
        &self,
        filter: &ReportListQuery,
        page: Option<i64>,
        page_size: Option<i64>,
    ) -> Result<Paginated<ReportResponse>> {
        let mut query = page_query(page, page_size);
        if let Some(client_id) = filter.client_id {
            query.push(("client_id", client_id.to_string()));
        }
        if let Some(status) = filter.status {
            query.push(("status", status.to_string()));
        }
        if let Some(report_type) = filter.report_type {
            query.push(("report_type", report_type.as_str().to_string()));
        }
        if let Some(search) = &filter.search {
            query.push(("search", search.clone()));
        }
        self.get("/reports", &query).await
    }

    pub async fn create_report(&self, request: &CreateReportRequest) -> Result<ReportResponse> {
        self.post_json("/reports", request).await
    }

    pub async fn get_report(&self, id: Uuid) -> Result<ReportResponse> {
        self.get(&format!("/reports/{}", id), &[]).await
    }

    pub async fn report_status(&self, id: Uuid) -> Result<serde_json::Value> {
        self.get(&format!("/reports/{}/status", id), &[]).await
    }

    /// Uploads an Azure Advisor CSV export from a local file.
    pub async fn upload_csv(&self, id: Uuid, file_path: &Path) -> Result<ReportResponse> {
        let data = tokio::fs::read(file_path)
            .await
            .with_context(|| format!("Failed to read file: {}", file_path.display()))?;
        let filename = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("advisor-export.csv")
            .to_string();

        let part = reqwest::multipart::Part::bytes(data)
            .file_name(filename)
            .mime_str("text/csv")
            .context("Invalid content type")?;
        let form = reqwest::multipart::Form::new().part("file", part);

        self.post_multipart(&format!("/reports/{}/upload", id), form)
            .await
    }

    pub async fn generate_report(
        &self,
        id: Uuid,
        request: &GenerateReportRequest,
    ) -> Result<GenerateOutcome> {
        self.post_json(&format!("/reports/{}/generate", id), request)
            .await
    }

    pub async fn cancel_report(&self, id: Uuid) -> Result<ReportResponse> {
        self.post_empty(&format!("/reports/{}/cancel", id)).await
    }

    pub async fn download_report(&self, id: Uuid, format: ReportFormat) -> Result<bytes::Bytes> {
        self.get_bytes(&format!("/reports/{}/download/{}", id, format))
            .await
    }

    /// Polls the report until it leaves the in-flight states or `timeout` passes.
    pub async fn wait_for_report(
        &self,
        id: Uuid,
        interval: Duration,
        timeout: Duration,
    ) -> Result<ReportResponse> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let report = self.get_report(id).await?;
            let settled = matches!(
                report.status,
                ReportStatus::Completed | ReportStatus::Failed | ReportStatus::Cancelled
            );
            if settled {
                return Ok(report);
            }
            if std::time::Instant::now() >= deadline {
                anyhow::bail!(
                    "Report {} is still {} after {}s",
                    id,
                    report.status,
                    timeout.as_secs()
                );
            }
            tokio::time::sleep(interval).await;
        }
    }

    pub async fn get_task(&self, id: Uuid) -> Result<TaskStatusResponse> {
        self.get(&format!("/tasks/{}", id), &[]).await
    }

    pub async fn list_tasks(&self, report_id: Option<Uuid>) -> Result<TaskListResponse> {
        let query: Vec<(&str, String)> = report_id
            .map(|id| vec![("report_id", id.to_string())])
            .unwrap_or_default();
        self.get("/tasks", &query).await
    }

    pub async fn dashboard(&self) -> Result<DashboardStats> {
        self.get("/analytics/dashboard", &[]).await
    }
}
