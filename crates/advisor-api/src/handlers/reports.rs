use crate::auth::models::AuthContext;
use crate::error::{json_from_slice, ErrorResponse, HttpAppError, ValidatedJson, ValidatedQuery};
use crate::handlers::not_found;
use crate::services::ReportPipeline;
use crate::state::{AppState, TaskState};
use crate::utils::upload::read_csv_field;
use advisor_core::constants::API_PREFIX;
use advisor_core::models::{
    CreateReportRequest, GenerateAcceptedResponse, GenerateReportPayload, GenerateReportRequest,
    PageParams, Paginated, Priority, PurgeReportFilesPayload, Recommendation,
    RecommendationListQuery, Report, ReportFormat, ReportListQuery, ReportResponse, ReportStatus,
    Task, TaskStatusResponse, TaskType,
};
use advisor_core::AppError;
use advisor_db::NewReport;
use advisor_processing::CsvImporter;
use advisor_storage::keys::source_csv_key;
use advisor_storage::Storage;
use advisor_worker::SubmitTask;
use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

const MAX_TITLE_CHARS: usize = 255;

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportStatusResponse {
    pub id: Uuid,
    pub status: ReportStatus,
    pub retry_count: i32,
    pub retries_remaining: i32,
    pub error_message: Option<String>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    pub available_formats: Vec<ReportFormat>,
    /// Latest generation task, if the report was ever generated asynchronously
    pub task: Option<TaskStatusResponse>,
}

async fn load_report(state: &AppState, id: Uuid) -> Result<Report, AppError> {
    state
        .db
        .report_repository
        .get(id)
        .await?
        .ok_or_else(|| not_found("Report", id))
}

async fn report_response(state: &AppState, id: Uuid) -> Result<ReportResponse, AppError> {
    let (report, client_name) = state
        .db
        .report_repository
        .get_with_client_name(id)
        .await?
        .ok_or_else(|| not_found("Report", id))?;
    Ok(ReportResponse::from_report(report, Some(client_name)))
}

/// Queues deletion of a removed report's stored files. Failures are logged: the
/// rows are already gone and the request has succeeded.
pub(crate) async fn enqueue_purge(
    tasks: &TaskState,
    report_id: Uuid,
    storage_keys: Vec<String>,
    created_by: Option<Uuid>,
) {
    if storage_keys.is_empty() {
        return;
    }
    let payload = match Task::payload_from(&PurgeReportFilesPayload {
        report_id,
        storage_keys,
    }) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(report_id = %report_id, error = %e, "Failed to encode purge payload");
            return;
        }
    };
    // the report row is gone, so the task is not linked to it
    let submitted = tasks
        .task_queue
        .submit_task(SubmitTask {
            task_type: TaskType::PurgeReportFiles,
            payload,
            priority: Priority::Low,
            max_retries: 5,
            timeout_seconds: None,
            report_id: None,
            created_by,
        })
        .await;
    if let Err(e) = submitted {
        tracing::error!(report_id = %report_id, error = %e, "Failed to queue report file purge");
    }
}

/// Download name derived from the report title, e.g. `contoso-cost-report.pdf`.
fn attachment_filename(title: &str, format: ReportFormat) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "report" } else { slug };
    format!("{}.{}", slug, format)
}

async fn delete_quietly(storage: &dyn Storage, key: &str) {
    if let Err(e) = storage.delete(key).await {
        tracing::warn!(key = %key, error = %e, "Failed to delete superseded file");
    }
}

/// Streams a stored report file as an attachment.
pub(crate) async fn stream_file(
    storage: &Arc<dyn Storage>,
    key: &str,
    format: ReportFormat,
    title: &str,
) -> Result<Response, AppError> {
    let stream = storage.get_stream(key).await?;
    let body_stream = stream.map(|result| {
        result.map_err(|e| std::io::Error::other(format!("Storage stream error: {}", e)))
    });

    let content_disposition = format!(
        "attachment; filename=\"{}\"",
        attachment_filename(title, format)
    );
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, format.content_type())
        .header(header::CONTENT_DISPOSITION, content_disposition)
        .header(header::CACHE_CONTROL, "private, no-cache")
        .body(Body::from_stream(body_stream))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

pub(crate) fn parse_format(raw: &str) -> Result<ReportFormat, AppError> {
    raw.parse::<ReportFormat>().map_err(|_| {
        AppError::BadRequest(format!(
            "Unsupported format '{}'. Use csv, html or pdf",
            raw
        ))
    })
}

#[utoipa::path(
    get,
    path = "/api/v1/reports",
    tag = "reports",
    params(ReportListQuery, PageParams),
    responses(
        (status = 200, description = "Page of reports"),
        (status = 400, description = "Invalid filter or ordering", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(state, _ctx))]
pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    _ctx: AuthContext,
    ValidatedQuery(query): ValidatedQuery<ReportListQuery>,
    ValidatedQuery(page): ValidatedQuery<PageParams>,
) -> Result<Json<Paginated<ReportResponse>>, HttpAppError> {
    let (reports, count) = state.db.report_repository.list(&query, &page).await?;
    Ok(Json(Paginated::new(reports, count, &page).map(
        |(report, client_name)| ReportResponse::from_report(report, Some(client_name)),
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/reports",
    tag = "reports",
    request_body = CreateReportRequest,
    responses(
        (status = 201, description = "Report created in pending status", body = ReportResponse),
        (status = 400, description = "Invalid input or unknown client", body = ErrorResponse),
        (status = 403, description = "Analyst role required", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(state, ctx, request), fields(user_id = %ctx.user_id))]
pub async fn create_report(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    ValidatedJson(request): ValidatedJson<CreateReportRequest>,
) -> Result<(StatusCode, Json<ReportResponse>), HttpAppError> {
    ctx.require_analyst("create reports")?;
    request.validate()?;

    let client = state
        .db
        .client_repository
        .get(request.client_id)
        .await?
        .ok_or_else(|| AppError::field("client_id", "Client does not exist"))?;

    if let Some(template_id) = request.template_id {
        let template = state.db.template_repository.get(template_id).await?;
        match template {
            None => return Err(AppError::field("template_id", "Template does not exist").into()),
            Some(t) if t.report_type != request.report_type => {
                return Err(AppError::field(
                    "template_id",
                    format!("Template is for {} reports", t.report_type),
                )
                .into())
            }
            Some(_) => {}
        }
    }

    let title = request
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .unwrap_or_else(|| {
            format!("{} report - {}", request.report_type.label(), client.company_name)
                .chars()
                .take(MAX_TITLE_CHARS)
                .collect()
        });

    let report = state
        .db
        .report_repository
        .create(NewReport {
            client_id: client.id,
            created_by: ctx.actor_id(),
            title,
            report_type: request.report_type,
            template_id: request.template_id,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ReportResponse::from_report(report, Some(client.company_name))),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/{id}",
    tag = "reports",
    params(("id" = Uuid, Path, description = "Report ID")),
    responses(
        (status = 200, description = "Report", body = ReportResponse),
        (status = 404, description = "Report not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(state, _ctx), fields(report_id = %id))]
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    _ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ReportResponse>, HttpAppError> {
    Ok(Json(report_response(&state, id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/reports/{id}",
    tag = "reports",
    params(("id" = Uuid, Path, description = "Report ID")),
    responses(
        (status = 204, description = "Report deleted"),
        (status = 403, description = "Manager role required", body = ErrorResponse),
        (status = 404, description = "Report not found", body = ErrorResponse),
        (status = 409, description = "Report is being processed", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(state, ctx), fields(user_id = %ctx.user_id, report_id = %id))]
pub async fn delete_report(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, HttpAppError> {
    ctx.require_manager("delete reports")?;

    let report = state.db.report_repository.delete(id).await?;
    let keys: Vec<String> = [ReportFormat::Csv, ReportFormat::Html, ReportFormat::Pdf]
        .into_iter()
        .filter_map(|format| report.file_key(format).map(String::from))
        .collect();
    enqueue_purge(&state.tasks, id, keys, ctx.actor_id()).await;

    Ok(StatusCode::NO_CONTENT)
}

/// Attaches an Azure Advisor CSV export to the report.
#[utoipa::path(
    post,
    path = "/api/v1/reports/{id}/upload",
    tag = "reports",
    params(("id" = Uuid, Path, description = "Report ID")),
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "CSV stored, report is uploaded", body = ReportResponse),
        (status = 400, description = "Invalid file or CSV header", body = ErrorResponse),
        (status = 404, description = "Report not found", body = ErrorResponse),
        (status = 409, description = "Report is being processed or was cancelled", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(state, ctx, multipart), fields(user_id = %ctx.user_id, report_id = %id))]
pub async fn upload_csv(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<ReportResponse>, HttpAppError> {
    ctx.require_analyst("upload CSV files")?;

    let report = load_report(&state, id).await?;
    // early rejection only; attach_csv repeats the check atomically
    if !report.status.can_transition_to(ReportStatus::Uploaded, report.retry_count) {
        return Err(AppError::Conflict(format!(
            "Report status is {}, a new CSV cannot be uploaded now",
            report.status
        ))
        .into());
    }

    let upload = read_csv_field(&mut multipart).await?;
    upload.validate(state.files.max_csv_size_bytes)?;
    CsvImporter::new(state.files.max_csv_rows).check_header(&upload.data)?;

    let key = source_csv_key(id, Uuid::new_v4());
    let size = upload.data.len();
    let storage = &state.files.storage;
    storage
        .put(&key, upload.data, ReportFormat::Csv.content_type())
        .await?;
    let attached = match state.db.report_repository.attach_csv(id, &key).await {
        Ok(attached) => attached,
        Err(err) => {
            // the report moved on between the check and the write
            delete_quietly(storage.as_ref(), &key).await;
            return Err(err.into());
        }
    };
    for old in &attached.replaced_files {
        delete_quietly(storage.as_ref(), old).await;
    }

    tracing::info!(
        report_id = %id,
        filename = %upload.filename,
        size,
        "CSV uploaded"
    );
    Ok(Json(report_response(&state, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/reports/{id}/generate",
    tag = "reports",
    params(("id" = Uuid, Path, description = "Report ID")),
    request_body = GenerateReportRequest,
    responses(
        (status = 200, description = "Report generated", body = ReportResponse),
        (status = 202, description = "Generation queued", body = GenerateAcceptedResponse),
        (status = 400, description = "No CSV uploaded or invalid CSV", body = ErrorResponse),
        (status = 404, description = "Report not found", body = ErrorResponse),
        (status = 409, description = "Report cannot be generated in its current status", body = ErrorResponse),
        (status = 503, description = "Still running after the synchronous time limit", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(state, ctx, body), fields(user_id = %ctx.user_id, report_id = %id))]
pub async fn generate_report(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Response, HttpAppError> {
    ctx.require_analyst("generate reports")?;
    // an empty body means the defaults
    let request: GenerateReportRequest = if body.iter().all(u8::is_ascii_whitespace) {
        GenerateReportRequest::default()
    } else {
        json_from_slice(&body)?
    };
    let formats = request.render_formats();

    let report = load_report(&state, id).await?;
    let pipeline = ReportPipeline::new(state.db.clone(), &state.files);
    pipeline.check_startable(&report, &formats).await?;

    if state
        .tasks
        .task_repository
        .has_active_for_report(id, TaskType::GenerateReport)
        .await?
    {
        return Err(AppError::Conflict(
            "A generation task for this report is already queued or running".to_string(),
        )
        .into());
    }

    if request.run_async {
        let task = state
            .tasks
            .task_queue
            .submit_task(SubmitTask {
                task_type: TaskType::GenerateReport,
                payload: Task::payload_from(&GenerateReportPayload {
                    report_id: id,
                    formats,
                })?,
                priority: Priority::Normal,
                max_retries: report.retries_remaining(),
                timeout_seconds: None,
                report_id: Some(id),
                created_by: ctx.actor_id(),
            })
            .await?;

        let accepted = GenerateAcceptedResponse {
            task_id: task.id,
            report_id: id,
            status: "PENDING".to_string(),
            status_url: format!("{}/tasks/{}", API_PREFIX, task.id),
        };
        return Ok((StatusCode::ACCEPTED, Json(accepted)).into_response());
    }

    let limit = Duration::from_secs(state.config.sync_generation_timeout_secs().max(1));
    let run = tokio::spawn(async move { pipeline.run(id, &formats).await });
    match tokio::time::timeout(limit, run).await {
        Ok(Ok(result)) => {
            result?;
        }
        Ok(Err(join_err)) => {
            return Err(AppError::Internal(format!("Report generation panicked: {}", join_err)).into())
        }
        Err(_) => {
            tracing::warn!(report_id = %id, limit_secs = limit.as_secs(), "Synchronous generation exceeded its time limit");
            return Err(AppError::ServiceUnavailable(format!(
                "Report generation is taking longer than {} seconds and continues in the background; \
                 poll {}/reports/{}/status",
                limit.as_secs(),
                API_PREFIX,
                id
            ))
            .into());
        }
    }

    Ok(Json(report_response(&state, id).await?).into_response())
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/{id}/status",
    tag = "reports",
    params(("id" = Uuid, Path, description = "Report ID")),
    responses(
        (status = 200, description = "Processing status", body = ReportStatusResponse),
        (status = 404, description = "Report not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(state, _ctx), fields(report_id = %id))]
pub async fn report_status(
    State(state): State<Arc<AppState>>,
    _ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ReportStatusResponse>, HttpAppError> {
    let report = load_report(&state, id).await?;
    let task = state
        .tasks
        .task_repository
        .latest_for_report(id, TaskType::GenerateReport)
        .await?
        .map(TaskStatusResponse::from);

    Ok(Json(ReportStatusResponse {
        id: report.id,
        status: report.status,
        retry_count: report.retry_count,
        retries_remaining: report.retries_remaining(),
        available_formats: report.available_formats(),
        error_message: report.error_message,
        processing_started_at: report.processing_started_at,
        processing_completed_at: report.processing_completed_at,
        task,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/reports/{id}/cancel",
    tag = "reports",
    params(("id" = Uuid, Path, description = "Report ID")),
    responses(
        (status = 200, description = "Report cancelled", body = ReportResponse),
        (status = 404, description = "Report not found", body = ErrorResponse),
        (status = 409, description = "Report cannot be cancelled in its current status", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(state, ctx), fields(user_id = %ctx.user_id, report_id = %id))]
pub async fn cancel_report(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ReportResponse>, HttpAppError> {
    ctx.require_analyst("cancel reports")?;

    state.db.report_repository.cancel(id).await?;
    let cancelled = state
        .tasks
        .task_repository
        .cancel_pending_for_report(id)
        .await?;
    if cancelled > 0 {
        tracing::info!(report_id = %id, tasks = cancelled, "Queued generation tasks cancelled");
    }
    Ok(Json(report_response(&state, id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/{id}/download/{format}",
    tag = "reports",
    params(
        ("id" = Uuid, Path, description = "Report ID"),
        ("format" = String, Path, description = "csv, html or pdf")
    ),
    responses(
        (status = 200, description = "File contents", content_type = "application/octet-stream"),
        (status = 400, description = "Unsupported format", body = ErrorResponse),
        (status = 404, description = "Report or file not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(state, _ctx), fields(report_id = %id))]
pub async fn download_report(
    State(state): State<Arc<AppState>>,
    _ctx: AuthContext,
    Path((id, format)): Path<(Uuid, String)>,
) -> Result<Response, HttpAppError> {
    let format = parse_format(&format)?;
    let report = load_report(&state, id).await?;
    let key = report.file_key(format).ok_or_else(|| {
        AppError::NotFound(format!("The {} file has not been generated for this report", format))
    })?;

    Ok(stream_file(&state.files.storage, key, format, &report.title).await?)
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/{id}/recommendations",
    tag = "reports",
    params(("id" = Uuid, Path, description = "Report ID"), RecommendationListQuery, PageParams),
    responses(
        (status = 200, description = "Page of the report's recommendations"),
        (status = 404, description = "Report not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(state, _ctx), fields(report_id = %id))]
pub async fn report_recommendations(
    State(state): State<Arc<AppState>>,
    _ctx: AuthContext,
    Path(id): Path<Uuid>,
    ValidatedQuery(query): ValidatedQuery<RecommendationListQuery>,
    ValidatedQuery(page): ValidatedQuery<PageParams>,
) -> Result<Json<Paginated<Recommendation>>, HttpAppError> {
    load_report(&state, id).await?;
    let query = RecommendationListQuery {
        report_id: Some(id),
        ..query
    };
    let (rows, count) = state
        .db
        .recommendation_repository
        .list(&query, &page)
        .await?;
    Ok(Json(Paginated::new(rows, count, &page)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_names_are_slugged() {
        assert_eq!(
            attachment_filename("Cost Optimization report - Contoso Ltd.", ReportFormat::Pdf),
            "cost-optimization-report-contoso-ltd.pdf"
        );
        assert_eq!(attachment_filename("***", ReportFormat::Html), "report.html");
    }

    #[test]
    fn unknown_download_format_is_a_bad_request() {
        assert!(matches!(parse_format("docx"), Err(AppError::BadRequest(_))));
        assert_eq!(parse_format("PDF").unwrap(), ReportFormat::Pdf);
    }
}
