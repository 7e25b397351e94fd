//! Expiring public links to completed reports.

use crate::auth::models::AuthContext;
use crate::error::{json_from_slice, ErrorResponse, HttpAppError};
use crate::handlers::not_found;
use crate::handlers::reports::{parse_format, stream_file};
use crate::state::AppState;
use advisor_core::constants::API_PREFIX;
use advisor_core::models::{
    CreateShareRequest, ReportFormat, ReportShare, ReportStatus, ShareResponse, SharedReportView,
};
use advisor_core::AppError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use bytes::Bytes;
use chrono::{Duration, Utc};
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

const TOKEN_BYTES: usize = 32;

/// 64 hex characters from the thread-local CSPRNG.
fn generate_share_token() -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..TOKEN_BYTES).map(|_| rng.random()).collect();
    hex::encode(bytes)
}

fn expiry_days(requested: Option<i64>, default_days: i64, max_days: i64) -> Result<i64, AppError> {
    let days = requested.unwrap_or(default_days);
    if days < 1 || days > max_days {
        return Err(AppError::field(
            "expires_in_days",
            format!("Expiry must be between 1 and {} days", max_days),
        ));
    }
    Ok(days)
}

fn share_not_found() -> AppError {
    AppError::NotFound("Share link not found or expired".to_string())
}

async fn resolve_share(state: &AppState, token: &str) -> Result<ReportShare, AppError> {
    // tokens are fixed-length hex, anything else cannot match
    if token.len() != TOKEN_BYTES * 2 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(share_not_found());
    }
    state
        .db
        .share_repository
        .access_by_token(token)
        .await?
        .ok_or_else(share_not_found)
}

#[utoipa::path(
    post,
    path = "/api/v1/reports/{id}/shares",
    tag = "shares",
    params(("id" = Uuid, Path, description = "Report ID")),
    request_body = CreateShareRequest,
    responses(
        (status = 201, description = "Share link created", body = ShareResponse),
        (status = 400, description = "Invalid expiry", body = ErrorResponse),
        (status = 404, description = "Report not found", body = ErrorResponse),
        (status = 409, description = "Report is not completed", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(state, ctx, body), fields(user_id = %ctx.user_id, report_id = %id))]
pub async fn create_share(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<(StatusCode, Json<ShareResponse>), HttpAppError> {
    ctx.require_analyst("share reports")?;
    let request: CreateShareRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateShareRequest::default()
    } else {
        json_from_slice(&body)?
    };
    request.validate()?;
    let days = expiry_days(
        request.expires_in_days,
        state.config.share_default_expiry_days(),
        state.config.share_max_expiry_days(),
    )?;

    let report = state
        .db
        .report_repository
        .get(id)
        .await?
        .ok_or_else(|| not_found("Report", id))?;
    if report.status != ReportStatus::Completed {
        return Err(AppError::Conflict(format!(
            "Only completed reports can be shared; this report is {}",
            report.status
        ))
        .into());
    }

    let share = state
        .db
        .share_repository
        .create(
            id,
            &generate_share_token(),
            Utc::now() + Duration::days(days),
            ctx.actor_id(),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ShareResponse::from_share(share, API_PREFIX)),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/{id}/shares",
    tag = "shares",
    params(("id" = Uuid, Path, description = "Report ID")),
    responses(
        (status = 200, description = "Share links, newest first", body = [ShareResponse]),
        (status = 404, description = "Report not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(state, _ctx), fields(report_id = %id))]
pub async fn list_shares(
    State(state): State<Arc<AppState>>,
    _ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ShareResponse>>, HttpAppError> {
    if state.db.report_repository.get(id).await?.is_none() {
        return Err(not_found("Report", id).into());
    }
    let shares = state.db.share_repository.list_for_report(id).await?;
    Ok(Json(
        shares
            .into_iter()
            .map(|share| ShareResponse::from_share(share, API_PREFIX))
            .collect(),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/v1/reports/{id}/shares/{share_id}",
    tag = "shares",
    params(
        ("id" = Uuid, Path, description = "Report ID"),
        ("share_id" = Uuid, Path, description = "Share ID")
    ),
    responses(
        (status = 204, description = "Share link revoked"),
        (status = 404, description = "Share not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(state, ctx), fields(user_id = %ctx.user_id))]
pub async fn revoke_share(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path((id, share_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, HttpAppError> {
    ctx.require_analyst("revoke share links")?;
    if !state.db.share_repository.revoke(id, share_id).await? {
        return Err(not_found("Share", share_id).into());
    }
    tracing::info!(report_id = %id, share_id = %share_id, "Share link revoked");
    Ok(StatusCode::NO_CONTENT)
}

/// Public summary of a shared report. No authentication.
#[utoipa::path(
    get,
    path = "/api/v1/shared/{token}",
    tag = "shares",
    params(("token" = String, Path, description = "Share token")),
    responses(
        (status = 200, description = "Shared report summary", body = SharedReportView),
        (status = 404, description = "Unknown, revoked or expired link", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn view_shared(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<SharedReportView>, HttpAppError> {
    let share = resolve_share(&state, &token).await?;
    let (report, client_name) = state
        .db
        .report_repository
        .get_with_client_name(share.report_id)
        .await?
        .ok_or_else(share_not_found)?;

    Ok(Json(SharedReportView {
        available_formats: report
            .available_formats()
            .into_iter()
            .filter(|format| *format != ReportFormat::Csv)
            .collect(),
        title: report.title,
        client_name,
        report_type: report.report_type,
        analysis_data: report.analysis_data,
        generated_at: report.processing_completed_at,
        expires_at: share.expires_at,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/shared/{token}/download/{format}",
    tag = "shares",
    params(
        ("token" = String, Path, description = "Share token"),
        ("format" = String, Path, description = "html or pdf")
    ),
    responses(
        (status = 200, description = "Rendered report", content_type = "application/octet-stream"),
        (status = 400, description = "Unsupported format", body = ErrorResponse),
        (status = 404, description = "Unknown link or file not generated", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn download_shared(
    State(state): State<Arc<AppState>>,
    Path((token, format)): Path<(String, String)>,
) -> Result<Response, HttpAppError> {
    let format = parse_format(&format)?;
    if format == ReportFormat::Csv {
        return Err(AppError::BadRequest(
            "Shared reports can be downloaded as html or pdf".to_string(),
        )
        .into());
    }
    let share = resolve_share(&state, &token).await?;
    let report = state
        .db
        .report_repository
        .get(share.report_id)
        .await?
        .ok_or_else(share_not_found)?;
    let key = report.file_key(format).ok_or_else(|| {
        AppError::NotFound(format!("The {} file is not available for this report", format))
    })?;

    Ok(stream_file(&state.files.storage, key, format, &report.title).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_64_hex_chars_and_unique() {
        let a = generate_share_token();
        let b = generate_share_token();
        assert_eq!(a.len(), 64);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn expiry_uses_default_and_bounds() {
        assert_eq!(expiry_days(None, 7, 90).unwrap(), 7);
        assert_eq!(expiry_days(Some(90), 7, 90).unwrap(), 90);
        let err = expiry_days(Some(91), 7, 90).unwrap_err();
        assert!(err.field_errors().unwrap().contains_key("expires_in_days"));
        assert!(expiry_days(Some(0), 7, 90).is_err());
    }
}
