use crate::auth::models::AuthContext;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson, ValidatedQuery};
use crate::handlers::not_found;
use crate::state::DbState;
use advisor_core::models::{
    CreateTemplateRequest, ReportTemplate, ReportType, UpdateTemplateRequest,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct TemplateListQuery {
    pub report_type: Option<ReportType>,
    /// Hide inactive templates (default false)
    #[serde(default)]
    pub active_only: bool,
}

#[utoipa::path(
    get,
    path = "/api/v1/templates",
    tag = "templates",
    params(TemplateListQuery),
    responses((status = 200, description = "Templates", body = [ReportTemplate])),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, _ctx))]
pub async fn list_templates(
    State(db): State<DbState>,
    _ctx: AuthContext,
    ValidatedQuery(query): ValidatedQuery<TemplateListQuery>,
) -> Result<Json<Vec<ReportTemplate>>, HttpAppError> {
    let templates = db
        .template_repository
        .list(query.report_type, query.active_only)
        .await?;
    Ok(Json(templates))
}

#[utoipa::path(
    post,
    path = "/api/v1/templates",
    tag = "templates",
    request_body = CreateTemplateRequest,
    responses(
        (status = 201, description = "Template created", body = ReportTemplate),
        (status = 400, description = "Invalid template", body = ErrorResponse),
        (status = 403, description = "Manager role required", body = ErrorResponse),
        (status = 409, description = "Name already used", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, ctx, request), fields(user_id = %ctx.user_id))]
pub async fn create_template(
    State(db): State<DbState>,
    ctx: AuthContext,
    ValidatedJson(request): ValidatedJson<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<ReportTemplate>), HttpAppError> {
    ctx.require_manager("create templates")?;
    request.validate()?;
    let template = db.template_repository.create(request, ctx.actor_id()).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

#[utoipa::path(
    get,
    path = "/api/v1/templates/{id}",
    tag = "templates",
    params(("id" = Uuid, Path, description = "Template ID")),
    responses(
        (status = 200, description = "Template", body = ReportTemplate),
        (status = 404, description = "Template not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, _ctx))]
pub async fn get_template(
    State(db): State<DbState>,
    _ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ReportTemplate>, HttpAppError> {
    let template = db
        .template_repository
        .get(id)
        .await?
        .ok_or_else(|| not_found("Template", id))?;
    Ok(Json(template))
}

#[utoipa::path(
    put,
    path = "/api/v1/templates/{id}",
    tag = "templates",
    params(("id" = Uuid, Path, description = "Template ID")),
    request_body = UpdateTemplateRequest,
    responses(
        (status = 200, description = "Template updated", body = ReportTemplate),
        (status = 400, description = "Invalid template", body = ErrorResponse),
        (status = 404, description = "Template not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, ctx, request), fields(user_id = %ctx.user_id))]
pub async fn update_template(
    State(db): State<DbState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<UpdateTemplateRequest>,
) -> Result<Json<ReportTemplate>, HttpAppError> {
    ctx.require_manager("edit templates")?;
    request.validate()?;
    let template = db
        .template_repository
        .update(id, request)
        .await?
        .ok_or_else(|| not_found("Template", id))?;
    Ok(Json(template))
}

#[utoipa::path(
    delete,
    path = "/api/v1/templates/{id}",
    tag = "templates",
    params(("id" = Uuid, Path, description = "Template ID")),
    responses(
        (status = 204, description = "Template deleted"),
        (status = 404, description = "Template not found", body = ErrorResponse),
        (status = 409, description = "Template is used by reports", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, ctx), fields(user_id = %ctx.user_id))]
pub async fn delete_template(
    State(db): State<DbState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, HttpAppError> {
    ctx.require_manager("delete templates")?;
    if !db.template_repository.delete(id).await? {
        return Err(not_found("Template", id).into());
    }
    Ok(StatusCode::NO_CONTENT)
}
