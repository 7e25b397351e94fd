use crate::auth::models::AuthContext;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson, ValidatedQuery};
use crate::handlers::not_found;
use crate::handlers::reports::enqueue_purge;
use crate::state::{DbState, TaskState};
use advisor_core::models::{
    Client, ClientListQuery, ClientStatistics, CreateClientRequest, PageParams, Paginated,
    ReportListQuery, ReportResponse, UpdateClientRequest,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

#[utoipa::path(
    get,
    path = "/api/v1/clients",
    tag = "clients",
    params(ClientListQuery, PageParams),
    responses(
        (status = 200, description = "Page of clients"),
        (status = 400, description = "Invalid filter or ordering", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, _ctx))]
pub async fn list_clients(
    State(db): State<DbState>,
    _ctx: AuthContext,
    ValidatedQuery(query): ValidatedQuery<ClientListQuery>,
    ValidatedQuery(page): ValidatedQuery<PageParams>,
) -> Result<Json<Paginated<Client>>, HttpAppError> {
    let (clients, count) = db.client_repository.list(&query, &page).await?;
    Ok(Json(Paginated::new(clients, count, &page)))
}

#[utoipa::path(
    post,
    path = "/api/v1/clients",
    tag = "clients",
    request_body = CreateClientRequest,
    responses(
        (status = 201, description = "Client created", body = Client),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 409, description = "Company name already used", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, ctx, request), fields(user_id = %ctx.user_id))]
pub async fn create_client(
    State(db): State<DbState>,
    ctx: AuthContext,
    ValidatedJson(request): ValidatedJson<CreateClientRequest>,
) -> Result<(StatusCode, Json<Client>), HttpAppError> {
    ctx.require_manager("create clients")?;
    let request = request.normalized();
    request.validate()?;

    let client = db
        .client_repository
        .create(request, ctx.actor_id())
        .await?;
    Ok((StatusCode::CREATED, Json(client)))
}

#[utoipa::path(
    get,
    path = "/api/v1/clients/{id}",
    tag = "clients",
    params(("id" = Uuid, Path, description = "Client ID")),
    responses(
        (status = 200, description = "Client", body = Client),
        (status = 404, description = "Client not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, _ctx), fields(client_id = %id))]
pub async fn get_client(
    State(db): State<DbState>,
    _ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Client>, HttpAppError> {
    let client = db
        .client_repository
        .get(id)
        .await?
        .ok_or_else(|| not_found("Client", id))?;
    Ok(Json(client))
}

#[utoipa::path(
    put,
    path = "/api/v1/clients/{id}",
    tag = "clients",
    params(("id" = Uuid, Path, description = "Client ID")),
    request_body = UpdateClientRequest,
    responses(
        (status = 200, description = "Client updated", body = Client),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 404, description = "Client not found", body = ErrorResponse),
        (status = 409, description = "Company name already used", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, ctx, request), fields(user_id = %ctx.user_id, client_id = %id))]
pub async fn update_client(
    State(db): State<DbState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<UpdateClientRequest>,
) -> Result<Json<Client>, HttpAppError> {
    ctx.require_manager("edit clients")?;
    let request = request.normalized();
    request.validate()?;

    let client = db
        .client_repository
        .update(id, request)
        .await?
        .ok_or_else(|| not_found("Client", id))?;
    Ok(Json(client))
}

/// Deletes the client with its reports. Stored report files are removed by a
/// background task per report.
#[utoipa::path(
    delete,
    path = "/api/v1/clients/{id}",
    tag = "clients",
    params(("id" = Uuid, Path, description = "Client ID")),
    responses(
        (status = 204, description = "Client deleted"),
        (status = 403, description = "Manager role required", body = ErrorResponse),
        (status = 404, description = "Client not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, tasks, ctx), fields(user_id = %ctx.user_id, client_id = %id))]
pub async fn delete_client(
    State(db): State<DbState>,
    State(tasks): State<TaskState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, HttpAppError> {
    ctx.require_manager("delete clients")?;

    let files = db
        .client_repository
        .delete(id)
        .await?
        .ok_or_else(|| not_found("Client", id))?;

    for (report_id, keys) in files {
        enqueue_purge(&tasks, report_id, keys, ctx.actor_id()).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/clients/{id}/reports",
    tag = "clients",
    params(("id" = Uuid, Path, description = "Client ID"), PageParams),
    responses(
        (status = 200, description = "Page of the client's reports"),
        (status = 404, description = "Client not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, _ctx), fields(client_id = %id))]
pub async fn client_reports(
    State(db): State<DbState>,
    _ctx: AuthContext,
    Path(id): Path<Uuid>,
    ValidatedQuery(page): ValidatedQuery<PageParams>,
) -> Result<Json<Paginated<ReportResponse>>, HttpAppError> {
    if !db.client_repository.exists(id).await? {
        return Err(not_found("Client", id).into());
    }
    let query = ReportListQuery {
        client_id: Some(id),
        ..Default::default()
    };
    let (reports, count) = db.report_repository.list(&query, &page).await?;
    Ok(Json(Paginated::new(reports, count, &page).map(
        |(report, client_name)| ReportResponse::from_report(report, Some(client_name)),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/clients/{id}/statistics",
    tag = "clients",
    params(("id" = Uuid, Path, description = "Client ID")),
    responses(
        (status = 200, description = "Report and savings figures", body = ClientStatistics),
        (status = 404, description = "Client not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, _ctx), fields(client_id = %id))]
pub async fn client_statistics(
    State(db): State<DbState>,
    _ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ClientStatistics>, HttpAppError> {
    if !db.client_repository.exists(id).await? {
        return Err(not_found("Client", id).into());
    }
    Ok(Json(db.client_repository.statistics(id).await?))
}
