use crate::auth::models::AuthContext;
use crate::error::{ErrorResponse, HttpAppError, ValidatedQuery};
use crate::handlers::not_found;
use crate::state::TaskState;
use advisor_core::models::{TaskListQuery, TaskStats, TaskStatusResponse};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskStatusResponse>,
    pub count: usize,
}

/// List tasks with optional filters
#[utoipa::path(
    get,
    path = "/api/v1/tasks",
    tag = "tasks",
    params(TaskListQuery),
    responses((status = 200, description = "Tasks, newest first", body = TaskListResponse)),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(tasks, _ctx))]
pub async fn list_tasks(
    State(tasks): State<TaskState>,
    _ctx: AuthContext,
    ValidatedQuery(query): ValidatedQuery<TaskListQuery>,
) -> Result<Json<TaskListResponse>, HttpAppError> {
    let rows = tasks.task_repository.list_tasks(&query).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to list tasks");
        e
    })?;
    let tasks: Vec<TaskStatusResponse> = rows.into_iter().map(TaskStatusResponse::from).collect();
    Ok(Json(TaskListResponse {
        count: tasks.len(),
        tasks,
    }))
}

/// Poll a task. `state` follows PENDING / STARTED / RETRY / SUCCESS / FAILURE.
#[utoipa::path(
    get,
    path = "/api/v1/tasks/{id}",
    tag = "tasks",
    params(("id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task status", body = TaskStatusResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(tasks, _ctx))]
pub async fn get_task(
    State(tasks): State<TaskState>,
    _ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskStatusResponse>, HttpAppError> {
    let task = tasks
        .task_repository
        .get_task(id)
        .await?
        .ok_or_else(|| not_found("Task", id))?;
    Ok(Json(TaskStatusResponse::from(task)))
}

/// Get aggregated task statistics
#[utoipa::path(
    get,
    path = "/api/v1/tasks/stats",
    tag = "tasks",
    responses((status = 200, description = "Counts per status", body = TaskStats)),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(tasks, _ctx))]
pub async fn task_stats(
    State(tasks): State<TaskState>,
    _ctx: AuthContext,
) -> Result<Json<TaskStats>, HttpAppError> {
    Ok(Json(tasks.task_repository.get_stats().await?))
}
