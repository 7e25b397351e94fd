use crate::auth::models::AuthContext;
use crate::auth::password::hash_password;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson, ValidatedQuery};
use crate::handlers::not_found;
use crate::state::DbState;
use advisor_core::models::{CreateUserRequest, PageParams, Paginated, UserResponse};
use advisor_db::NewUser;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "users",
    params(PageParams),
    responses(
        (status = 200, description = "Users, oldest first"),
        (status = 403, description = "Admin role required", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, ctx), fields(user_id = %ctx.user_id))]
pub async fn list_users(
    State(db): State<DbState>,
    ctx: AuthContext,
    ValidatedQuery(page): ValidatedQuery<PageParams>,
) -> Result<Json<Paginated<UserResponse>>, HttpAppError> {
    ctx.require_admin("list users")?;
    let users = db.user_repository.list(page.limit(), page.offset()).await?;
    let count = db.user_repository.count().await?;
    Ok(Json(
        Paginated::new(users, count, &page).map(UserResponse::from),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, ctx, request), fields(user_id = %ctx.user_id))]
pub async fn create_user(
    State(db): State<DbState>,
    ctx: AuthContext,
    ValidatedJson(request): ValidatedJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), HttpAppError> {
    ctx.require_admin("create users")?;
    request.validate()?;

    let password_hash = hash_password(&request.password)?;
    let user = db
        .user_repository
        .create(NewUser {
            email: request.email,
            password_hash,
            full_name: request.full_name,
            role: request.role,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Deactivates an account. Existing tokens stop working on their next request.
#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deactivated", body = UserResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, ctx), fields(user_id = %ctx.user_id, target_user = %id))]
pub async fn deactivate_user(
    State(db): State<DbState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, HttpAppError> {
    ctx.require_admin("deactivate users")?;
    if id == ctx.user_id {
        return Err(advisor_core::AppError::BadRequest(
            "You cannot deactivate your own account".to_string(),
        )
        .into());
    }
    if db.user_repository.get(id).await?.is_none() {
        return Err(not_found("User", id).into());
    }
    let user = db.user_repository.set_active(id, false).await?;
    Ok(Json(UserResponse::from(user)))
}
