use crate::auth::models::{AuthContext, TokenType};
use crate::auth::password::verify_password;
use crate::state::AppState;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::utils::client_ip::ClientIp;
use advisor_core::models::{LoginRequest, RefreshRequest, TokenResponse, UserResponse};
use advisor_core::AppError;
use axum::{extract::State, Json};
use std::sync::Arc;
use validator::Validate;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access and refresh tokens", body = TokenResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 429, description = "Too many failed attempts", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(client_ip = %client_ip.0))]
pub async fn login(
    State(state): State<Arc<AppState>>,
    client_ip: ClientIp,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> Result<Json<TokenResponse>, HttpAppError> {
    let auth = &state.auth;
    request.validate()?;
    let limiter = &auth.failure_limiter;
    if limiter.is_blocked(&client_ip.0).await {
        return Err(AppError::RateLimited("Too many failed login attempts".to_string()).into());
    }

    let user = auth
        .user_repository
        .find_by_email(&request.email)
        .await?
        .filter(|user| verify_password(&request.password, &user.password_hash));

    let Some(user) = user else {
        tracing::info!("Login failed");
        limiter.record_failure(&client_ip.0).await;
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()).into());
    };
    if !user.is_active {
        tracing::info!(user_id = %user.id, "Login refused for inactive user");
        limiter.record_failure(&client_ip.0).await;
        return Err(AppError::Unauthorized("This account has been deactivated".to_string()).into());
    }

    limiter.clear(&client_ip.0).await;
    if let Err(e) = auth.user_repository.touch_last_login(user.id).await {
        tracing::warn!(user_id = %user.id, error = %e, "Failed to record login time");
    }

    let access_token = auth.jwt.issue(&user, TokenType::Access)?;
    let refresh_token = auth.jwt.issue(&user, TokenType::Refresh)?;
    tracing::info!(user_id = %user.id, role = %user.role, "User logged in");

    Ok(Json(TokenResponse {
        access_token,
        refresh_token: Some(refresh_token),
        token_type: "Bearer".to_string(),
        expires_in: auth.jwt.access_ttl_seconds(),
        user: Some(UserResponse::from(user)),
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = TokenResponse),
        (status = 401, description = "Invalid refresh token", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request))]
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<RefreshRequest>,
) -> Result<Json<TokenResponse>, HttpAppError> {
    let auth = &state.auth;
    request.validate()?;
    let claims = auth.jwt.verify(&request.refresh_token, TokenType::Refresh)?;
    let user = auth
        .user_repository
        .get(claims.sub)
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(|| AppError::Unauthorized("User is inactive or no longer exists".to_string()))?;

    Ok(Json(TokenResponse {
        access_token: auth.jwt.issue(&user, TokenType::Access)?,
        refresh_token: None,
        token_type: "Bearer".to_string(),
        expires_in: auth.jwt.access_ttl_seconds(),
        user: None,
    }))
}

/// Profile of the authenticated caller.
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn me(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<Json<UserResponse>, HttpAppError> {
    let auth = &state.auth;
    if ctx.is_system() {
        return Ok(Json(UserResponse {
            id: ctx.user_id,
            email: ctx.email,
            full_name: "System".to_string(),
            role: ctx.role,
            is_active: true,
            last_login_at: None,
            created_at: chrono::DateTime::<chrono::Utc>::default(),
        }));
    }
    let user = auth
        .user_repository
        .get(ctx.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".to_string()))?;
    Ok(Json(UserResponse::from(user)))
}
