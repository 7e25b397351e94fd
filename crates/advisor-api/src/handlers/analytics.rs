use crate::auth::models::AuthContext;
use crate::error::{HttpAppError, ValidatedQuery};
use crate::state::DbState;
use advisor_core::models::{
    CategoryBreakdown, CategoryQuery, DashboardStats, TopSaving, TopSavingsQuery, TrendPoint,
    TrendQuery,
};
use axum::{extract::State, Json};

#[utoipa::path(
    get,
    path = "/api/v1/analytics/dashboard",
    tag = "analytics",
    responses((status = 200, description = "Headline figures", body = DashboardStats)),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, _ctx))]
pub async fn dashboard(
    State(db): State<DbState>,
    _ctx: AuthContext,
) -> Result<Json<DashboardStats>, HttpAppError> {
    Ok(Json(db.analytics_repository.dashboard().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/analytics/categories",
    tag = "analytics",
    params(CategoryQuery),
    responses((status = 200, description = "Count and savings per category", body = [CategoryBreakdown])),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, _ctx))]
pub async fn categories(
    State(db): State<DbState>,
    _ctx: AuthContext,
    ValidatedQuery(query): ValidatedQuery<CategoryQuery>,
) -> Result<Json<Vec<CategoryBreakdown>>, HttpAppError> {
    Ok(Json(db.analytics_repository.categories(query.client_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/analytics/trends",
    tag = "analytics",
    params(TrendQuery),
    responses((status = 200, description = "Reports created and completed per day", body = [TrendPoint])),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, _ctx))]
pub async fn trends(
    State(db): State<DbState>,
    _ctx: AuthContext,
    ValidatedQuery(query): ValidatedQuery<TrendQuery>,
) -> Result<Json<Vec<TrendPoint>>, HttpAppError> {
    Ok(Json(db.analytics_repository.trends(query.days()).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/analytics/top-savings",
    tag = "analytics",
    params(TopSavingsQuery),
    responses((status = 200, description = "Largest savings across completed reports", body = [TopSaving])),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, _ctx))]
pub async fn top_savings(
    State(db): State<DbState>,
    _ctx: AuthContext,
    ValidatedQuery(query): ValidatedQuery<TopSavingsQuery>,
) -> Result<Json<Vec<TopSaving>>, HttpAppError> {
    Ok(Json(
        db.analytics_repository
            .top_savings(query.limit(), query.client_id)
            .await?,
    ))
}
