use crate::auth::models::AuthContext;
use crate::error::{ErrorResponse, HttpAppError, ValidatedQuery};
use crate::handlers::not_found;
use crate::state::DbState;
use advisor_core::models::{PageParams, Paginated, Recommendation, RecommendationListQuery};
use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/v1/recommendations",
    tag = "recommendations",
    params(RecommendationListQuery, PageParams),
    responses(
        (status = 200, description = "Page of recommendations"),
        (status = 400, description = "Invalid filter or ordering", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, _ctx))]
pub async fn list_recommendations(
    State(db): State<DbState>,
    _ctx: AuthContext,
    ValidatedQuery(query): ValidatedQuery<RecommendationListQuery>,
    ValidatedQuery(page): ValidatedQuery<PageParams>,
) -> Result<Json<Paginated<Recommendation>>, HttpAppError> {
    let (rows, count) = db.recommendation_repository.list(&query, &page).await?;
    Ok(Json(Paginated::new(rows, count, &page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/recommendations/{id}",
    tag = "recommendations",
    params(("id" = Uuid, Path, description = "Recommendation ID")),
    responses(
        (status = 200, description = "Recommendation", body = Recommendation),
        (status = 404, description = "Recommendation not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(db, _ctx))]
pub async fn get_recommendation(
    State(db): State<DbState>,
    _ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Recommendation>, HttpAppError> {
    let row = db
        .recommendation_repository
        .get(id)
        .await?
        .ok_or_else(|| not_found("Recommendation", id))?;
    Ok(Json(row))
}
