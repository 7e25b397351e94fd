//! Authenticated route groups.

use crate::handlers;
use crate::state::AppState;
use advisor_core::constants::API_PREFIX;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

fn path(suffix: &str) -> String {
    format!("{}{}", API_PREFIX, suffix)
}

pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new().route(&path("/auth/me"), get(handlers::auth::me))
}

pub fn user_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &path("/users"),
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route(
            &path("/users/{id}"),
            axum::routing::delete(handlers::users::deactivate_user),
        )
}

pub fn client_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &path("/clients"),
            get(handlers::clients::list_clients).post(handlers::clients::create_client),
        )
        .route(
            &path("/clients/{id}"),
            get(handlers::clients::get_client)
                .put(handlers::clients::update_client)
                .delete(handlers::clients::delete_client),
        )
        .route(
            &path("/clients/{id}/reports"),
            get(handlers::clients::client_reports),
        )
        .route(
            &path("/clients/{id}/statistics"),
            get(handlers::clients::client_statistics),
        )
}

pub fn report_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &path("/reports"),
            get(handlers::reports::list_reports).post(handlers::reports::create_report),
        )
        .route(
            &path("/reports/{id}"),
            get(handlers::reports::get_report).delete(handlers::reports::delete_report),
        )
        .route(&path("/reports/{id}/upload"), post(handlers::reports::upload_csv))
        .route(
            &path("/reports/{id}/generate"),
            post(handlers::reports::generate_report),
        )
        .route(&path("/reports/{id}/status"), get(handlers::reports::report_status))
        .route(&path("/reports/{id}/cancel"), post(handlers::reports::cancel_report))
        .route(
            &path("/reports/{id}/download/{format}"),
            get(handlers::reports::download_report),
        )
        .route(
            &path("/reports/{id}/recommendations"),
            get(handlers::reports::report_recommendations),
        )
}

pub fn share_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &path("/reports/{id}/shares"),
            get(handlers::shares::list_shares).post(handlers::shares::create_share),
        )
        .route(
            &path("/reports/{id}/shares/{share_id}"),
            axum::routing::delete(handlers::shares::revoke_share),
        )
}

pub fn recommendation_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &path("/recommendations"),
            get(handlers::recommendations::list_recommendations),
        )
        .route(
            &path("/recommendations/{id}"),
            get(handlers::recommendations::get_recommendation),
        )
}

pub fn template_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &path("/templates"),
            get(handlers::templates::list_templates).post(handlers::templates::create_template),
        )
        .route(
            &path("/templates/{id}"),
            get(handlers::templates::get_template)
                .put(handlers::templates::update_template)
                .delete(handlers::templates::delete_template),
        )
}

pub fn task_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(&path("/tasks"), get(handlers::tasks::list_tasks))
        .route(&path("/tasks/stats"), get(handlers::tasks::task_stats))
        .route(&path("/tasks/{id}"), get(handlers::tasks::get_task))
}

pub fn analytics_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(&path("/analytics/dashboard"), get(handlers::analytics::dashboard))
        .route(&path("/analytics/categories"), get(handlers::analytics::categories))
        .route(&path("/analytics/trends"), get(handlers::analytics::trends))
        .route(
            &path("/analytics/top-savings"),
            get(handlers::analytics::top_savings),
        )
}
