//! OpenAPI documentation served at `/api/openapi.json` and rendered by RapiDoc at `/docs`.

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error;
use crate::handlers;
use crate::setup::routes::health;
use advisor_core::models;

/// Returns the OpenAPI spec for the whole API.
pub fn get_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        let mut scheme = Http::new(HttpAuthScheme::Bearer);
        scheme.bearer_format = Some("JWT".to_string());
        components.add_security_scheme("bearer_auth", SecurityScheme::Http(scheme));
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Advisor Reports API",
        version = "0.1.0",
        description = "Turns Azure Advisor CSV exports into client-ready HTML and PDF reports"
    ),
    modifiers(&BearerAuth),
    paths(
        // Health
        health::health_check,
        health::liveness_check,
        health::readiness_check,
        // Auth
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::me,
        // Users
        handlers::users::list_users,
        handlers::users::create_user,
        handlers::users::deactivate_user,
        // Clients
        handlers::clients::list_clients,
        handlers::clients::create_client,
        handlers::clients::get_client,
        handlers::clients::update_client,
        handlers::clients::delete_client,
        handlers::clients::client_reports,
        handlers::clients::client_statistics,
        // Reports
        handlers::reports::list_reports,
        handlers::reports::create_report,
        handlers::reports::get_report,
        handlers::reports::delete_report,
        handlers::reports::upload_csv,
        handlers::reports::generate_report,
        handlers::reports::report_status,
        handlers::reports::cancel_report,
        handlers::reports::download_report,
        handlers::reports::report_recommendations,
        // Shares
        handlers::shares::create_share,
        handlers::shares::list_shares,
        handlers::shares::revoke_share,
        handlers::shares::view_shared,
        handlers::shares::download_shared,
        // Recommendations
        handlers::recommendations::list_recommendations,
        handlers::recommendations::get_recommendation,
        // Templates
        handlers::templates::list_templates,
        handlers::templates::create_template,
        handlers::templates::get_template,
        handlers::templates::update_template,
        handlers::templates::delete_template,
        // Tasks
        handlers::tasks::list_tasks,
        handlers::tasks::get_task,
        handlers::tasks::task_stats,
        // Analytics
        handlers::analytics::dashboard,
        handlers::analytics::categories,
        handlers::analytics::trends,
        handlers::analytics::top_savings,
    ),
    components(
        schemas(
            // Users and auth
            models::UserRole,
            models::UserResponse,
            models::CreateUserRequest,
            models::LoginRequest,
            models::RefreshRequest,
            models::TokenResponse,
            // Clients
            models::ClientStatus,
            models::Client,
            models::CreateClientRequest,
            models::UpdateClientRequest,
            models::StatusCount,
            models::ClientStatistics,
            // Reports
            models::ReportType,
            models::ReportStatus,
            models::ReportFormat,
            models::Report,
            models::ReportResponse,
            models::CreateReportRequest,
            models::GenerateReportRequest,
            models::GenerateAcceptedResponse,
            handlers::reports::ReportStatusResponse,
            // Recommendations
            models::Category,
            models::BusinessImpact,
            models::Recommendation,
            // Templates
            models::ReportTemplate,
            models::CreateTemplateRequest,
            models::UpdateTemplateRequest,
            // Shares
            models::ReportShare,
            models::CreateShareRequest,
            models::ShareResponse,
            models::SharedReportView,
            // Tasks
            models::TaskType,
            models::TaskStatus,
            models::TaskState,
            models::TaskStatusResponse,
            models::TaskStats,
            handlers::tasks::TaskListResponse,
            // Analytics
            models::AnalysisSummary,
            models::CategorySummary,
            models::ImpactSummary,
            models::TopRecommendation,
            models::DashboardStats,
            models::CategoryBreakdown,
            models::TrendPoint,
            models::TopSaving,
            // Health and errors
            health::HealthCheckResponse,
            error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Liveness, readiness and dependency health"),
        (name = "auth", description = "Login, token refresh and the current user"),
        (name = "users", description = "User administration"),
        (name = "clients", description = "Client organizations"),
        (name = "reports", description = "Report lifecycle: upload, generate, download"),
        (name = "shares", description = "Public share links for completed reports"),
        (name = "recommendations", description = "Imported Azure Advisor recommendations"),
        (name = "templates", description = "Report templates"),
        (name = "tasks", description = "Background task status"),
        (name = "analytics", description = "Portfolio-wide statistics")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_lists_versioned_paths_and_bearer_scheme() {
        let spec = get_openapi_spec();
        assert!(spec.paths.paths.contains_key("/api/v1/reports/{id}/generate"));
        assert!(spec.paths.paths.contains_key("/health"));
        let components = spec.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
