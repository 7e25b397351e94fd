//! Route configuration and setup.
//!
//! Authenticated route groups live in [domains](domains); health checks in [health](health).

mod domains;
pub(crate) mod health;

use crate::auth::auth_middleware;
use crate::handlers;
use crate::middleware::rate_limit::{
    ip_rate_limit_middleware, spawn_cleanup, user_rate_limit_middleware, HttpRateLimiter,
    IpRateLimitState,
};
use crate::state::AppState;
use advisor_core::constants::API_PREFIX;
use advisor_core::Config;
use advisor_infra::{request_id_middleware, security_headers_middleware};
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Room for multipart framing around the largest accepted CSV.
const BODY_LIMIT_SLACK_BYTES: usize = 1024 * 1024;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> anyhow::Result<Router> {
    let cors = setup_cors(config)?;

    let ip_limiter = Arc::new(HttpRateLimiter::new(config.http_rate_limit_per_minute()));
    spawn_cleanup(ip_limiter.clone());
    let ip_limit_state = IpRateLimitState {
        limiter: ip_limiter,
        trusted_proxy_count: config.trusted_proxy_count(),
    };

    let mut protected = protected_routes();
    if let Some(limit) = config.http_user_rate_limit_per_minute() {
        let user_limiter = Arc::new(HttpRateLimiter::new(limit));
        spawn_cleanup(user_limiter.clone());
        protected = protected.layer(from_fn_with_state(user_limiter, user_rate_limit_middleware));
        tracing::info!(limit_per_minute = limit, "Per-user rate limit enabled");
    }
    let protected = protected.layer(from_fn_with_state(state.auth.clone(), auth_middleware));

    let concurrency_limit = config.http_concurrency_limit().max(1);
    tracing::info!(
        http_concurrency_limit = concurrency_limit,
        http_rate_limit_per_minute = config.http_rate_limit_per_minute(),
        "HTTP limits configured"
    );

    let app = public_routes()
        .merge(protected)
        .merge(utoipa_rapidoc::RapiDoc::new("/api/openapi.json").path("/docs"))
        .layer(ConcurrencyLimitLayer::new(concurrency_limit))
        .layer(RequestBodyLimitLayer::new(
            config.max_csv_size_bytes() + BODY_LIMIT_SLACK_BYTES,
        ))
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn_with_state(ip_limit_state, ip_rate_limit_middleware))
        .with_state(state);

    Ok(app)
}

fn setup_cors(config: &Config) -> anyhow::Result<CorsLayer> {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let cors = if config.cors_origins().iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        let origins = config
            .cors_origins()
            .iter()
            .map(|o| {
                o.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("Invalid CORS origin {:?}: {}", o, e))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(Any)
    };
    Ok(cors)
}

fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/live", get(health::liveness_check))
        .route("/ready", get(health::readiness_check))
        .route(
            "/api/openapi.json",
            get(|| async { Json(crate::api_doc::get_openapi_spec()) }),
        )
        .route(
            &format!("{}/auth/login", API_PREFIX),
            post(handlers::auth::login),
        )
        .route(
            &format!("{}/auth/refresh", API_PREFIX),
            post(handlers::auth::refresh),
        )
        .route(
            &format!("{}/shared/{{token}}", API_PREFIX),
            get(handlers::shares::view_shared),
        )
        .route(
            &format!("{}/shared/{{token}}/download/{{format}}", API_PREFIX),
            get(handlers::shares::download_shared),
        )
}

fn protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(domains::auth_routes())
        .merge(domains::user_routes())
        .merge(domains::client_routes())
        .merge(domains::report_routes())
        .merge(domains::share_routes())
        .merge(domains::recommendation_routes())
        .merge(domains::template_routes())
        .merge(domains::task_routes())
        .merge(domains::analytics_routes())
}
