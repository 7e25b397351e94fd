//! Application setup and initialization

pub mod database;
pub mod routes;
pub mod server;
pub mod services;

use crate::state::AppState;
use advisor_core::Config;
use advisor_storage::Storage;
use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    config.validate().context("Configuration validation failed")?;

    advisor_infra::init_telemetry("advisor-api", config.log_format())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!(
        environment = %config.environment(),
        "Configuration loaded and validated successfully"
    );

    let pool = database::setup_database(&config).await?;

    let storage = advisor_storage::create_storage(&config)
        .await
        .context("Failed to initialize storage")?;
    tracing::info!(backend = %storage.backend_type(), "Storage initialized");

    build_app(config, pool, storage).await
}

/// State and router over an existing pool and storage backend.
pub async fn build_app(
    config: Config,
    pool: PgPool,
    storage: Arc<dyn Storage>,
) -> Result<(Arc<AppState>, axum::Router)> {
    let state = services::initialize_services(&config, pool, storage).await?;
    let router = routes::setup_routes(&config, state.clone())?;
    Ok((state, router))
}
