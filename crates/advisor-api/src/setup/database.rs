//! Postgres pool and schema migrations

use advisor_core::Config;
use anyhow::{Context, Result};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Workspace migrations, embedded at compile time so the binary needs no
/// `migrations/` directory at runtime.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(600);
const POOL_MAX_LIFETIME: Duration = Duration::from_secs(1800);

pub async fn setup_database(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections())
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds()))
        .idle_timeout(POOL_IDLE_TIMEOUT)
        .max_lifetime(POOL_MAX_LIFETIME)
        .connect(config.database_url())
        .await
        .context("Failed to connect to Postgres")?;
    tracing::info!(
        max_connections = config.db_max_connections(),
        acquire_timeout_secs = config.db_timeout_seconds(),
        "Postgres pool ready"
    );

    MIGRATOR
        .run(&pool)
        .await
        .context("Failed to apply schema migrations")?;
    tracing::info!(count = MIGRATOR.iter().count(), "Schema migrations up to date");

    Ok(pool)
}
