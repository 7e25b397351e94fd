//! Service initialization and application state setup

use crate::auth::middleware::{AUTH_FAILURE_LIMIT, AUTH_FAILURE_WINDOW_SECS};
use crate::auth::password::hash_password;
use crate::auth::{AuthFailureLimiter, AuthState, JwtService};
use crate::state::{AppState, DbState, FileState, TaskState};
use advisor_core::models::UserRole;
use advisor_core::{AppError, Config};
use advisor_db::{NewUser, TaskRepository, UserRepository};
use advisor_infra::{CleanupService, RateLimiter};
use advisor_storage::Storage;
use advisor_worker::{TaskHandlerContext, TaskQueue, TaskQueueConfig};
use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Builds the application state, starts the task workers and the cleanup loop.
pub async fn initialize_services(
    config: &Config,
    pool: PgPool,
    storage: Arc<dyn Storage>,
) -> Result<Arc<AppState>> {
    let db = DbState::new(pool.clone());
    let task_repository = TaskRepository::new(pool.clone());

    let files = FileState {
        storage,
        max_csv_size_bytes: config.max_csv_size_bytes(),
        max_csv_rows: config.max_csv_rows(),
    };

    let auth = Arc::new(AuthState {
        jwt: JwtService::new(
            config.jwt_secret(),
            config.jwt_access_ttl_minutes(),
            config.jwt_refresh_ttl_days(),
        ),
        master_api_key: config.master_api_key().map(String::from),
        user_repository: db.user_repository.clone(),
        failure_limiter: AuthFailureLimiter::new(AUTH_FAILURE_LIMIT, AUTH_FAILURE_WINDOW_SECS),
        trusted_proxy_count: config.trusted_proxy_count(),
    });

    let is_production = config.is_production();
    tracing::info!(
        environment = %config.environment(),
        is_production,
        "Environment configuration loaded"
    );

    let rate_limiter = RateLimiter::new(config.task_queue_generation_rate_limit());
    let queue_config = TaskQueueConfig::from_config(config);

    // The worker pool dispatches through a weak handle on the state it lives in.
    let state = Arc::new_cyclic(|weak: &Weak<AppState>| {
        let context: Weak<dyn TaskHandlerContext> = weak.clone();
        let task_queue = TaskQueue::new(
            task_repository.clone(),
            rate_limiter,
            queue_config,
            context,
            Some(pool.clone()),
        );
        AppState {
            db,
            files,
            tasks: TaskState {
                task_queue,
                task_repository: task_repository.clone(),
            },
            auth,
            config: config.clone(),
            is_production,
        }
    });
    tracing::info!(
        max_workers = config.task_queue_max_workers(),
        generation_rate_limit = config.task_queue_generation_rate_limit(),
        "Task queue system initialized successfully"
    );

    let cleanup = CleanupService::new(
        state.db.share_repository.clone(),
        task_repository,
        state.db.report_repository.clone(),
        Duration::from_secs(config.stalled_report_run_secs()),
        config.task_retention_days(),
        Duration::from_secs(config.cleanup_interval_secs().max(1)),
    );
    Arc::new(cleanup).start();
    tracing::info!(
        interval_secs = config.cleanup_interval_secs(),
        "Started cleanup background task"
    );

    bootstrap_admin(config, &state.db.user_repository)
        .await
        .context("Failed to create the bootstrap admin user")?;

    Ok(state)
}

/// Creates the configured admin account unless a user with that email exists.
async fn bootstrap_admin(config: &Config, users: &UserRepository) -> Result<()> {
    let Some((email, password)) = config.bootstrap_admin() else {
        return Ok(());
    };

    if users.find_by_email(email).await?.is_some() {
        tracing::debug!(email = %email, "Bootstrap admin already exists");
        return Ok(());
    }

    let created = users
        .create(NewUser {
            email: email.to_string(),
            password_hash: hash_password(password)?,
            full_name: "Administrator".to_string(),
            role: UserRole::Admin,
        })
        .await;

    match created {
        Ok(user) => {
            tracing::info!(user_id = %user.id, email = %user.email, "Bootstrap admin created");
            Ok(())
        }
        // another instance created it first
        Err(AppError::Conflict(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
