//! Application state and sub-state extractors.
//!
//! Handlers extract only the sub-state they need through Axum's `FromRef`.

use crate::auth::AuthState;
use advisor_core::Config;
use advisor_db::{
    AnalyticsRepository, ClientRepository, RecommendationRepository, ReportRepository,
    ShareRepository, TaskRepository, TemplateRepository, UserRepository,
};
use advisor_storage::Storage;
use advisor_worker::TaskQueue;
use sqlx::PgPool;
use std::sync::Arc;

/// Database pool and every repository.
#[derive(Clone)]
pub struct DbState {
    pub pool: PgPool,
    pub user_repository: UserRepository,
    pub client_repository: ClientRepository,
    pub report_repository: ReportRepository,
    pub recommendation_repository: RecommendationRepository,
    pub template_repository: TemplateRepository,
    pub share_repository: ShareRepository,
    pub analytics_repository: AnalyticsRepository,
}

impl DbState {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: UserRepository::new(pool.clone()),
            client_repository: ClientRepository::new(pool.clone()),
            report_repository: ReportRepository::new(pool.clone()),
            recommendation_repository: RecommendationRepository::new(pool.clone()),
            template_repository: TemplateRepository::new(pool.clone()),
            share_repository: ShareRepository::new(pool.clone()),
            analytics_repository: AnalyticsRepository::new(pool.clone()),
            pool,
        }
    }
}

/// Blob storage and the limits applied to uploaded CSVs.
#[derive(Clone)]
pub struct FileState {
    pub storage: Arc<dyn Storage>,
    pub max_csv_size_bytes: usize,
    pub max_csv_rows: usize,
}

#[derive(Clone)]
pub struct TaskState {
    pub task_queue: TaskQueue,
    pub task_repository: TaskRepository,
}

/// Main application state: aggregates sub-states for dependency injection.
#[derive(Clone)]
pub struct AppState {
    pub db: DbState,
    pub files: FileState,
    pub tasks: TaskState,
    pub auth: Arc<AuthState>,
    pub config: Config,
    pub is_production: bool,
}

impl axum::extract::FromRef<Arc<AppState>> for DbState {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.db.clone()
    }
}

impl axum::extract::FromRef<Arc<AppState>> for FileState {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.files.clone()
    }
}

impl axum::extract::FromRef<Arc<AppState>> for TaskState {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.tasks.clone()
    }
}

fn _assert_app_state_send_sync() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    assert_send::<AppState>();
    assert_sync::<AppState>();
}
