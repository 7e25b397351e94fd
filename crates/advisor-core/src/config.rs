//! Configuration module
//!
//! Settings are read from the environment (after loading `.env` when present) into
//! `ServiceConfig`, then exposed through the cheap-to-clone `Config` wrapper.

use std::env;

use crate::storage_types::StorageBackend;

const SERVER_PORT: u16 = 8000;
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const JWT_ACCESS_TTL_MINUTES: i64 = 60;
const JWT_REFRESH_TTL_DAYS: i64 = 7;
const HTTP_RATE_LIMIT_PER_MINUTE: u32 = 100;
const HTTP_USER_RATE_LIMIT_PER_MINUTE: u32 = 200;
const HTTP_CONCURRENCY_LIMIT: usize = 512;

/// Settings shared by every process that serves HTTP
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub jwt_secret: String,
    pub jwt_access_ttl_minutes: i64,
    pub jwt_refresh_ttl_days: i64,
    pub http_rate_limit_per_minute: u32,
    pub http_user_rate_limit_per_minute: Option<u32>,
    pub http_concurrency_limit: usize,
    /// Proxies in front of the server whose `X-Forwarded-For` entries are trusted
    pub trusted_proxy_count: usize,
    pub environment: String,
    /// `json` switches the log formatter to JSON lines
    pub log_format: String,
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub base: BaseConfig,
    pub database_url: String,
    pub master_api_key: Option<String>,
    pub bootstrap_admin_email: Option<String>,
    pub bootstrap_admin_password: Option<String>,
    // Storage
    pub storage_backend: StorageBackend,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub azure_storage_account: Option<String>,
    pub azure_storage_access_key: Option<String>,
    pub azure_storage_container: Option<String>,
    pub azure_storage_use_emulator: bool,
    // Ingestion and rendering
    pub max_csv_size_bytes: usize,
    pub max_csv_rows: usize,
    pub sync_generation_timeout_secs: u64,
    // Sharing
    pub share_default_expiry_days: i64,
    pub share_max_expiry_days: i64,
    // Task queue
    pub task_queue_max_workers: usize,
    pub task_queue_poll_interval_ms: u64,
    /// Report generation tasks started per second
    pub task_queue_generation_rate_limit: f64,
    pub task_queue_default_timeout_seconds: i32,
    /// 0 disables the stale task reaper.
    pub task_queue_stale_task_reap_interval_secs: u64,
    pub task_queue_stale_task_grace_period_secs: i64,
    /// Finished tasks older than this are deleted by the cleanup service. 0 = keep forever.
    pub task_retention_days: i32,
    pub cleanup_interval_secs: u64,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<ServiceConfig>);

impl Config {
    fn inner(&self) -> &ServiceConfig {
        &self.0
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = ServiceConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        is_production_name(&self.inner().base.environment)
    }

    pub fn server_port(&self) -> u16 {
        self.inner().base.server_port
    }

    pub fn environment(&self) -> &str {
        &self.inner().base.environment
    }

    pub fn log_format(&self) -> &str {
        &self.inner().base.log_format
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.inner().base.cors_origins
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().base.db_timeout_seconds
    }

    pub fn jwt_secret(&self) -> &str {
        &self.inner().base.jwt_secret
    }

    pub fn jwt_access_ttl_minutes(&self) -> i64 {
        self.inner().base.jwt_access_ttl_minutes
    }

    pub fn jwt_refresh_ttl_days(&self) -> i64 {
        self.inner().base.jwt_refresh_ttl_days
    }

    pub fn http_rate_limit_per_minute(&self) -> u32 {
        self.inner().base.http_rate_limit_per_minute
    }

    pub fn http_user_rate_limit_per_minute(&self) -> Option<u32> {
        self.inner().base.http_user_rate_limit_per_minute
    }

    pub fn http_concurrency_limit(&self) -> usize {
        self.inner().base.http_concurrency_limit
    }

    pub fn trusted_proxy_count(&self) -> usize {
        self.inner().base.trusted_proxy_count
    }

    pub fn database_url(&self) -> &str {
        &self.inner().database_url
    }

    pub fn master_api_key(&self) -> Option<&str> {
        self.inner().master_api_key.as_deref()
    }

    pub fn bootstrap_admin(&self) -> Option<(&str, &str)> {
        match (
            self.inner().bootstrap_admin_email.as_deref(),
            self.inner().bootstrap_admin_password.as_deref(),
        ) {
            (Some(email), Some(password)) => Some((email, password)),
            _ => None,
        }
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.inner().storage_backend
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.inner().local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.inner().local_storage_base_url.as_deref()
    }

    pub fn azure_storage_account(&self) -> Option<&str> {
        self.inner().azure_storage_account.as_deref()
    }

    pub fn azure_storage_access_key(&self) -> Option<&str> {
        self.inner().azure_storage_access_key.as_deref()
    }

    pub fn azure_storage_container(&self) -> Option<&str> {
        self.inner().azure_storage_container.as_deref()
    }

    pub fn azure_storage_use_emulator(&self) -> bool {
        self.inner().azure_storage_use_emulator
    }

    pub fn max_csv_size_bytes(&self) -> usize {
        self.inner().max_csv_size_bytes
    }

    pub fn max_csv_rows(&self) -> usize {
        self.inner().max_csv_rows
    }

    pub fn sync_generation_timeout_secs(&self) -> u64 {
        self.inner().sync_generation_timeout_secs
    }

    pub fn share_default_expiry_days(&self) -> i64 {
        self.inner().share_default_expiry_days
    }

    pub fn share_max_expiry_days(&self) -> i64 {
        self.inner().share_max_expiry_days
    }

    pub fn task_queue_max_workers(&self) -> usize {
        self.inner().task_queue_max_workers
    }

    pub fn task_queue_poll_interval_ms(&self) -> u64 {
        self.inner().task_queue_poll_interval_ms
    }

    pub fn task_queue_generation_rate_limit(&self) -> f64 {
        self.inner().task_queue_generation_rate_limit
    }

    pub fn task_queue_default_timeout_seconds(&self) -> i32 {
        self.inner().task_queue_default_timeout_seconds
    }

    pub fn task_queue_stale_task_reap_interval_secs(&self) -> u64 {
        self.inner().task_queue_stale_task_reap_interval_secs
    }

    pub fn task_queue_stale_task_grace_period_secs(&self) -> i64 {
        self.inner().task_queue_stale_task_grace_period_secs
    }

    pub fn task_retention_days(&self) -> i32 {
        self.inner().task_retention_days
    }

    pub fn cleanup_interval_secs(&self) -> u64 {
        self.inner().cleanup_interval_secs
    }

    /// Age after which a report still in `processing`/`generating` is treated
    /// as abandoned: the longest a run may legitimately take plus the grace period.
    pub fn stalled_report_run_secs(&self) -> u64 {
        let longest_run = (self.task_queue_default_timeout_seconds().max(1) as u64)
            .max(self.sync_generation_timeout_secs());
        longest_run + self.task_queue_stale_task_grace_period_secs().max(0) as u64
    }
}

fn is_production_name(environment: &str) -> bool {
    let env = environment.to_lowercase();
    env == "production" || env == "prod"
}

/// Reads `key` through `lookup` and parses it, falling back to `default` when the
/// variable is missing or malformed.
fn parsed_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|value| !value.trim().is_empty())
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the configuration from an arbitrary variable source. Does not validate.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        const MAX_CSV_SIZE_MB: usize = 50;
        const MAX_CSV_ROWS: usize = 100_000;
        const SYNC_GENERATION_TIMEOUT_SECS: u64 = 120;
        const SHARE_DEFAULT_EXPIRY_DAYS: i64 = 7;
        const SHARE_MAX_EXPIRY_DAYS: i64 = 90;
        const TASK_QUEUE_MAX_WORKERS: usize = 4;
        const TASK_QUEUE_POLL_INTERVAL_MS: u64 = 1000;
        const TASK_QUEUE_GENERATION_RATE_LIMIT: f64 = 2.0;
        const TASK_QUEUE_DEFAULT_TIMEOUT_SECS: i32 = 900;
        const STALE_TASK_REAP_INTERVAL_SECS: u64 = 60;
        const STALE_TASK_GRACE_PERIOD_SECS: i64 = 300;
        const TASK_RETENTION_DAYS: i32 = 30;
        const CLEANUP_INTERVAL_SECS: u64 = 3600;

        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let cors_origins: Vec<String> = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let server_port = match lookup("PORT") {
            Some(port) => port
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            None => SERVER_PORT,
        };

        let base = BaseConfig {
            server_port,
            cors_origins,
            db_max_connections: parsed_or(&lookup, "DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: parsed_or(&lookup, "DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            jwt_secret: lookup("JWT_SECRET")
                .ok_or_else(|| anyhow::anyhow!("JWT_SECRET must be set for authentication"))?,
            jwt_access_ttl_minutes: parsed_or(
                &lookup,
                "JWT_ACCESS_TTL_MINUTES",
                JWT_ACCESS_TTL_MINUTES,
            ),
            jwt_refresh_ttl_days: parsed_or(&lookup, "JWT_REFRESH_TTL_DAYS", JWT_REFRESH_TTL_DAYS),
            http_rate_limit_per_minute: parsed_or(
                &lookup,
                "HTTP_RATE_LIMIT_PER_MINUTE",
                HTTP_RATE_LIMIT_PER_MINUTE,
            ),
            http_user_rate_limit_per_minute: Some(parsed_or(
                &lookup,
                "HTTP_USER_RATE_LIMIT_PER_MINUTE",
                HTTP_USER_RATE_LIMIT_PER_MINUTE,
            ))
            .filter(|limit| *limit > 0),
            http_concurrency_limit: parsed_or(
                &lookup,
                "HTTP_CONCURRENCY_LIMIT",
                HTTP_CONCURRENCY_LIMIT,
            ),
            trusted_proxy_count: parsed_or(&lookup, "TRUSTED_PROXY_COUNT", 0),
            environment,
            log_format: lookup("LOG_FORMAT")
                .unwrap_or_else(|| "pretty".to_string())
                .to_lowercase(),
        };

        let storage_backend = match non_empty(&lookup, "STORAGE_BACKEND") {
            Some(value) => value.parse()?,
            None => StorageBackend::Local,
        };

        Ok(ServiceConfig {
            base,
            database_url: lookup("DATABASE_URL")
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?,
            master_api_key: non_empty(&lookup, "MASTER_API_KEY"),
            bootstrap_admin_email: non_empty(&lookup, "BOOTSTRAP_ADMIN_EMAIL"),
            bootstrap_admin_password: non_empty(&lookup, "BOOTSTRAP_ADMIN_PASSWORD"),
            storage_backend,
            local_storage_path: non_empty(&lookup, "LOCAL_STORAGE_PATH")
                .or_else(|| Some("./storage".to_string())),
            local_storage_base_url: non_empty(&lookup, "LOCAL_STORAGE_BASE_URL")
                .or_else(|| Some(format!("http://localhost:{}/files", server_port))),
            azure_storage_account: non_empty(&lookup, "AZURE_STORAGE_ACCOUNT"),
            azure_storage_access_key: non_empty(&lookup, "AZURE_STORAGE_ACCESS_KEY"),
            azure_storage_container: non_empty(&lookup, "AZURE_STORAGE_CONTAINER"),
            azure_storage_use_emulator: parsed_or(&lookup, "AZURE_STORAGE_USE_EMULATOR", false),
            max_csv_size_bytes: parsed_or(&lookup, "MAX_CSV_SIZE_MB", MAX_CSV_SIZE_MB)
                * 1024
                * 1024,
            max_csv_rows: parsed_or(&lookup, "MAX_CSV_ROWS", MAX_CSV_ROWS),
            sync_generation_timeout_secs: parsed_or(
                &lookup,
                "SYNC_GENERATION_TIMEOUT_SECS",
                SYNC_GENERATION_TIMEOUT_SECS,
            ),
            share_default_expiry_days: parsed_or(
                &lookup,
                "SHARE_DEFAULT_EXPIRY_DAYS",
                SHARE_DEFAULT_EXPIRY_DAYS,
            ),
            share_max_expiry_days: parsed_or(
                &lookup,
                "SHARE_MAX_EXPIRY_DAYS",
                SHARE_MAX_EXPIRY_DAYS,
            ),
            task_queue_max_workers: parsed_or(
                &lookup,
                "TASK_QUEUE_MAX_WORKERS",
                TASK_QUEUE_MAX_WORKERS,
            ),
            task_queue_poll_interval_ms: parsed_or(
                &lookup,
                "TASK_QUEUE_POLL_INTERVAL_MS",
                TASK_QUEUE_POLL_INTERVAL_MS,
            ),
            task_queue_generation_rate_limit: parsed_or(
                &lookup,
                "TASK_QUEUE_GENERATION_RATE",
                TASK_QUEUE_GENERATION_RATE_LIMIT,
            ),
            task_queue_default_timeout_seconds: parsed_or(
                &lookup,
                "TASK_QUEUE_DEFAULT_TIMEOUT_SECONDS",
                TASK_QUEUE_DEFAULT_TIMEOUT_SECS,
            ),
            task_queue_stale_task_reap_interval_secs: parsed_or(
                &lookup,
                "TASK_QUEUE_STALE_TASK_REAP_INTERVAL_SECS",
                STALE_TASK_REAP_INTERVAL_SECS,
            ),
            task_queue_stale_task_grace_period_secs: parsed_or(
                &lookup,
                "TASK_QUEUE_STALE_TASK_GRACE_PERIOD_SECS",
                STALE_TASK_GRACE_PERIOD_SECS,
            ),
            task_retention_days: parsed_or(&lookup, "TASK_RETENTION_DAYS", TASK_RETENTION_DAYS),
            cleanup_interval_secs: parsed_or(
                &lookup,
                "CLEANUP_INTERVAL_SECS",
                CLEANUP_INTERVAL_SECS,
            ),
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.base.jwt_secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 characters long"
            ));
        }

        if !(self.database_url.starts_with("postgresql://")
            || self.database_url.starts_with("postgres://"))
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if is_production_name(&self.base.environment)
            && self.base.cors_origins.iter().any(|origin| origin == "*")
        {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        if let Some(key) = &self.master_api_key {
            if key.len() < 32 {
                return Err(anyhow::anyhow!(
                    "MASTER_API_KEY must be at least 32 characters long"
                ));
            }
        }

        match (&self.bootstrap_admin_email, &self.bootstrap_admin_password) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(anyhow::anyhow!(
                    "BOOTSTRAP_ADMIN_EMAIL and BOOTSTRAP_ADMIN_PASSWORD must be set together"
                ));
            }
            (Some(_), Some(password)) if password.len() < 8 => {
                return Err(anyhow::anyhow!(
                    "BOOTSTRAP_ADMIN_PASSWORD must be at least 8 characters long"
                ));
            }
            _ => {}
        }

        match self.storage_backend {
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH is required for the local storage backend"
                    ));
                }
            }
            StorageBackend::Azure => {
                if self.azure_storage_container.is_none() {
                    return Err(anyhow::anyhow!(
                        "AZURE_STORAGE_CONTAINER is required for the azure storage backend"
                    ));
                }
                if !self.azure_storage_use_emulator
                    && (self.azure_storage_account.is_none()
                        || self.azure_storage_access_key.is_none())
                {
                    return Err(anyhow::anyhow!(
                        "AZURE_STORAGE_ACCOUNT and AZURE_STORAGE_ACCESS_KEY are required unless AZURE_STORAGE_USE_EMULATOR=true"
                    ));
                }
            }
        }

        if self.share_default_expiry_days < 1
            || self.share_default_expiry_days > self.share_max_expiry_days
        {
            return Err(anyhow::anyhow!(
                "SHARE_DEFAULT_EXPIRY_DAYS must be between 1 and SHARE_MAX_EXPIRY_DAYS"
            ));
        }

        if self.task_queue_max_workers == 0 {
            return Err(anyhow::anyhow!("TASK_QUEUE_MAX_WORKERS must be at least 1"));
        }

        Ok(())
    }
}
