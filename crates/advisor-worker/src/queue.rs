use anyhow::{Context, Result};
use serde_json::json;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use uuid::Uuid;

use advisor_core::models::{Priority, Task, TaskStatus, TaskType};
use advisor_core::{Config, TaskError};
use advisor_db::{NewTask, TaskRepository, TASK_NOTIFY_CHANNEL};
use advisor_infra::RateLimiter;

use crate::context::TaskHandlerContext;

/// Ceiling for the exponential retry delay.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

const LISTEN_RETRY_DELAY: Duration = Duration::from_secs(5);

/// `2^retry_count` seconds, capped.
#[inline]
pub(crate) fn compute_retry_backoff_seconds(retry_count: i32) -> u64 {
    let exponent = retry_count.clamp(0, 16) as u32;
    2_u64.pow(exponent).min(MAX_RETRY_BACKOFF_SECS)
}

fn is_unrecoverable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<TaskError>()
        .map(|te| !te.is_recoverable())
        .unwrap_or(false)
}

#[derive(Clone, Debug)]
pub struct TaskQueueConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub default_timeout_seconds: i32,
    /// 0 disables the stale task reaper.
    pub stale_task_reap_interval_secs: u64,
    pub stale_task_grace_period_secs: i64,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
            default_timeout_seconds: 600,
            stale_task_reap_interval_secs: 60,
            stale_task_grace_period_secs: 120,
        }
    }
}

impl TaskQueueConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_workers: config.task_queue_max_workers().max(1),
            poll_interval_ms: config.task_queue_poll_interval_ms(),
            default_timeout_seconds: config.task_queue_default_timeout_seconds(),
            stale_task_reap_interval_secs: config.task_queue_stale_task_reap_interval_secs(),
            stale_task_grace_period_secs: config.task_queue_stale_task_grace_period_secs(),
        }
    }
}

/// A task to enqueue.
#[derive(Debug, Clone)]
pub struct SubmitTask {
    pub task_type: TaskType,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub max_retries: i32,
    /// Overrides the queue's default timeout.
    pub timeout_seconds: Option<i32>,
    pub report_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
}

pub struct TaskQueue {
    repository: TaskRepository,
    config: TaskQueueConfig,
    shutdown_tx: mpsc::Sender<()>,
}

impl TaskQueue {
    /// Spawns the worker pool. With a `pool`, workers also wake on
    /// `NOTIFY` instead of waiting for the next poll.
    pub fn new(
        repository: TaskRepository,
        rate_limiter: RateLimiter,
        config: TaskQueueConfig,
        context: Weak<dyn TaskHandlerContext>,
        pool: Option<sqlx::PgPool>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let repo_clone = repository.clone();
        let config_clone = config.clone();

        tokio::spawn(async move {
            Self::worker_pool(
                repo_clone,
                rate_limiter,
                config_clone,
                context,
                shutdown_rx,
                pool,
            )
            .await;
        });

        Self {
            repository,
            config,
            shutdown_tx,
        }
    }

    /// A queue that only submits. Whatever it enqueues is picked up by a
    /// worker pool running elsewhere.
    pub fn new_no_worker(repository: TaskRepository, config: TaskQueueConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        drop(shutdown_rx);
        Self {
            repository,
            config,
            shutdown_tx,
        }
    }

    pub fn repository(&self) -> &TaskRepository {
        &self.repository
    }

    #[tracing::instrument(skip(self, task), fields(task_type = %task.task_type, report_id = ?task.report_id))]
    pub async fn submit_task(&self, task: SubmitTask) -> Result<Task> {
        let task_type = task.task_type;
        let created = self
            .repository
            .create_task(NewTask {
                task_type: task.task_type,
                payload: task.payload,
                priority: task.priority.as_i32(),
                max_retries: task.max_retries.max(0),
                timeout_seconds: Some(
                    task.timeout_seconds
                        .unwrap_or(self.config.default_timeout_seconds),
                ),
                report_id: task.report_id,
                created_by: task.created_by,
            })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, task_type = %task_type, "Failed to create task");
                e
            })?;

        tracing::info!(
            task_id = %created.id,
            task_type = %task_type,
            priority = created.priority,
            "Task submitted to queue"
        );

        Ok(created)
    }

    async fn worker_pool(
        repository: TaskRepository,
        rate_limiter: RateLimiter,
        config: TaskQueueConfig,
        context: Weak<dyn TaskHandlerContext>,
        mut shutdown_rx: mpsc::Receiver<()>,
        pool: Option<sqlx::PgPool>,
    ) {
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            listen_notify = pool.is_some(),
            "Task queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        let listener_handle = pool.map(|pool| {
            tokio::spawn(async move {
                loop {
                    match sqlx::postgres::PgListener::connect_with(&pool).await {
                        Ok(mut listener) => {
                            if let Err(e) = listener.listen(TASK_NOTIFY_CHANNEL).await {
                                tracing::warn!(error = %e, "LISTEN failed, will retry");
                                sleep(LISTEN_RETRY_DELAY).await;
                                continue;
                            }
                            while listener.recv().await.is_ok() {
                                // a full channel already guarantees a wakeup
                                let _ = notify_tx.try_send(());
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "PgListener connect failed, will retry");
                            sleep(LISTEN_RETRY_DELAY).await;
                        }
                    }
                }
            })
        });

        let reaper_handle = (config.stale_task_reap_interval_secs > 0).then(|| {
            let repo = repository.clone();
            let reap_interval = Duration::from_secs(config.stale_task_reap_interval_secs);
            let default_timeout = config.default_timeout_seconds;
            let grace_period = config.stale_task_grace_period_secs;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(reap_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    if let Err(e) = repo
                        .reap_stale_running_tasks(default_timeout, grace_period)
                        .await
                    {
                        tracing::error!(error = %e, "Stale task reaper failed");
                    }
                }
            })
        });

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Task queue worker pool shutting down");
                    break;
                }
                Some(()) = notify_rx.recv() => {
                    Self::claim_and_dispatch(&repository, &rate_limiter, &semaphore, &config, &context).await;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch(&repository, &rate_limiter, &semaphore, &config, &context).await;
                }
            }
        }

        if let Some(handle) = listener_handle {
            handle.abort();
        }
        if let Some(handle) = reaper_handle {
            handle.abort();
        }
        tracing::info!("Task queue worker pool stopped");
    }

    /// Claims tasks while workers are free and the queue is not empty.
    async fn claim_and_dispatch(
        repository: &TaskRepository,
        rate_limiter: &RateLimiter,
        semaphore: &Arc<Semaphore>,
        config: &TaskQueueConfig,
        context: &Weak<dyn TaskHandlerContext>,
    ) {
        loop {
            let permit = match semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::trace!("No workers available, skipping claim");
                    return;
                }
            };

            match repository.claim_next_task().await {
                Ok(Some(task)) => {
                    let repo = repository.clone();
                    let limiter = rate_limiter.clone();
                    let ctx = context.clone();
                    let default_timeout = config.default_timeout_seconds;
                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(e) =
                            Self::process_task(task, repo, limiter, ctx, default_timeout).await
                        {
                            tracing::error!(error = %e, "Task processing failed");
                        }
                    });
                }
                Ok(None) => {
                    tracing::trace!("No tasks available in queue");
                    return;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim task from queue");
                    return;
                }
            }
        }
    }

    #[tracing::instrument(skip(repository, rate_limiter, context), fields(task.id = %task.id, task.type = %task.task_type))]
    async fn process_task(
        task: Task,
        repository: TaskRepository,
        rate_limiter: RateLimiter,
        context: Weak<dyn TaskHandlerContext>,
        default_timeout_seconds: i32,
    ) -> Result<()> {
        rate_limiter.acquire(&task.task_type).await;

        let Some(ctx) = context.upgrade() else {
            // hand the task back so another process can run it
            repository
                .update_status(task.id, TaskStatus::Pending)
                .await
                .context("Failed to release task")?;
            anyhow::bail!("Task handler context was dropped, task released");
        };

        let timeout = Duration::from_secs(
            task.timeout_seconds
                .unwrap_or(default_timeout_seconds)
                .max(1) as u64,
        );

        let error = match tokio::time::timeout(timeout, ctx.dispatch_task(&task)).await {
            Ok(Ok(result)) => {
                repository
                    .mark_completed(task.id, result)
                    .await
                    .context("Failed to mark task as completed")?;
                tracing::info!(task_id = %task.id, task_type = %task.task_type, "Task completed");
                return Ok(());
            }
            Ok(Err(e)) => e,
            Err(_) => anyhow::anyhow!("Task execution timed out after {}s", timeout.as_secs()),
        };

        let unrecoverable = is_unrecoverable(&error);
        tracing::error!(
            task_id = %task.id,
            error = %error,
            retry_count = task.retry_count,
            max_retries = task.max_retries,
            unrecoverable,
            "Task execution failed"
        );

        if !unrecoverable && task.can_retry() {
            let backoff_seconds = compute_retry_backoff_seconds(task.retry_count);
            repository
                .schedule_retry(
                    task.id,
                    backoff_seconds as i64,
                    json!({ "error": error.to_string(), "retry_count": task.retry_count + 1 }),
                )
                .await
                .context("Failed to schedule task retry")?;
            return Ok(());
        }

        let reason = if unrecoverable {
            "Task failed with an unrecoverable error"
        } else {
            "Task failed after maximum retries"
        };
        repository
            .mark_failed(
                task.id,
                json!({
                    "error": error.to_string(),
                    "retry_count": task.retry_count,
                    "unrecoverable": unrecoverable,
                    "reason": reason,
                }),
            )
            .await
            .context("Failed to mark task as failed")?;
        Err(error)
    }

    /// Stops claiming new tasks. In-flight tasks run to completion or timeout.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating task queue shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl Clone for TaskQueue {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            config: self.config.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_exponential_then_capped() {
        assert_eq!(compute_retry_backoff_seconds(0), 1);
        assert_eq!(compute_retry_backoff_seconds(1), 2);
        assert_eq!(compute_retry_backoff_seconds(4), 16);
        assert_eq!(compute_retry_backoff_seconds(8), 256);
        assert_eq!(compute_retry_backoff_seconds(9), MAX_RETRY_BACKOFF_SECS);
        assert_eq!(compute_retry_backoff_seconds(40), MAX_RETRY_BACKOFF_SECS);
        assert_eq!(compute_retry_backoff_seconds(-1), 1);
    }

    #[test]
    fn unrecoverable_task_error_detected() {
        let err: anyhow::Error = TaskError::unrecoverable(anyhow::anyhow!("bad csv")).into();
        assert!(is_unrecoverable(&err));
    }

    #[test]
    fn recoverable_and_plain_errors_are_retried() {
        let err: anyhow::Error = TaskError::recoverable(anyhow::anyhow!("storage timeout")).into();
        assert!(!is_unrecoverable(&err));
        assert!(!is_unrecoverable(&anyhow::anyhow!("generic error")));
    }
}
