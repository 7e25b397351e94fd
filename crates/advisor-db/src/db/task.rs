use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use advisor_core::models::{Task, TaskListQuery, TaskStats, TaskStatus, TaskType};

/// Channel workers LISTEN on; a notification means "a task may be claimable now".
pub const TASK_NOTIFY_CHANNEL: &str = "advisor_new_task";

macro_rules! task_columns {
    () => {
        r#"id, task_type, status, priority, payload, result, scheduled_at, started_at,
           completed_at, retry_count, max_retries, timeout_seconds, report_id, created_by,
           created_at, updated_at"#
    };
}

/// Arguments for [`TaskRepository::create_task`].
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_type: TaskType,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub max_retries: i32,
    pub timeout_seconds: Option<i32>,
    pub report_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
}

#[derive(Clone)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a task and notifies workers in the same transaction.
    #[tracing::instrument(skip(self, task), fields(db.table = "tasks", db.operation = "insert", task_type = %task.task_type))]
    pub async fn create_task(&self, task: NewTask) -> Result<Task> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for task creation")?;

        let created: Task = sqlx::query_as::<Postgres, Task>(concat!(
            r#"
            INSERT INTO tasks (
                task_type, status, priority, payload, max_retries, timeout_seconds,
                report_id, created_by
            )
            VALUES ($1, 'pending', $2, $3, $4, $5, $6, $7)
            RETURNING "#,
            task_columns!()
        ))
        .bind(task.task_type.to_string())
        .bind(task.priority)
        .bind(&task.payload)
        .bind(task.max_retries.max(0))
        .bind(task.timeout_seconds)
        .bind(task.report_id)
        .bind(task.created_by)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert task")?;

        // Workers also poll, so a failed NOTIFY only delays pickup.
        if let Err(e) = sqlx::query("SELECT pg_notify($1, '')")
            .bind(TASK_NOTIFY_CHANNEL)
            .execute(&mut *tx)
            .await
        {
            tracing::warn!(
                error = %e,
                task_id = %created.id,
                "Failed to send pg_notify for new task, workers will discover task via polling"
            );
        }

        tx.commit()
            .await
            .context("Failed to commit task creation")?;

        tracing::info!(
            task_id = %created.id,
            task_type = %created.task_type,
            report_id = ?created.report_id,
            max_retries = created.max_retries,
            "Task created"
        );

        Ok(created)
    }

    #[tracing::instrument(skip(self), fields(db.table = "tasks", db.operation = "select", db.record_id = %task_id))]
    pub async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        sqlx::query_as::<Postgres, Task>(concat!(
            "SELECT ",
            task_columns!(),
            " FROM tasks WHERE id = $1"
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch task")
    }

    #[tracing::instrument(skip(self), fields(db.table = "tasks", db.operation = "select"))]
    pub async fn list_tasks(&self, query: &TaskListQuery) -> Result<Vec<Task>> {
        let limit = query.limit.unwrap_or(50).clamp(1, 1000);
        let offset = query.offset.unwrap_or(0).max(0);

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(concat!("SELECT ", task_columns!(), " FROM tasks WHERE TRUE"));
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(report_id) = query.report_id {
            builder.push(" AND report_id = ").push_bind(report_id);
        }
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        builder
            .build_query_as::<Task>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list tasks")
    }

    /// Most recent task of `task_type` attached to a report.
    #[tracing::instrument(skip(self), fields(db.table = "tasks", db.operation = "select"))]
    pub async fn latest_for_report(
        &self,
        report_id: Uuid,
        task_type: TaskType,
    ) -> Result<Option<Task>> {
        sqlx::query_as::<Postgres, Task>(concat!(
            "SELECT ",
            task_columns!(),
            r#" FROM tasks
            WHERE report_id = $1 AND task_type = $2
            ORDER BY created_at DESC
            LIMIT 1"#
        ))
        .bind(report_id)
        .bind(task_type.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch latest task for report")
    }

    /// Whether a queued or running task of `task_type` exists for the report.
    #[tracing::instrument(skip(self), fields(db.table = "tasks", db.operation = "select"))]
    pub async fn has_active_for_report(&self, report_id: Uuid, task_type: TaskType) -> Result<bool> {
        sqlx::query_scalar::<Postgres, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM tasks
                WHERE report_id = $1
                    AND task_type = $2
                    AND status IN ('pending', 'scheduled', 'running')
            )
            "#,
        )
        .bind(report_id)
        .bind(task_type.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to check active tasks for report")
    }

    /// Atomically claims the next runnable task in priority order.
    #[tracing::instrument(skip(self), fields(db.table = "tasks", db.operation = "update"))]
    pub async fn claim_next_task(&self) -> Result<Option<Task>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let next_id: Option<Uuid> = sqlx::query_scalar::<Postgres, Uuid>(
            r#"
            SELECT id
            FROM tasks
            WHERE status IN ('pending', 'scheduled')
                AND scheduled_at <= NOW()
            ORDER BY priority DESC, scheduled_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to fetch next task")?;

        let Some(task_id) = next_id else {
            tx.rollback().await.ok();
            return Ok(None);
        };

        let task: Task = sqlx::query_as::<Postgres, Task>(concat!(
            r#"
            UPDATE tasks
            SET status = 'running',
                started_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING "#,
            task_columns!()
        ))
        .bind(task_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to mark task running")?;

        tx.commit().await.context("Failed to commit task claim")?;

        tracing::debug!(
            task_id = %task.id,
            task_type = %task.task_type,
            "Task claimed"
        );

        Ok(Some(task))
    }

    #[tracing::instrument(skip(self), fields(db.table = "tasks", db.operation = "update", db.record_id = %task_id))]
    pub async fn update_status(&self, task_id: Uuid, status: TaskStatus) -> Result<Task> {
        sqlx::query_as::<Postgres, Task>(concat!(
            r#"
            UPDATE tasks
            SET status = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING "#,
            task_columns!()
        ))
        .bind(task_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .context("Failed to update task status")
    }

    #[tracing::instrument(skip(self, result), fields(db.table = "tasks", db.operation = "update", db.record_id = %task_id))]
    pub async fn mark_completed(&self, task_id: Uuid, result: serde_json::Value) -> Result<Task> {
        let task = sqlx::query_as::<Postgres, Task>(concat!(
            r#"
            UPDATE tasks
            SET status = 'completed',
                result = $2,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING "#,
            task_columns!()
        ))
        .bind(task_id)
        .bind(result)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark task as completed")?;

        tracing::info!(
            task_id = %task_id,
            task_type = %task.task_type,
            "Task completed"
        );

        Ok(task)
    }

    #[tracing::instrument(skip(self, error), fields(db.table = "tasks", db.operation = "update", db.record_id = %task_id))]
    pub async fn mark_failed(&self, task_id: Uuid, error: serde_json::Value) -> Result<Task> {
        let task = sqlx::query_as::<Postgres, Task>(concat!(
            r#"
            UPDATE tasks
            SET status = 'failed',
                result = $2,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING "#,
            task_columns!()
        ))
        .bind(task_id)
        .bind(error)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark task as failed")?;

        tracing::error!(
            task_id = %task_id,
            task_type = %task.task_type,
            retry_count = task.retry_count,
            "Task failed"
        );

        Ok(task)
    }

    /// Records a failed attempt and schedules the next one `delay_secs` from now.
    #[tracing::instrument(skip(self, error), fields(db.table = "tasks", db.operation = "update", db.record_id = %task_id))]
    pub async fn schedule_retry(
        &self,
        task_id: Uuid,
        delay_secs: i64,
        error: serde_json::Value,
    ) -> Result<Task> {
        let task = sqlx::query_as::<Postgres, Task>(concat!(
            r#"
            UPDATE tasks
            SET status = 'scheduled',
                retry_count = retry_count + 1,
                result = $3,
                started_at = NULL,
                scheduled_at = NOW() + ($2 * interval '1 second'),
                updated_at = NOW()
            WHERE id = $1
            RETURNING "#,
            task_columns!()
        ))
        .bind(task_id)
        .bind(delay_secs as f64)
        .bind(error)
        .fetch_one(&self.pool)
        .await
        .context("Failed to schedule task retry")?;

        tracing::info!(
            task_id = %task_id,
            retry_count = task.retry_count,
            max_retries = task.max_retries,
            delay_secs = delay_secs,
            "Task retry scheduled"
        );

        Ok(task)
    }

    /// Cancels queued tasks of a report. Running tasks are left to finish.
    #[tracing::instrument(skip(self), fields(db.table = "tasks", db.operation = "update"))]
    pub async fn cancel_pending_for_report(&self, report_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'cancelled',
                result = jsonb_build_object('error', 'Report was cancelled'),
                completed_at = NOW(),
                updated_at = NOW()
            WHERE report_id = $1
                AND status IN ('pending', 'scheduled')
            "#,
        )
        .bind(report_id)
        .execute(&self.pool)
        .await
        .context("Failed to cancel tasks for report")?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self), fields(db.table = "tasks", db.operation = "select"))]
    pub async fn get_stats(&self) -> Result<TaskStats> {
        use sqlx::Row;
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as total,
                COUNT(*) FILTER (WHERE status = 'pending') as pending,
                COUNT(*) FILTER (WHERE status = 'running') as running,
                COUNT(*) FILTER (WHERE status = 'completed') as completed,
                COUNT(*) FILTER (WHERE status = 'failed') as failed,
                COUNT(*) FILTER (WHERE status = 'scheduled') as scheduled,
                COUNT(*) FILTER (WHERE status = 'cancelled') as cancelled
            FROM tasks
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to fetch task stats")?;

        Ok(TaskStats {
            total: row.try_get::<Option<i64>, _>("total")?.unwrap_or(0),
            pending: row.try_get::<Option<i64>, _>("pending")?.unwrap_or(0),
            running: row.try_get::<Option<i64>, _>("running")?.unwrap_or(0),
            completed: row.try_get::<Option<i64>, _>("completed")?.unwrap_or(0),
            failed: row.try_get::<Option<i64>, _>("failed")?.unwrap_or(0),
            scheduled: row.try_get::<Option<i64>, _>("scheduled")?.unwrap_or(0),
            cancelled: row.try_get::<Option<i64>, _>("cancelled")?.unwrap_or(0),
        })
    }

    /// Requeues running tasks whose worker vanished (timeout plus `grace_secs` elapsed).
    /// Tasks without retries left are failed instead. Returns the number of rows touched.
    #[tracing::instrument(skip(self), fields(db.table = "tasks", db.operation = "update"))]
    pub async fn reap_stale_running_tasks(
        &self,
        default_timeout_secs: i32,
        grace_secs: i64,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = CASE
                    WHEN retry_count < max_retries THEN 'pending'::task_status
                    ELSE 'failed'::task_status
                END,
                retry_count = CASE
                    WHEN retry_count < max_retries THEN retry_count + 1
                    ELSE retry_count
                END,
                result = jsonb_build_object('error', 'Task exceeded its timeout and was reaped'),
                started_at = NULL,
                completed_at = CASE
                    WHEN retry_count < max_retries THEN NULL
                    ELSE NOW()
                END,
                updated_at = NOW()
            WHERE status = 'running'
                AND started_at IS NOT NULL
                AND started_at + ((COALESCE(timeout_seconds, $1) + $2) * interval '1 second') < NOW()
            "#,
        )
        .bind(default_timeout_secs)
        .bind(grace_secs as f64)
        .execute(&self.pool)
        .await
        .context("Failed to reap stale running tasks")?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::warn!(count = count, "Reaped stale running tasks");
        }
        Ok(count)
    }

    /// Deletes finished tasks older than `older_than_days`. Returns the number deleted.
    #[tracing::instrument(skip(self), fields(db.table = "tasks", db.operation = "delete"))]
    pub async fn delete_old_finished_tasks(&self, older_than_days: i32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM tasks
            WHERE status IN ('completed', 'failed', 'cancelled')
                AND COALESCE(completed_at, updated_at) < NOW() - ($1 * interval '1 day')
            "#,
        )
        .bind(older_than_days as f64)
        .execute(&self.pool)
        .await
        .context("Failed to delete old finished tasks")?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::info!(
                count = count,
                older_than_days = older_than_days,
                "Deleted old finished tasks"
            );
        }
        Ok(count)
    }
}
