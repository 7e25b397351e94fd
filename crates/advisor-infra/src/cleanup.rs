use std::sync::Arc;
use std::time::Duration;

use advisor_db::{ReportRepository, ShareRepository, TaskRepository};
use tokio::time::{interval, MissedTickBehavior};

/// Rows touched by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub shares_deactivated: u64,
    pub tasks_deleted: u64,
    pub stalled_reports_failed: u64,
}

/// Periodic housekeeping: deactivates expired share links, prunes finished
/// tasks past their retention and fails report runs that stopped making
/// progress.
#[derive(Clone)]
pub struct CleanupService {
    share_repository: ShareRepository,
    task_repository: TaskRepository,
    report_repository: ReportRepository,
    /// A run holding a report longer than this is considered dead.
    stalled_run_after: Duration,
    /// 0 keeps finished tasks forever.
    task_retention_days: i32,
    interval: Duration,
}

impl CleanupService {
    pub fn new(
        share_repository: ShareRepository,
        task_repository: TaskRepository,
        report_repository: ReportRepository,
        stalled_run_after: Duration,
        task_retention_days: i32,
        interval: Duration,
    ) -> Self {
        Self {
            share_repository,
            task_repository,
            report_repository,
            stalled_run_after,
            task_retention_days,
            interval,
        }
    }

    /// Runs [`CleanupService::run_once`] on every tick until the task is aborted.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                tracing::info!("Starting scheduled cleanup");
                let report = self.run_once().await;
                tracing::info!(
                    shares_deactivated = report.shares_deactivated,
                    tasks_deleted = report.tasks_deleted,
                    stalled_reports_failed = report.stalled_reports_failed,
                    "Cleanup completed"
                );
            }
        })
    }

    /// One pass. Failures are logged and the remaining steps still run.
    #[tracing::instrument(skip(self), fields(cleanup.operation = "all"))]
    pub async fn run_once(&self) -> CleanupReport {
        let shares_deactivated = match self.share_repository.deactivate_expired().await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(error = %e, "Failed to deactivate expired shares");
                0
            }
        };

        let tasks_deleted = if self.task_retention_days > 0 {
            match self
                .task_repository
                .delete_old_finished_tasks(self.task_retention_days)
                .await
            {
                Ok(count) => count,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to delete old finished tasks");
                    0
                }
            }
        } else {
            0
        };

        let stalled_reports_failed = match self
            .report_repository
            .fail_stalled_runs(self.stalled_run_after.as_secs() as i64)
            .await
        {
            Ok(ids) => ids.len() as u64,
            Err(e) => {
                tracing::error!(error = %e, "Failed to release stalled report runs");
                0
            }
        };

        CleanupReport {
            shares_deactivated,
            tasks_deleted,
            stalled_reports_failed,
        }
    }
}
