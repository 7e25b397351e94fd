use advisor_core::{models::ReportShare, AppError};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

const SHARE_COLUMNS: &str = "id, report_id, token, created_by, expires_at, is_active, \
     access_count, last_accessed_at, created_at";

#[derive(Clone)]
pub struct ShareRepository {
    pool: PgPool,
}

impl ShareRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, token), fields(db.table = "report_shares", db.operation = "insert"))]
    pub async fn create(
        &self,
        report_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
        created_by: Option<Uuid>,
    ) -> Result<ReportShare, AppError> {
        let query = format!(
            r#"
            INSERT INTO report_shares (report_id, token, expires_at, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            SHARE_COLUMNS
        );
        let share = sqlx::query_as::<Postgres, ReportShare>(&query)
            .bind(report_id)
            .bind(token)
            .bind(expires_at)
            .bind(created_by)
            .fetch_one(&self.pool)
            .await?;

        tracing::info!(share_id = %share.id, report_id = %report_id, expires_at = %expires_at, "Share link created");
        Ok(share)
    }

    #[tracing::instrument(skip(self), fields(db.table = "report_shares", db.operation = "select"))]
    pub async fn list_for_report(&self, report_id: Uuid) -> Result<Vec<ReportShare>, AppError> {
        let query = format!(
            "SELECT {} FROM report_shares WHERE report_id = $1 ORDER BY created_at DESC",
            SHARE_COLUMNS
        );
        let shares = sqlx::query_as::<Postgres, ReportShare>(&query)
            .bind(report_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(shares)
    }

    /// Deactivates a share of the given report. Returns `false` if no such share exists.
    #[tracing::instrument(skip(self), fields(db.table = "report_shares", db.operation = "update", db.record_id = %share_id))]
    pub async fn revoke(&self, report_id: Uuid, share_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE report_shares SET is_active = FALSE WHERE id = $1 AND report_id = $2",
        )
        .bind(share_id)
        .bind(report_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Resolves a usable token and records the access in the same statement.
    /// Revoked, expired and unknown tokens all yield `None`.
    #[tracing::instrument(skip(self, token), fields(db.table = "report_shares", db.operation = "update"))]
    pub async fn access_by_token(&self, token: &str) -> Result<Option<ReportShare>, AppError> {
        let query = format!(
            r#"
            UPDATE report_shares
            SET access_count = access_count + 1,
                last_accessed_at = NOW()
            WHERE token = $1 AND is_active AND expires_at > NOW()
            RETURNING {}
            "#,
            SHARE_COLUMNS
        );
        let share = sqlx::query_as::<Postgres, ReportShare>(&query)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(share)
    }

    /// Returns the number of shares deactivated.
    #[tracing::instrument(skip(self), fields(db.table = "report_shares", db.operation = "update"))]
    pub async fn deactivate_expired(&self) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE report_shares SET is_active = FALSE WHERE is_active AND expires_at <= NOW()",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
