use advisor_core::{
    models::{CategoryBreakdown, DashboardStats, ReportStatus, StatusCount, TopSaving, TrendPoint},
    AppError,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

/// Cross-client aggregates for the dashboard endpoints.
#[derive(Clone)]
pub struct AnalyticsRepository {
    pool: PgPool,
}

impl AnalyticsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "reports", db.operation = "select"))]
    pub async fn dashboard(&self) -> Result<DashboardStats, AppError> {
        let clients = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'active') AS active
            FROM clients
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let status_rows = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM reports GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut reports_by_status = Vec::with_capacity(status_rows.len());
        let mut total_reports = 0;
        for row in status_rows {
            let status: ReportStatus = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            total_reports += count;
            reports_by_status.push(StatusCount { status, count });
        }
        reports_by_status.sort_by_key(|sc| ReportStatus::ALL.iter().position(|s| *s == sc.status));

        let recent = sqlx::query_scalar::<Postgres, i64>(
            "SELECT COUNT(*) FROM reports WHERE created_at >= NOW() - interval '30 days'",
        )
        .fetch_one(&self.pool)
        .await?;

        let recommendations = sqlx::query(
            r#"
            SELECT COUNT(*) AS total, COALESCE(SUM(potential_savings), 0) AS savings
            FROM recommendations
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DashboardStats {
            total_clients: clients.try_get("total")?,
            active_clients: clients.try_get("active")?,
            total_reports,
            reports_by_status,
            reports_last_30_days: recent,
            total_recommendations: recommendations.try_get("total")?,
            total_potential_savings: recommendations.try_get::<Decimal, _>("savings")?,
        })
    }

    #[tracing::instrument(skip(self), fields(db.table = "recommendations", db.operation = "select"))]
    pub async fn categories(&self, client_id: Option<Uuid>) -> Result<Vec<CategoryBreakdown>, AppError> {
        let rows = sqlx::query_as::<Postgres, CategoryBreakdown>(
            r#"
            SELECT rec.category,
                   COUNT(*) AS count,
                   COALESCE(SUM(rec.potential_savings), 0) AS potential_savings
            FROM recommendations rec
            JOIN reports r ON r.id = rec.report_id
            WHERE $1::uuid IS NULL OR r.client_id = $1
            GROUP BY rec.category
            ORDER BY potential_savings DESC, rec.category
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// One point per day in the window, including days without activity.
    #[tracing::instrument(skip(self), fields(db.table = "reports", db.operation = "select"))]
    pub async fn trends(&self, days: i64) -> Result<Vec<TrendPoint>, AppError> {
        let rows = sqlx::query_as::<Postgres, TrendPoint>(
            r#"
            WITH days AS (
                SELECT generate_series(
                    (CURRENT_DATE - ($1::int - 1)),
                    CURRENT_DATE,
                    interval '1 day'
                )::date AS day
            )
            SELECT d.day,
                   (SELECT COUNT(*) FROM reports r
                    WHERE r.created_at::date = d.day) AS reports_created,
                   (SELECT COUNT(*) FROM reports r
                    WHERE r.status = 'completed'
                      AND r.processing_completed_at::date = d.day) AS reports_completed
            FROM days d
            ORDER BY d.day
            "#,
        )
        .bind(days as i32)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = "recommendations", db.operation = "select"))]
    pub async fn top_savings(
        &self,
        limit: i64,
        client_id: Option<Uuid>,
    ) -> Result<Vec<TopSaving>, AppError> {
        let rows = sqlx::query_as::<Postgres, TopSaving>(
            r#"
            SELECT rec.id AS recommendation_id,
                   rec.report_id,
                   r.client_id,
                   cl.company_name AS client_name,
                   rec.category,
                   rec.business_impact,
                   rec.recommendation,
                   rec.resource_name,
                   rec.potential_savings,
                   rec.currency
            FROM recommendations rec
            JOIN reports r ON r.id = rec.report_id
            JOIN clients cl ON cl.id = r.client_id
            WHERE r.status = 'completed'
                AND rec.potential_savings > 0
                AND ($2::uuid IS NULL OR r.client_id = $2)
            ORDER BY rec.potential_savings DESC, rec.id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
