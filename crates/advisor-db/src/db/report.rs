use advisor_core::{
    constants::MAX_REPORT_RETRIES,
    models::{
        NewRecommendation, PageParams, Report, ReportListQuery, ReportStatus, ReportType,
        SortOrder,
    },
    AppError,
};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

const REPORT_COLUMNS: &str = "r.id, r.client_id, r.created_by, r.title, r.report_type, \
     r.status, r.template_id, r.csv_file, r.html_file, r.pdf_file, r.analysis_data, \
     r.error_message, r.retry_count, r.processing_started_at, r.processing_completed_at, \
     r.created_at, r.updated_at";

const REPORT_ORDERING: &[(&str, &str)] = &[
    ("created_at", "r.created_at"),
    ("updated_at", "r.updated_at"),
    ("title", "r.title"),
    ("status", "r.status"),
];

/// Rows per INSERT during ingestion.
const INSERT_CHUNK_SIZE: usize = 5_000;

#[derive(Debug, Clone)]
pub struct NewReport {
    pub client_id: Uuid,
    pub created_by: Option<Uuid>,
    pub title: String,
    pub report_type: ReportType,
    pub template_id: Option<Uuid>,
}

/// Outcome of [`ReportRepository::attach_csv`].
#[derive(Debug, Clone)]
pub struct AttachedCsv {
    pub report: Report,
    /// Storage keys the new upload superseded (previous CSV and rendered files).
    pub replaced_files: Vec<String>,
}

#[derive(sqlx::FromRow)]
struct ReportWithClient {
    #[sqlx(flatten)]
    report: Report,
    client_name: String,
}

#[derive(Clone)]
pub struct ReportRepository {
    pool: PgPool,
}

fn status_strings(statuses: &[ReportStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, query: &'a ReportListQuery) {
    if let Some(client_id) = query.client_id {
        builder.push(" AND r.client_id = ").push_bind(client_id);
    }
    if let Some(status) = query.status {
        builder.push(" AND r.status = ").push_bind(status);
    }
    if let Some(report_type) = query.report_type {
        builder.push(" AND r.report_type = ").push_bind(report_type);
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = format!("%{}%", search.trim());
        builder
            .push(" AND (r.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR cl.company_name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

impl ReportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, report), fields(db.table = "reports", db.operation = "insert"))]
    pub async fn create(&self, report: NewReport) -> Result<Report, AppError> {
        let query = format!(
            r#"
            INSERT INTO reports AS r (client_id, created_by, title, report_type, template_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            REPORT_COLUMNS
        );
        let created = sqlx::query_as::<Postgres, Report>(&query)
            .bind(report.client_id)
            .bind(report.created_by)
            .bind(&report.title)
            .bind(report.report_type)
            .bind(report.template_id)
            .fetch_one(&self.pool)
            .await?;

        tracing::info!(
            report_id = %created.id,
            client_id = %created.client_id,
            report_type = %created.report_type,
            "Report created"
        );
        Ok(created)
    }

    #[tracing::instrument(skip(self), fields(db.table = "reports", db.operation = "select", db.record_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<Option<Report>, AppError> {
        let query = format!("SELECT {} FROM reports r WHERE r.id = $1", REPORT_COLUMNS);
        let report = sqlx::query_as::<Postgres, Report>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(report)
    }

    /// Report plus its client's company name.
    #[tracing::instrument(skip(self), fields(db.table = "reports", db.operation = "select", db.record_id = %id))]
    pub async fn get_with_client_name(
        &self,
        id: Uuid,
    ) -> Result<Option<(Report, String)>, AppError> {
        let query = format!(
            "SELECT {}, cl.company_name AS client_name \
             FROM reports r JOIN clients cl ON cl.id = r.client_id WHERE r.id = $1",
            REPORT_COLUMNS
        );
        let row = sqlx::query_as::<Postgres, ReportWithClient>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| (r.report, r.client_name)))
    }

    #[tracing::instrument(skip(self), fields(db.table = "reports", db.operation = "select"))]
    pub async fn list(
        &self,
        query: &ReportListQuery,
        page: &PageParams,
    ) -> Result<(Vec<(Report, String)>, i64), AppError> {
        let order = SortOrder::parse(
            query.ordering.as_deref(),
            REPORT_ORDERING,
            SortOrder {
                column: "r.created_at",
                descending: true,
            },
        )?;

        let mut count_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) FROM reports r JOIN clients cl ON cl.id = r.client_id WHERE TRUE",
        );
        push_filters(&mut count_builder, query);
        let total = count_builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {}, cl.company_name AS client_name \
             FROM reports r JOIN clients cl ON cl.id = r.client_id WHERE TRUE",
            REPORT_COLUMNS
        ));
        push_filters(&mut builder, query);
        builder
            .push(" ORDER BY ")
            .push(order.to_sql())
            .push(", r.id ASC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows = builder
            .build_query_as::<ReportWithClient>()
            .fetch_all(&self.pool)
            .await?;

        Ok((
            rows.into_iter()
                .map(|r| (r.report, r.client_name))
                .collect(),
            total,
        ))
    }

    /// Deletes a report that is not being processed. Returns the deleted row.
    #[tracing::instrument(skip(self), fields(db.table = "reports", db.operation = "delete", db.record_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<Report, AppError> {
        let query = format!(
            "DELETE FROM reports r WHERE r.id = $1 \
             AND r.status NOT IN ('processing', 'generating') RETURNING {}",
            REPORT_COLUMNS
        );
        let deleted = sqlx::query_as::<Postgres, Report>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match deleted {
            Some(report) => {
                tracing::info!(report_id = %id, "Report deleted");
                Ok(report)
            }
            None => match self.get(id).await? {
                None => Err(AppError::NotFound("Report not found".to_string())),
                Some(report) => Err(AppError::Conflict(format!(
                    "Report is {} and cannot be deleted until processing finishes",
                    report.status
                ))),
            },
        }
    }

    /// Builds the error for a compare-and-set that matched no row.
    async fn transition_error(&self, id: Uuid, to: ReportStatus) -> AppError {
        match self.get(id).await {
            Ok(None) => AppError::NotFound("Report not found".to_string()),
            Ok(Some(report)) if report.status == ReportStatus::Failed
                && to.is_in_progress()
                && report.retry_count >= MAX_REPORT_RETRIES =>
            {
                AppError::Conflict(format!(
                    "Report has failed {} times; upload a new CSV file to try again",
                    report.retry_count
                ))
            }
            Ok(Some(report)) => AppError::Conflict(format!(
                "Report status is {}, cannot change to {}",
                report.status, to
            )),
            Err(e) => e,
        }
    }

    /// Attaches a freshly uploaded CSV: status becomes `uploaded`, the retry budget
    /// resets and every derived artefact (recommendations, analysis, rendered files)
    /// is cleared in one transaction. The row is locked first so the superseded
    /// file keys returned belong to exactly this transition.
    #[tracing::instrument(skip(self, csv_key), fields(db.table = "reports", db.operation = "update", db.record_id = %id))]
    pub async fn attach_csv(&self, id: Uuid, csv_key: &str) -> Result<AttachedCsv, AppError> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<(Option<String>, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT csv_file, html_file, pdf_file FROM reports WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let query = format!(
            r#"
            UPDATE reports AS r
            SET status = 'uploaded',
                csv_file = $2,
                html_file = NULL,
                pdf_file = NULL,
                analysis_data = NULL,
                error_message = NULL,
                retry_count = 0,
                processing_started_at = NULL,
                processing_completed_at = NULL,
                updated_at = NOW()
            WHERE r.id = $1 AND r.status::text = ANY($3)
            RETURNING {}
            "#,
            REPORT_COLUMNS
        );
        let updated = sqlx::query_as::<Postgres, Report>(&query)
            .bind(id)
            .bind(csv_key)
            .bind(status_strings(ReportStatus::allowed_sources(
                ReportStatus::Uploaded,
            )))
            .fetch_optional(&mut *tx)
            .await?;

        let Some(report) = updated else {
            tx.rollback().await?;
            return Err(self.transition_error(id, ReportStatus::Uploaded).await);
        };

        let cleared = sqlx::query("DELETE FROM recommendations WHERE report_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        let replaced_files = previous
            .map(|(csv, html, pdf)| {
                [csv, html, pdf]
                    .into_iter()
                    .flatten()
                    .filter(|key| key != csv_key)
                    .collect()
            })
            .unwrap_or_default();

        tracing::info!(
            report_id = %id,
            cleared_recommendations = cleared,
            "CSV attached to report"
        );
        Ok(AttachedCsv {
            report,
            replaced_files,
        })
    }

    /// Claims the report for a pipeline run by moving it into `processing` or
    /// `generating`. Only one run can hold a report at a time.
    #[tracing::instrument(skip(self), fields(db.table = "reports", db.operation = "update", db.record_id = %id))]
    pub async fn begin_run(&self, id: Uuid, to: ReportStatus) -> Result<Report, AppError> {
        if !to.is_in_progress() {
            return Err(AppError::Internal(format!(
                "{} is not a pipeline status",
                to
            )));
        }

        let query = format!(
            r#"
            UPDATE reports AS r
            SET status = $2,
                error_message = NULL,
                processing_started_at = NOW(),
                processing_completed_at = NULL,
                updated_at = NOW()
            WHERE r.id = $1
                AND r.status::text = ANY($3)
                AND (r.status <> 'failed' OR r.retry_count < $4)
            RETURNING {}
            "#,
            REPORT_COLUMNS
        );
        let updated = sqlx::query_as::<Postgres, Report>(&query)
            .bind(id)
            .bind(to)
            .bind(status_strings(ReportStatus::allowed_sources(to)))
            .bind(MAX_REPORT_RETRIES)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(report) => {
                tracing::info!(report_id = %id, status = %to, "Report run started");
                Ok(report)
            }
            None => Err(self.transition_error(id, to).await),
        }
    }

    /// Replaces the report's recommendations, stores the analysis and moves
    /// `processing -> generating`, all or nothing.
    #[tracing::instrument(skip(self, recommendations, analysis), fields(db.table = "recommendations", db.operation = "insert", db.record_id = %id, rows = recommendations.len()))]
    pub async fn complete_ingestion(
        &self,
        id: Uuid,
        recommendations: &[NewRecommendation],
        analysis: serde_json::Value,
    ) -> Result<Report, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM recommendations WHERE report_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for chunk in recommendations.chunks(INSERT_CHUNK_SIZE) {
            insert_recommendations(&mut tx, id, chunk).await?;
        }

        let query = format!(
            r#"
            UPDATE reports AS r
            SET status = 'generating',
                analysis_data = $2,
                updated_at = NOW()
            WHERE r.id = $1 AND r.status = 'processing'
            RETURNING {}
            "#,
            REPORT_COLUMNS
        );
        let updated = sqlx::query_as::<Postgres, Report>(&query)
            .bind(id)
            .bind(analysis)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(report) = updated else {
            tx.rollback().await?;
            return Err(self.transition_error(id, ReportStatus::Generating).await);
        };

        tx.commit().await?;

        tracing::info!(
            report_id = %id,
            recommendations = recommendations.len(),
            "Recommendations ingested"
        );
        Ok(report)
    }

    /// Stores a recomputed analysis without touching status.
    #[tracing::instrument(skip(self, analysis), fields(db.table = "reports", db.operation = "update", db.record_id = %id))]
    pub async fn set_analysis(&self, id: Uuid, analysis: serde_json::Value) -> Result<(), AppError> {
        sqlx::query("UPDATE reports SET analysis_data = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(analysis)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// `generating -> completed` with the rendered file keys.
    #[tracing::instrument(skip(self), fields(db.table = "reports", db.operation = "update", db.record_id = %id))]
    pub async fn mark_completed(
        &self,
        id: Uuid,
        html_key: Option<&str>,
        pdf_key: Option<&str>,
    ) -> Result<Report, AppError> {
        let query = format!(
            r#"
            UPDATE reports AS r
            SET status = 'completed',
                html_file = $2,
                pdf_file = $3,
                error_message = NULL,
                processing_completed_at = NOW(),
                updated_at = NOW()
            WHERE r.id = $1 AND r.status = 'generating'
            RETURNING {}
            "#,
            REPORT_COLUMNS
        );
        let updated = sqlx::query_as::<Postgres, Report>(&query)
            .bind(id)
            .bind(html_key)
            .bind(pdf_key)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(report) => {
                tracing::info!(report_id = %id, "Report completed");
                Ok(report)
            }
            None => Err(self.transition_error(id, ReportStatus::Completed).await),
        }
    }

    /// Records a failed run. `retry_count` grows by one and never exceeds the cap.
    /// Returns `None` if the report was not in a pipeline status.
    #[tracing::instrument(skip(self, message), fields(db.table = "reports", db.operation = "update", db.record_id = %id))]
    pub async fn mark_failed(&self, id: Uuid, message: &str) -> Result<Option<Report>, AppError> {
        let query = format!(
            r#"
            UPDATE reports AS r
            SET status = 'failed',
                error_message = $2,
                retry_count = LEAST(r.retry_count + 1, $3),
                processing_completed_at = NOW(),
                updated_at = NOW()
            WHERE r.id = $1 AND r.status IN ('processing', 'generating')
            RETURNING {}
            "#,
            REPORT_COLUMNS
        );
        let updated = sqlx::query_as::<Postgres, Report>(&query)
            .bind(id)
            .bind(message)
            .bind(MAX_REPORT_RETRIES)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(report) = &updated {
            tracing::warn!(
                report_id = %id,
                retry_count = report.retry_count,
                error = %message,
                "Report generation failed"
            );
        }
        Ok(updated)
    }

    /// Fails every run that has held `processing`/`generating` for longer than
    /// `stalled_after_secs`. A run whose process died or whose task was abandoned
    /// would otherwise keep the report locked forever. Consumes one retry, like
    /// any other failed run.
    #[tracing::instrument(skip(self), fields(db.table = "reports", db.operation = "update"))]
    pub async fn fail_stalled_runs(&self, stalled_after_secs: i64) -> Result<Vec<Uuid>, AppError> {
        let message = format!(
            "Processing did not finish within {} seconds",
            stalled_after_secs
        );
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE reports
            SET status = 'failed',
                error_message = $2,
                retry_count = LEAST(retry_count + 1, $3),
                processing_completed_at = NOW(),
                updated_at = NOW()
            WHERE status IN ('processing', 'generating')
                AND COALESCE(processing_started_at, updated_at)
                    < NOW() - make_interval(secs => $1)
            RETURNING id
            "#,
        )
        .bind(stalled_after_secs as f64)
        .bind(message)
        .bind(MAX_REPORT_RETRIES)
        .fetch_all(&self.pool)
        .await?;

        if !ids.is_empty() {
            tracing::warn!(count = ids.len(), "Stalled report runs marked failed");
        }
        Ok(ids)
    }

    #[tracing::instrument(skip(self), fields(db.table = "reports", db.operation = "update", db.record_id = %id))]
    pub async fn cancel(&self, id: Uuid) -> Result<Report, AppError> {
        let query = format!(
            r#"
            UPDATE reports AS r
            SET status = 'cancelled',
                updated_at = NOW()
            WHERE r.id = $1 AND r.status::text = ANY($2)
            RETURNING {}
            "#,
            REPORT_COLUMNS
        );
        let updated = sqlx::query_as::<Postgres, Report>(&query)
            .bind(id)
            .bind(status_strings(ReportStatus::allowed_sources(
                ReportStatus::Cancelled,
            )))
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(report) => {
                tracing::info!(report_id = %id, "Report cancelled");
                Ok(report)
            }
            None => Err(self.transition_error(id, ReportStatus::Cancelled).await),
        }
    }
}

async fn insert_recommendations(
    tx: &mut Transaction<'_, Postgres>,
    report_id: Uuid,
    rows: &[NewRecommendation],
) -> Result<(), AppError> {
    let mut categories = Vec::with_capacity(rows.len());
    let mut impacts = Vec::with_capacity(rows.len());
    let mut texts = Vec::with_capacity(rows.len());
    let mut subscription_ids = Vec::with_capacity(rows.len());
    let mut subscription_names = Vec::with_capacity(rows.len());
    let mut resource_groups = Vec::with_capacity(rows.len());
    let mut resource_names = Vec::with_capacity(rows.len());
    let mut resource_types = Vec::with_capacity(rows.len());
    let mut benefits = Vec::with_capacity(rows.len());
    let mut savings = Vec::with_capacity(rows.len());
    let mut currencies = Vec::with_capacity(rows.len());
    let mut retirement_dates = Vec::with_capacity(rows.len());
    let mut retiring_features = Vec::with_capacity(rows.len());
    let mut updated_dates = Vec::with_capacity(rows.len());

    for row in rows {
        categories.push(row.category.as_str().to_string());
        impacts.push(row.business_impact.as_str().to_string());
        texts.push(row.recommendation.clone());
        subscription_ids.push(row.subscription_id.clone());
        subscription_names.push(row.subscription_name.clone());
        resource_groups.push(row.resource_group.clone());
        resource_names.push(row.resource_name.clone());
        resource_types.push(row.resource_type.clone());
        benefits.push(row.potential_benefits.clone());
        savings.push(row.potential_savings);
        currencies.push(row.currency.clone());
        retirement_dates.push(row.retirement_date);
        retiring_features.push(row.retiring_feature.clone());
        updated_dates.push(row.advisor_updated_at);
    }

    sqlx::query(
        r#"
        INSERT INTO recommendations (
            report_id, category, business_impact, recommendation, subscription_id,
            subscription_name, resource_group, resource_name, resource_type,
            potential_benefits, potential_savings, currency, retirement_date,
            retiring_feature, advisor_updated_at
        )
        SELECT $1, u.category::recommendation_category, u.impact::business_impact,
               u.recommendation, u.subscription_id, u.subscription_name, u.resource_group,
               u.resource_name, u.resource_type, u.potential_benefits, u.potential_savings,
               u.currency, u.retirement_date, u.retiring_feature, u.advisor_updated_at
        FROM UNNEST(
            $2::text[], $3::text[], $4::text[], $5::text[], $6::text[], $7::text[],
            $8::text[], $9::text[], $10::text[], $11::numeric[], $12::text[],
            $13::date[], $14::text[], $15::date[]
        ) AS u(
            category, impact, recommendation, subscription_id, subscription_name,
            resource_group, resource_name, resource_type, potential_benefits,
            potential_savings, currency, retirement_date, retiring_feature,
            advisor_updated_at
        )
        "#,
    )
    .bind(report_id)
    .bind(categories)
    .bind(impacts)
    .bind(texts)
    .bind(subscription_ids)
    .bind(subscription_names)
    .bind(resource_groups)
    .bind(resource_names)
    .bind(resource_types)
    .bind(benefits)
    .bind(savings)
    .bind(currencies)
    .bind(retirement_dates)
    .bind(retiring_features)
    .bind(updated_dates)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
