use advisor_core::{
    models::{
        Client, ClientListQuery, ClientStatistics, CreateClientRequest, PageParams, ReportStatus,
        SortOrder, StatusCount, UpdateClientRequest,
    },
    AppError,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

const CLIENT_COLUMNS: &str = "c.id, c.company_name, c.industry, c.contact_person, \
     c.contact_email, c.contact_phone, c.azure_subscription_ids, c.status, c.notes, \
     c.created_by, c.created_at, c.updated_at";

const CLIENT_ORDERING: &[(&str, &str)] = &[
    ("company_name", "c.company_name"),
    ("created_at", "c.created_at"),
    ("updated_at", "c.updated_at"),
];

#[derive(Clone)]
pub struct ClientRepository {
    pool: PgPool,
}

fn duplicate_name(err: sqlx::Error) -> AppError {
    match AppError::from(err) {
        AppError::Conflict(_) => AppError::Conflict(
            "A client with this company name already exists".to_string(),
        ),
        other => other,
    }
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, query: &'a ClientListQuery) {
    if let Some(status) = query.status {
        builder.push(" AND c.status = ").push_bind(status);
    }
    if let Some(industry) = query.industry.as_deref().filter(|s| !s.trim().is_empty()) {
        builder
            .push(" AND LOWER(c.industry) = LOWER(")
            .push_bind(industry.trim())
            .push(")");
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = format!("%{}%", search.trim());
        builder
            .push(" AND (c.company_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR c.industry ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR c.contact_email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

impl ClientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, request), fields(db.table = "clients", db.operation = "insert"))]
    pub async fn create(
        &self,
        request: CreateClientRequest,
        created_by: Option<Uuid>,
    ) -> Result<Client, AppError> {
        let query = format!(
            r#"
            INSERT INTO clients AS c (
                company_name, industry, contact_person, contact_email, contact_phone,
                azure_subscription_ids, status, notes, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            CLIENT_COLUMNS
        );
        let client = sqlx::query_as::<Postgres, Client>(&query)
            .bind(&request.company_name)
            .bind(&request.industry)
            .bind(&request.contact_person)
            .bind(&request.contact_email)
            .bind(&request.contact_phone)
            .bind(&request.azure_subscription_ids)
            .bind(request.status)
            .bind(&request.notes)
            .bind(created_by)
            .fetch_one(&self.pool)
            .await
            .map_err(duplicate_name)?;

        tracing::info!(client_id = %client.id, "Client created");
        Ok(client)
    }

    #[tracing::instrument(skip(self), fields(db.table = "clients", db.operation = "select", db.record_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<Option<Client>, AppError> {
        let query = format!("SELECT {} FROM clients c WHERE c.id = $1", CLIENT_COLUMNS);
        let client = sqlx::query_as::<Postgres, Client>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(client)
    }

    #[tracing::instrument(skip(self), fields(db.table = "clients", db.operation = "select", db.record_id = %id))]
    pub async fn exists(&self, id: Uuid) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<Postgres, bool>(
            "SELECT EXISTS(SELECT 1 FROM clients WHERE id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Filtered page of clients plus the total number of matches.
    #[tracing::instrument(skip(self), fields(db.table = "clients", db.operation = "select"))]
    pub async fn list(
        &self,
        query: &ClientListQuery,
        page: &PageParams,
    ) -> Result<(Vec<Client>, i64), AppError> {
        let order = SortOrder::parse(
            query.ordering.as_deref(),
            CLIENT_ORDERING,
            SortOrder {
                column: "c.created_at",
                descending: true,
            },
        )?;

        let mut count_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM clients c WHERE TRUE");
        push_filters(&mut count_builder, query);
        let total = count_builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM clients c WHERE TRUE", CLIENT_COLUMNS));
        push_filters(&mut builder, query);
        builder
            .push(" ORDER BY ")
            .push(order.to_sql())
            .push(", c.id ASC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let clients = builder
            .build_query_as::<Client>()
            .fetch_all(&self.pool)
            .await?;

        Ok((clients, total))
    }

    /// Applies the fields present in `request`; returns `None` when the client is missing.
    #[tracing::instrument(skip(self, request), fields(db.table = "clients", db.operation = "update", db.record_id = %id))]
    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateClientRequest,
    ) -> Result<Option<Client>, AppError> {
        let query = format!(
            r#"
            UPDATE clients AS c
            SET company_name = COALESCE($2, c.company_name),
                industry = COALESCE($3, c.industry),
                contact_person = COALESCE($4, c.contact_person),
                contact_email = COALESCE($5, c.contact_email),
                contact_phone = COALESCE($6, c.contact_phone),
                azure_subscription_ids = COALESCE($7, c.azure_subscription_ids),
                status = COALESCE($8, c.status),
                notes = COALESCE($9, c.notes),
                updated_at = NOW()
            WHERE c.id = $1
            RETURNING {}
            "#,
            CLIENT_COLUMNS
        );
        let client = sqlx::query_as::<Postgres, Client>(&query)
            .bind(id)
            .bind(&request.company_name)
            .bind(&request.industry)
            .bind(&request.contact_person)
            .bind(&request.contact_email)
            .bind(&request.contact_phone)
            .bind(&request.azure_subscription_ids)
            .bind(request.status)
            .bind(&request.notes)
            .fetch_optional(&self.pool)
            .await
            .map_err(duplicate_name)?;
        Ok(client)
    }

    /// Deletes the client and, by cascade, its reports. Returns the storage keys
    /// of the deleted reports' files, or `None` when the client did not exist.
    #[tracing::instrument(skip(self), fields(db.table = "clients", db.operation = "delete", db.record_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<Option<Vec<(Uuid, Vec<String>)>>, AppError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r#"
            SELECT id, csv_file, html_file, pdf_file
            FROM reports
            WHERE client_id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let mut files = Vec::with_capacity(rows.len());
        for row in rows {
            let report_id: Uuid = row.try_get("id")?;
            let keys: Vec<String> = ["csv_file", "html_file", "pdf_file"]
                .iter()
                .filter_map(|col| row.try_get::<Option<String>, _>(*col).ok().flatten())
                .collect();
            if !keys.is_empty() {
                files.push((report_id, keys));
            }
        }

        let deleted = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        tx.commit().await?;

        tracing::info!(client_id = %id, reports_with_files = files.len(), "Client deleted");
        Ok(Some(files))
    }

    #[tracing::instrument(skip(self), fields(db.table = "reports", db.operation = "select", db.record_id = %id))]
    pub async fn statistics(&self, id: Uuid) -> Result<ClientStatistics, AppError> {
        let status_rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count
            FROM reports
            WHERE client_id = $1
            GROUP BY status
            "#,
        )
        .bind(id)
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

        let totals = sqlx::query(
            r#"
            SELECT COUNT(rec.id) AS total, COALESCE(SUM(rec.potential_savings), 0) AS savings
            FROM recommendations rec
            JOIN reports r ON r.id = rec.report_id
            WHERE r.client_id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        let latest = sqlx::query(
            r#"
            SELECT id, processing_completed_at
            FROM reports
            WHERE client_id = $1 AND status = 'completed'
            ORDER BY processing_completed_at DESC NULLS LAST, created_at DESC
            LIMIT 1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let (latest_completed_report_id, latest_completed_at) = match latest {
            Some(row) => (
                Some(row.try_get("id")?),
                row.try_get("processing_completed_at")?,
            ),
            None => (None, None),
        };

        Ok(ClientStatistics {
            client_id: id,
            total_reports,
            reports_by_status,
            total_recommendations: totals.try_get("total")?,
            total_potential_savings: totals.try_get::<Decimal, _>("savings")?,
            latest_completed_report_id,
            latest_completed_at,
        })
    }
}
