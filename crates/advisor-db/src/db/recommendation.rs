use advisor_core::{
    models::{PageParams, Recommendation, RecommendationListQuery, SortOrder},
    AppError,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const RECOMMENDATION_COLUMNS: &str = "rec.id, rec.report_id, rec.category, \
     rec.business_impact, rec.recommendation, rec.subscription_id, rec.subscription_name, \
     rec.resource_group, rec.resource_name, rec.resource_type, rec.potential_benefits, \
     rec.potential_savings, rec.currency, rec.retirement_date, rec.retiring_feature, \
     rec.advisor_updated_at, rec.created_at";

const RECOMMENDATION_ORDERING: &[(&str, &str)] = &[
    ("potential_savings", "rec.potential_savings"),
    ("business_impact", "rec.business_impact"),
    ("category", "rec.category"),
    ("created_at", "rec.created_at"),
];

/// Read-only access; rows are written by report ingestion.
#[derive(Clone)]
pub struct RecommendationRepository {
    pool: PgPool,
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, query: &'a RecommendationListQuery) {
    if let Some(report_id) = query.report_id {
        builder.push(" AND rec.report_id = ").push_bind(report_id);
    }
    if let Some(client_id) = query.client_id {
        builder.push(" AND r.client_id = ").push_bind(client_id);
    }
    if let Some(category) = query.category {
        builder.push(" AND rec.category = ").push_bind(category);
    }
    if let Some(impact) = query.business_impact {
        builder.push(" AND rec.business_impact = ").push_bind(impact);
    }
    if let Some(min_savings) = query.min_savings {
        builder
            .push(" AND rec.potential_savings >= ")
            .push_bind(min_savings);
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = format!("%{}%", search.trim());
        builder
            .push(" AND (rec.recommendation ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR rec.resource_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR rec.resource_group ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

impl RecommendationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "recommendations", db.operation = "select"))]
    pub async fn list(
        &self,
        query: &RecommendationListQuery,
        page: &PageParams,
    ) -> Result<(Vec<Recommendation>, i64), AppError> {
        let order = SortOrder::parse(
            query.ordering.as_deref(),
            RECOMMENDATION_ORDERING,
            SortOrder {
                column: "rec.potential_savings",
                descending: true,
            },
        )?;

        let mut count_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) FROM recommendations rec \
             JOIN reports r ON r.id = rec.report_id WHERE TRUE",
        );
        push_filters(&mut count_builder, query);
        let total = count_builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM recommendations rec \
             JOIN reports r ON r.id = rec.report_id WHERE TRUE",
            RECOMMENDATION_COLUMNS
        ));
        push_filters(&mut builder, query);
        builder
            .push(" ORDER BY ")
            .push(order.to_sql())
            .push(", rec.id ASC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows = builder
            .build_query_as::<Recommendation>()
            .fetch_all(&self.pool)
            .await?;
        Ok((rows, total))
    }

    #[tracing::instrument(skip(self), fields(db.table = "recommendations", db.operation = "select", db.record_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<Option<Recommendation>, AppError> {
        let query = format!(
            "SELECT {} FROM recommendations rec WHERE rec.id = $1",
            RECOMMENDATION_COLUMNS
        );
        let row = sqlx::query_as::<Postgres, Recommendation>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Every recommendation of a report, largest savings first. Used by the renderers.
    #[tracing::instrument(skip(self), fields(db.table = "recommendations", db.operation = "select"))]
    pub async fn list_for_report(&self, report_id: Uuid) -> Result<Vec<Recommendation>, AppError> {
        let query = format!(
            "SELECT {} FROM recommendations rec WHERE rec.report_id = $1 \
             ORDER BY rec.potential_savings DESC, rec.business_impact DESC, rec.id ASC",
            RECOMMENDATION_COLUMNS
        );
        let rows = sqlx::query_as::<Postgres, Recommendation>(&query)
            .bind(report_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = "recommendations", db.operation = "select"))]
    pub async fn count_for_report(&self, report_id: Uuid) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<Postgres, i64>(
            "SELECT COUNT(*) FROM recommendations WHERE report_id = $1",
        )
        .bind(report_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
