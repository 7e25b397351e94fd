use advisor_core::{
    models::{CreateTemplateRequest, ReportTemplate, ReportType, UpdateTemplateRequest},
    AppError,
};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

const TEMPLATE_COLUMNS: &str = "id, name, description, report_type, html_template, \
     css_styles, is_default, is_active, created_by, created_at, updated_at";

#[derive(Clone)]
pub struct TemplateRepository {
    pool: PgPool,
}

fn duplicate_name(err: sqlx::Error) -> AppError {
    match AppError::from(err) {
        AppError::Conflict(_) => AppError::Conflict(
            "A template with this name already exists".to_string(),
        ),
        other => other,
    }
}

async fn clear_default(
    tx: &mut Transaction<'_, Postgres>,
    report_type: ReportType,
    keep: Option<Uuid>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE report_templates
        SET is_default = FALSE, updated_at = NOW()
        WHERE report_type = $1 AND is_default AND id IS DISTINCT FROM $2
        "#,
    )
    .bind(report_type)
    .bind(keep)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

impl TemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, request), fields(db.table = "report_templates", db.operation = "insert"))]
    pub async fn create(
        &self,
        request: CreateTemplateRequest,
        created_by: Option<Uuid>,
    ) -> Result<ReportTemplate, AppError> {
        let mut tx = self.pool.begin().await?;

        if request.is_default {
            clear_default(&mut tx, request.report_type, None).await?;
        }

        let query = format!(
            r#"
            INSERT INTO report_templates (
                name, description, report_type, html_template, css_styles,
                is_default, is_active, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            TEMPLATE_COLUMNS
        );
        let template = sqlx::query_as::<Postgres, ReportTemplate>(&query)
            .bind(request.name.trim())
            .bind(&request.description)
            .bind(request.report_type)
            .bind(&request.html_template)
            .bind(&request.css_styles)
            .bind(request.is_default)
            .bind(request.is_active)
            .bind(created_by)
            .fetch_one(&mut *tx)
            .await
            .map_err(duplicate_name)?;

        tx.commit().await?;

        tracing::info!(template_id = %template.id, report_type = %template.report_type, "Template created");
        Ok(template)
    }

    #[tracing::instrument(skip(self), fields(db.table = "report_templates", db.operation = "select", db.record_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<Option<ReportTemplate>, AppError> {
        let query = format!(
            "SELECT {} FROM report_templates WHERE id = $1",
            TEMPLATE_COLUMNS
        );
        let template = sqlx::query_as::<Postgres, ReportTemplate>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(template)
    }

    #[tracing::instrument(skip(self), fields(db.table = "report_templates", db.operation = "select"))]
    pub async fn list(
        &self,
        report_type: Option<ReportType>,
        active_only: bool,
    ) -> Result<Vec<ReportTemplate>, AppError> {
        let query = format!(
            r#"
            SELECT {}
            FROM report_templates
            WHERE ($1::report_type IS NULL OR report_type = $1)
                AND (NOT $2 OR is_active)
            ORDER BY report_type, is_default DESC, name
            "#,
            TEMPLATE_COLUMNS
        );
        let templates = sqlx::query_as::<Postgres, ReportTemplate>(&query)
            .bind(report_type)
            .bind(active_only)
            .fetch_all(&self.pool)
            .await?;
        Ok(templates)
    }

    #[tracing::instrument(skip(self, request), fields(db.table = "report_templates", db.operation = "update", db.record_id = %id))]
    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateTemplateRequest,
    ) -> Result<Option<ReportTemplate>, AppError> {
        let mut tx = self.pool.begin().await?;

        let report_type = sqlx::query_scalar::<Postgres, ReportType>(
            "SELECT report_type FROM report_templates WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(report_type) = report_type else {
            tx.rollback().await?;
            return Ok(None);
        };

        if request.is_default == Some(true) {
            clear_default(&mut tx, report_type, Some(id)).await?;
        }

        let query = format!(
            r#"
            UPDATE report_templates
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                html_template = COALESCE($4, html_template),
                css_styles = COALESCE($5, css_styles),
                is_default = COALESCE($6, is_default),
                is_active = COALESCE($7, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TEMPLATE_COLUMNS
        );
        let template = sqlx::query_as::<Postgres, ReportTemplate>(&query)
            .bind(id)
            .bind(request.name.as_deref().map(str::trim))
            .bind(&request.description)
            .bind(&request.html_template)
            .bind(&request.css_styles)
            .bind(request.is_default)
            .bind(request.is_active)
            .fetch_one(&mut *tx)
            .await
            .map_err(duplicate_name)?;

        tx.commit().await?;
        Ok(Some(template))
    }

    /// Deletes an unused template. Templates still referenced by reports are a conflict.
    #[tracing::instrument(skip(self), fields(db.table = "report_templates", db.operation = "delete", db.record_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let in_use = sqlx::query_scalar::<Postgres, i64>(
            "SELECT COUNT(*) FROM reports WHERE template_id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        if in_use > 0 {
            return Err(AppError::Conflict(format!(
                "Template is used by {} report(s) and cannot be deleted",
                in_use
            )));
        }

        let result = sqlx::query("DELETE FROM report_templates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| match AppError::from(e) {
                // a report picked the template up between the check and the delete
                AppError::BadRequest(_) => AppError::Conflict(
                    "Template is used by reports and cannot be deleted".to_string(),
                ),
                other => other,
            })?;
        Ok(result.rows_affected() > 0)
    }

    /// Template used to render a report: the explicit one if active, otherwise the
    /// active default for the report type.
    #[tracing::instrument(skip(self), fields(db.table = "report_templates", db.operation = "select"))]
    pub async fn find_for_report(
        &self,
        template_id: Option<Uuid>,
        report_type: ReportType,
    ) -> Result<Option<ReportTemplate>, AppError> {
        let query = format!(
            r#"
            SELECT {}
            FROM report_templates
            WHERE is_active
                AND (id = $1 OR (report_type = $2 AND is_default))
            ORDER BY (id IS NOT DISTINCT FROM $1) DESC
            LIMIT 1
            "#,
            TEMPLATE_COLUMNS
        );
        let template = sqlx::query_as::<Postgres, ReportTemplate>(&query)
            .bind(template_id)
            .bind(report_type)
            .fetch_optional(&self.pool)
            .await?;

        Ok(template)
    }
}
