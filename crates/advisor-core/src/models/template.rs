use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::report::ReportType;

/// Placeholders a custom template has to contain to produce a usable report.
pub const REQUIRED_TEMPLATE_PLACEHOLDERS: [&str; 2] = ["{{title}}", "{{recommendations}}"];

/// Custom HTML/CSS used instead of the built-in layout for a report type
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ReportTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub report_type: ReportType,
    pub html_template: String,
    pub css_styles: Option<String>,
    pub is_default: bool,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn validate_html_template(html: &str) -> Result<(), ValidationError> {
    let missing: Vec<&str> = REQUIRED_TEMPLATE_PLACEHOLDERS
        .iter()
        .copied()
        .filter(|placeholder| !html.contains(placeholder))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    let mut err = ValidationError::new("placeholders");
    err.message = Some(format!("Template is missing {}", missing.join(", ")).into());
    Err(err)
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct CreateTemplateRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub report_type: ReportType,
    #[validate(
        length(min = 1, message = "HTML template is required"),
        custom(function = "validate_html_template")
    )]
    pub html_template: String,
    pub css_styles: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema, Validate)]
pub struct UpdateTemplateRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(custom(function = "validate_html_template"))]
    pub html_template: Option<String>,
    pub css_styles: Option<String>,
    pub is_default: Option<bool>,
    pub is_active: Option<bool>,
}
