use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::report::ReportStatus;

static SUBSCRIPTION_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("static regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "client_status", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    #[default]
    Active,
    Inactive,
}

/// Customer whose Azure subscriptions are reported on
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Client {
    pub id: Uuid,
    pub company_name: String,
    pub industry: Option<String>,
    pub contact_person: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub azure_subscription_ids: Vec<String>,
    pub status: ClientStatus,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn validate_subscription_ids(ids: &[String]) -> Result<(), ValidationError> {
    if let Some(bad) = ids.iter().find(|id| !SUBSCRIPTION_ID_RE.is_match(id.trim())) {
        let mut err = ValidationError::new("subscription_id");
        err.message = Some(format!("'{}' is not a valid Azure subscription ID", bad).into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct CreateClientRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Company name must be between 1 and 255 characters"
    ))]
    pub company_name: String,
    #[validate(length(max = 100))]
    pub industry: Option<String>,
    #[validate(length(max = 255))]
    pub contact_person: Option<String>,
    #[validate(email(message = "Enter a valid email address"))]
    pub contact_email: Option<String>,
    #[validate(length(max = 50))]
    pub contact_phone: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_subscription_ids"))]
    pub azure_subscription_ids: Vec<String>,
    #[serde(default)]
    pub status: ClientStatus,
    pub notes: Option<String>,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, ToSchema, Validate)]
pub struct UpdateClientRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Company name must be between 1 and 255 characters"
    ))]
    pub company_name: Option<String>,
    #[validate(length(max = 100))]
    pub industry: Option<String>,
    #[validate(length(max = 255))]
    pub contact_person: Option<String>,
    #[validate(email(message = "Enter a valid email address"))]
    pub contact_email: Option<String>,
    #[validate(length(max = 50))]
    pub contact_phone: Option<String>,
    #[validate(custom(function = "validate_subscription_ids"))]
    pub azure_subscription_ids: Option<Vec<String>>,
    pub status: Option<ClientStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ClientListQuery {
    pub status: Option<ClientStatus>,
    pub industry: Option<String>,
    /// Matches company name, industry or contact email
    pub search: Option<String>,
    /// `company_name`, `created_at`, `updated_at`; prefix with `-` for descending
    pub ordering: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusCount {
    pub status: ReportStatus,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClientStatistics {
    pub client_id: Uuid,
    pub total_reports: i64,
    pub reports_by_status: Vec<StatusCount>,
    pub total_recommendations: i64,
    #[schema(value_type = f64)]
    pub total_potential_savings: Decimal,
    pub latest_completed_report_id: Option<Uuid>,
    pub latest_completed_at: Option<DateTime<Utc>>,
}

impl CreateClientRequest {
    /// Trims the free-text fields and drops empty optional values.
    pub fn normalized(mut self) -> Self {
        self.company_name = self.company_name.trim().to_string();
        self.industry = trimmed(self.industry);
        self.contact_person = trimmed(self.contact_person);
        self.contact_email = trimmed(self.contact_email);
        self.contact_phone = trimmed(self.contact_phone);
        self.azure_subscription_ids = self
            .azure_subscription_ids
            .into_iter()
            .map(|id| id.trim().to_lowercase())
            .collect();
        self
    }
}

impl UpdateClientRequest {
    pub fn normalized(mut self) -> Self {
        self.company_name = self.company_name.map(|name| name.trim().to_string());
        self.azure_subscription_ids = self
            .azure_subscription_ids
            .map(|ids| ids.into_iter().map(|id| id.trim().to_lowercase()).collect());
        self
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(company_name: &str) -> CreateClientRequest {
        CreateClientRequest {
            company_name: company_name.to_string(),
            industry: Some("Retail".to_string()),
            contact_person: None,
            contact_email: Some("ops@contoso.com".to_string()),
            contact_phone: None,
            azure_subscription_ids: vec!["3fa85f64-5717-4562-b3fc-2c963f66afa6".to_string()],
            status: ClientStatus::Active,
            notes: None,
        }
    }

    #[test]
    fn valid_client_passes() {
        assert!(request("Contoso").validate().is_ok());
    }

    #[test]
    fn empty_company_name_is_a_field_error() {
        let errors = request("").validate().unwrap_err();
        assert!(errors.field_errors().contains_key("company_name"));
    }

    #[test]
    fn malformed_subscription_id_is_rejected() {
        let mut req = request("Contoso");
        req.azure_subscription_ids.push("not-a-guid".to_string());
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("azure_subscription_ids"));
    }

    #[test]
    fn normalization_trims_and_lowercases() {
        let mut req = request("  Contoso  ");
        req.industry = Some("   ".to_string());
        req.azure_subscription_ids = vec![" 3FA85F64-5717-4562-B3FC-2C963F66AFA6 ".to_string()];
        let req = req.normalized();
        assert_eq!(req.company_name, "Contoso");
        assert_eq!(req.industry, None);
        assert_eq!(
            req.azure_subscription_ids,
            vec!["3fa85f64-5717-4562-b3fc-2c963f66afa6"]
        );
    }
}
