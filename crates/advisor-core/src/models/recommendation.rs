use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Azure Advisor recommendation pillar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "recommendation_category", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Cost,
    Security,
    Reliability,
    OperationalExcellence,
    Performance,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Cost,
        Category::Security,
        Category::Reliability,
        Category::OperationalExcellence,
        Category::Performance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Cost => "cost",
            Category::Security => "security",
            Category::Reliability => "reliability",
            Category::OperationalExcellence => "operational_excellence",
            Category::Performance => "performance",
        }
    }

    /// Name as shown in the Azure portal and in rendered reports.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Cost => "Cost",
            Category::Security => "Security",
            Category::Reliability => "Reliability",
            Category::OperationalExcellence => "Operational Excellence",
            Category::Performance => "Performance",
        }
    }

    /// Accepts the API form and the spellings found in Advisor exports
    /// (`HighAvailability`, `OperationalExcellence`, `Operational Excellence`).
    pub fn parse_loose(value: &str) -> Option<Category> {
        let normalized: String = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "cost" => Some(Category::Cost),
            "security" => Some(Category::Security),
            "reliability" | "highavailability" => Some(Category::Reliability),
            "operationalexcellence" => Some(Category::OperationalExcellence),
            "performance" => Some(Category::Performance),
            _ => None,
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::parse_loose(s).ok_or_else(|| anyhow::anyhow!("Invalid category: {}", s))
    }
}

/// Declared low to high so database ordering ranks `high` last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "business_impact", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum BusinessImpact {
    Low,
    Medium,
    High,
}

impl BusinessImpact {
    pub const ALL: [BusinessImpact; 3] =
        [BusinessImpact::High, BusinessImpact::Medium, BusinessImpact::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessImpact::Low => "low",
            BusinessImpact::Medium => "medium",
            BusinessImpact::High => "high",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BusinessImpact::Low => "Low",
            BusinessImpact::Medium => "Medium",
            BusinessImpact::High => "High",
        }
    }
}

impl Display for BusinessImpact {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for BusinessImpact {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(BusinessImpact::High),
            "medium" | "moderate" => Ok(BusinessImpact::Medium),
            "low" => Ok(BusinessImpact::Low),
            _ => Err(anyhow::anyhow!("Invalid business impact: {}", s)),
        }
    }
}

/// One Advisor row. Rows are written once during ingestion and never edited.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Recommendation {
    pub id: Uuid,
    pub report_id: Uuid,
    pub category: Category,
    pub business_impact: BusinessImpact,
    pub recommendation: String,
    pub subscription_id: Option<String>,
    pub subscription_name: Option<String>,
    pub resource_group: Option<String>,
    pub resource_name: Option<String>,
    pub resource_type: Option<String>,
    pub potential_benefits: Option<String>,
    #[schema(value_type = f64)]
    pub potential_savings: Decimal,
    pub currency: String,
    pub retirement_date: Option<NaiveDate>,
    pub retiring_feature: Option<String>,
    pub advisor_updated_at: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// Parsed CSV row awaiting insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecommendation {
    pub category: Category,
    pub business_impact: BusinessImpact,
    pub recommendation: String,
    pub subscription_id: Option<String>,
    pub subscription_name: Option<String>,
    pub resource_group: Option<String>,
    pub resource_name: Option<String>,
    pub resource_type: Option<String>,
    pub potential_benefits: Option<String>,
    pub potential_savings: Decimal,
    pub currency: String,
    pub retirement_date: Option<NaiveDate>,
    pub retiring_feature: Option<String>,
    pub advisor_updated_at: Option<NaiveDate>,
}

impl From<Recommendation> for NewRecommendation {
    fn from(r: Recommendation) -> Self {
        NewRecommendation {
            category: r.category,
            business_impact: r.business_impact,
            recommendation: r.recommendation,
            subscription_id: r.subscription_id,
            subscription_name: r.subscription_name,
            resource_group: r.resource_group,
            resource_name: r.resource_name,
            resource_type: r.resource_type,
            potential_benefits: r.potential_benefits,
            potential_savings: r.potential_savings,
            currency: r.currency,
            retirement_date: r.retirement_date,
            retiring_feature: r.retiring_feature,
            advisor_updated_at: r.advisor_updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct RecommendationListQuery {
    pub report_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub category: Option<Category>,
    pub business_impact: Option<BusinessImpact>,
    #[param(value_type = Option<f64>)]
    pub min_savings: Option<Decimal>,
    /// Matches recommendation text, resource name or resource group
    pub search: Option<String>,
    /// `potential_savings`, `business_impact`, `category`, `created_at`; `-` for descending
    pub ordering: Option<String>,
}
