use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::client::StatusCount;
use super::recommendation::{BusinessImpact, Category};

/// Aggregates computed from one report's recommendations and stored in
/// `reports.analysis_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnalysisSummary {
    pub total_recommendations: i64,
    #[schema(value_type = f64)]
    pub total_potential_savings: Decimal,
    pub currency: String,
    pub by_category: Vec<CategorySummary>,
    pub by_impact: Vec<ImpactSummary>,
    pub subscription_count: i64,
    pub resource_group_count: i64,
    pub resource_count: i64,
    pub top_recommendations: Vec<TopRecommendation>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CategorySummary {
    pub category: Category,
    pub count: i64,
    #[schema(value_type = f64)]
    pub potential_savings: Decimal,
    pub high_impact: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ImpactSummary {
    pub business_impact: BusinessImpact,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TopRecommendation {
    pub category: Category,
    pub business_impact: BusinessImpact,
    pub recommendation: String,
    pub resource_name: Option<String>,
    #[schema(value_type = f64)]
    pub potential_savings: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DashboardStats {
    pub total_clients: i64,
    pub active_clients: i64,
    pub total_reports: i64,
    pub reports_by_status: Vec<StatusCount>,
    pub reports_last_30_days: i64,
    pub total_recommendations: i64,
    #[schema(value_type = f64)]
    pub total_potential_savings: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CategoryBreakdown {
    pub category: Category,
    pub count: i64,
    #[schema(value_type = f64)]
    pub potential_savings: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TrendPoint {
    pub day: NaiveDate,
    pub reports_created: i64,
    pub reports_completed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TopSaving {
    pub recommendation_id: Uuid,
    pub report_id: Uuid,
    pub client_id: Uuid,
    pub client_name: String,
    pub category: Category,
    pub business_impact: BusinessImpact,
    pub recommendation: String,
    pub resource_name: Option<String>,
    #[schema(value_type = f64)]
    pub potential_savings: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct CategoryQuery {
    pub client_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct TrendQuery {
    /// Window size in days (1-365, default 30)
    pub days: Option<i64>,
}

impl TrendQuery {
    pub fn days(&self) -> i64 {
        self.days.unwrap_or(30).clamp(1, 365)
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct TopSavingsQuery {
    /// Number of rows (1-100, default 10)
    pub limit: Option<i64>,
    pub client_id: Option<Uuid>,
}

impl TopSavingsQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(10).clamp(1, 100)
    }
}
