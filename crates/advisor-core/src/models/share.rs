use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::report::{ReportFormat, ReportType};

/// External read-only link to a completed report
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ReportShare {
    pub id: Uuid,
    pub report_id: Uuid,
    pub token: String,
    pub created_by: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub access_count: i32,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ReportShare {
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema, Validate)]
pub struct CreateShareRequest {
    #[validate(range(min = 1, message = "Expiry must be at least one day"))]
    pub expires_in_days: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShareResponse {
    pub id: Uuid,
    pub report_id: Uuid,
    pub token: String,
    /// Path of the public endpoint serving this share
    pub share_url: String,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub access_count: i32,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ShareResponse {
    pub fn from_share(share: ReportShare, api_prefix: &str) -> Self {
        ShareResponse {
            share_url: format!("{}/shared/{}", api_prefix, share.token),
            id: share.id,
            report_id: share.report_id,
            token: share.token,
            expires_at: share.expires_at,
            is_active: share.is_active,
            access_count: share.access_count,
            last_accessed_at: share.last_accessed_at,
            created_at: share.created_at,
        }
    }
}

/// What an anonymous share holder gets to see
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SharedReportView {
    pub title: String,
    pub client_name: String,
    pub report_type: ReportType,
    pub analysis_data: Option<serde_json::Value>,
    pub available_formats: Vec<ReportFormat>,
    pub generated_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn share(is_active: bool, expires_in: Duration) -> ReportShare {
        let now = Utc::now();
        ReportShare {
            id: Uuid::new_v4(),
            report_id: Uuid::new_v4(),
            token: "ab".repeat(32),
            created_by: None,
            expires_at: now + expires_in,
            is_active,
            access_count: 0,
            last_accessed_at: None,
            created_at: now,
        }
    }

    #[test]
    fn revoked_or_expired_shares_are_unusable() {
        let now = Utc::now();
        assert!(share(true, Duration::days(1)).is_usable_at(now));
        assert!(!share(false, Duration::days(1)).is_usable_at(now));
        assert!(!share(true, Duration::seconds(-1)).is_usable_at(now));
    }

    #[test]
    fn share_url_uses_token() {
        let s = share(true, Duration::days(1));
        let token = s.token.clone();
        let response = ShareResponse::from_share(s, "/api/v1");
        assert_eq!(response.share_url, format!("/api/v1/shared/{}", token));
    }
}
