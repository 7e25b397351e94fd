use crate::error::HttpAppError;
use advisor_core::constants::SYSTEM_USER_ID;
use advisor_core::models::UserRole;
use advisor_core::AppError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl Display for TokenType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: Uuid, // user_id
    pub role: UserRole,
    pub token_type: TokenType,
    pub exp: i64,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
}

/// Caller identity, inserted into request extensions by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: UserRole,
    pub email: String,
}

impl AuthContext {
    /// Context for requests authenticated with the master API key.
    pub fn system() -> Self {
        Self {
            user_id: SYSTEM_USER_ID,
            role: UserRole::Admin,
            email: "system".to_string(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.user_id == SYSTEM_USER_ID
    }

    /// User id to record as `created_by`. The system identity has no users row.
    pub fn actor_id(&self) -> Option<Uuid> {
        (!self.is_system()).then_some(self.user_id)
    }

    pub fn require(&self, allowed: bool, action: &str) -> Result<(), HttpAppError> {
        if allowed {
            Ok(())
        } else {
            tracing::debug!(user_id = %self.user_id, role = %self.role, action, "Insufficient role");
            Err(AppError::Forbidden(format!(
                "Your role ({}) is not allowed to {}",
                self.role, action
            ))
            .into())
        }
    }

    /// Create, upload, generate and share reports.
    pub fn require_analyst(&self, action: &str) -> Result<(), HttpAppError> {
        self.require(self.role.can_write_reports(), action)
    }

    /// Manage clients and templates, delete reports.
    pub fn require_manager(&self, action: &str) -> Result<(), HttpAppError> {
        self.require(self.role.can_manage(), action)
    }

    pub fn require_admin(&self, action: &str) -> Result<(), HttpAppError> {
        self.require(self.role.is_admin(), action)
    }
}

// Read straight from the request parts so the extractor also works in handlers
// that consume the body as Multipart.
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = HttpAppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_core::ErrorMetadata;

    fn ctx(role: UserRole) -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            role,
            email: "someone@example.com".to_string(),
        }
    }

    #[test]
    fn role_gates() {
        assert!(ctx(UserRole::Viewer).require_analyst("upload").is_err());
        assert!(ctx(UserRole::Analyst).require_analyst("upload").is_ok());
        assert!(ctx(UserRole::Analyst).require_manager("delete").is_err());
        assert!(ctx(UserRole::Manager).require_manager("delete").is_ok());
        assert!(ctx(UserRole::Manager).require_admin("create users").is_err());
        assert!(ctx(UserRole::Admin).require_admin("create users").is_ok());
    }

    #[test]
    fn forbidden_is_403() {
        let HttpAppError(err) = ctx(UserRole::Viewer).require_manager("delete").unwrap_err();
        assert_eq!(err.http_status_code(), 403);
    }

    #[test]
    fn system_context_has_no_actor() {
        let system = AuthContext::system();
        assert!(system.is_system());
        assert_eq!(system.role, UserRole::Admin);
        assert_eq!(system.actor_id(), None);

        let user = ctx(UserRole::Viewer);
        assert_eq!(user.actor_id(), Some(user.user_id));
    }

    #[test]
    fn token_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(TokenType::Refresh).unwrap(),
            serde_json::json!("refresh")
        );
    }
}
