//! HS256 access and refresh tokens.

use crate::auth::models::{JwtClaims, TokenType};
use advisor_core::models::User;
use advisor_core::AppError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

/// Signs and verifies tokens with the configured secret.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtService {
    pub fn new(secret: &str, access_ttl_minutes: i64, refresh_ttl_days: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl: Duration::minutes(access_ttl_minutes.max(1)),
            refresh_ttl: Duration::days(refresh_ttl_days.max(1)),
        }
    }

    /// Lifetime of an access token in seconds.
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    pub fn issue(&self, user: &User, token_type: TokenType) -> Result<String, AppError> {
        let now = Utc::now();
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        let claims = JwtClaims {
            sub: user.id,
            role: user.role,
            token_type,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            nbf: Some(now.timestamp()),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            AppError::InternalWithSource {
                message: "Failed to sign token".to_string(),
                source: e.into(),
            }
        })
    }

    /// Verifies signature, expiry and that the token is of the `expected` kind.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<JwtClaims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_nbf = true;
        validation.leeway = 30;

        let claims = decode::<JwtClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "JWT rejected");
                AppError::Unauthorized("Invalid or expired token".to_string())
            })?
            .claims;

        if claims.token_type != expected {
            return Err(AppError::Unauthorized(format!(
                "Expected an {} token",
                expected
            )));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_core::models::UserRole;
    use uuid::Uuid;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "analyst@example.com".to_string(),
            password_hash: String::new(),
            full_name: "Ana Lyst".to_string(),
            role: UserRole::Analyst,
            is_active: true,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn access_token_round_trip() {
        let jwt = JwtService::new(SECRET, 60, 7);
        let user = user();
        let token = jwt.issue(&user, TokenType::Access).unwrap();
        let claims = jwt.verify(&token, TokenType::Access).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, UserRole::Analyst);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn token_types_are_not_interchangeable() {
        let jwt = JwtService::new(SECRET, 60, 7);
        let user = user();
        let access = jwt.issue(&user, TokenType::Access).unwrap();
        let refresh = jwt.issue(&user, TokenType::Refresh).unwrap();
        assert!(jwt.verify(&access, TokenType::Refresh).is_err());
        assert!(jwt.verify(&refresh, TokenType::Access).is_err());
        assert!(jwt.verify(&refresh, TokenType::Refresh).is_ok());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = JwtService::new(SECRET, 60, 7)
            .issue(&user(), TokenType::Access)
            .unwrap();
        let other = JwtService::new("fedcba9876543210fedcba9876543210", 60, 7);
        assert!(matches!(
            other.verify(&token, TokenType::Access),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let jwt = JwtService::new(SECRET, 60, 7);
        assert!(jwt.verify("not.a.jwt", TokenType::Access).is_err());
    }
}
