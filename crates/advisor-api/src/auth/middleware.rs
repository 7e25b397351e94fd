use crate::auth::jwt::JwtService;
use crate::auth::models::{AuthContext, TokenType};
use crate::error::HttpAppError;
use crate::utils::client_ip::{extract_client_ip, ClientIp};
use advisor_core::AppError;
use advisor_db::UserRepository;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;

pub const AUTH_FAILURE_LIMIT: u32 = 10;
pub const AUTH_FAILURE_WINDOW_SECS: u64 = 15 * 60;

/// Counts failed authentications per client IP in a fixed window.
#[derive(Clone)]
pub struct AuthFailureLimiter {
    inner: Arc<Mutex<HashMap<String, (u32, Instant)>>>,
    max_failures: u32,
    window: Duration,
}

impl AuthFailureLimiter {
    pub fn new(max_failures: u32, window_seconds: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            max_failures,
            window: Duration::from_secs(window_seconds),
        }
    }

    /// Records a failure and returns the IP's failure count in the current
    /// window. The failing request itself still gets its 401; requests made
    /// after the limit is reached are refused by [`Self::is_blocked`].
    pub async fn record_failure(&self, ip: &str) -> u32 {
        let mut guard = self.inner.lock().await;
        let now = Instant::now();
        // expired windows are dropped here so the map does not grow without bound
        guard.retain(|_, (_, reset_at)| now < *reset_at);
        let (count, _) = guard
            .entry(ip.to_string())
            .or_insert((0, now + self.window));
        *count += 1;
        *count
    }

    pub async fn is_blocked(&self, ip: &str) -> bool {
        let mut guard = self.inner.lock().await;
        if let Some((count, reset_at)) = guard.get(ip) {
            if Instant::now() >= *reset_at {
                guard.remove(ip);
                return false;
            }
            return *count >= self.max_failures;
        }
        false
    }

    pub async fn clear(&self, ip: &str) {
        self.inner.lock().await.remove(ip);
    }
}

#[derive(Clone)]
pub struct AuthState {
    pub jwt: JwtService,
    pub master_api_key: Option<String>,
    pub user_repository: UserRepository,
    pub failure_limiter: AuthFailureLimiter,
    pub trusted_proxy_count: usize,
}

impl AuthState {
    pub fn client_ip(&self, request: &Request) -> String {
        let socket_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        extract_client_ip(
            request.headers(),
            socket_addr.as_ref(),
            self.trusted_proxy_count,
        )
    }

    /// Resolves a bearer token (JWT access token or the master key) to a caller.
    pub async fn authenticate(&self, token: &str) -> Result<AuthContext, AppError> {
        if let Some(master) = self.master_api_key.as_deref() {
            if secure_compare(token, master) {
                return Ok(AuthContext::system());
            }
        }

        let claims = self.jwt.verify(token, TokenType::Access)?;
        let user = self
            .user_repository
            .get(claims.sub)
            .await?
            .filter(|user| user.is_active)
            .ok_or_else(|| AppError::Unauthorized("User is inactive or no longer exists".to_string()))?;

        // role comes from the database so demotions apply before the token expires
        Ok(AuthContext {
            user_id: user.id,
            role: user.role,
            email: user.email,
        })
    }
}

fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn too_many_failures() -> Response {
    HttpAppError(AppError::RateLimited(
        "Too many failed authentication attempts".to_string(),
    ))
    .into_response()
}

pub async fn auth_middleware(
    State(auth_state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let client_ip = auth_state.client_ip(&request);
    let limiter = &auth_state.failure_limiter;

    if limiter.is_blocked(&client_ip).await {
        return too_many_failures();
    }

    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from);

    let result = match token {
        Some(token) => auth_state.authenticate(&token).await,
        None => Err(AppError::Unauthorized(
            "Missing or malformed Authorization header".to_string(),
        )),
    };

    match result {
        Ok(ctx) => {
            tracing::debug!(user_id = %ctx.user_id, role = %ctx.role, "Request authenticated");
            request.extensions_mut().insert(ClientIp(client_ip));
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(AppError::Unauthorized(reason)) => {
            tracing::info!(client_ip = %client_ip, reason = %reason, "Authentication failed");
            let failures = limiter.record_failure(&client_ip).await;
            if failures == limiter.max_failures {
                tracing::warn!(client_ip = %client_ip, failures, "Authentication failure limit reached");
            }
            HttpAppError(AppError::Unauthorized(reason)).into_response()
        }
        // database trouble is not the caller's fault and must not count against them
        Err(other) => HttpAppError(other).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_compare_matches_only_equal_strings() {
        assert!(secure_compare("abc", "abc"));
        assert!(!secure_compare("abc", "abd"));
        assert!(!secure_compare("abc", "abcd"));
    }

    #[tokio::test]
    async fn limiter_blocks_after_max_failures() {
        let limiter = AuthFailureLimiter::new(3, 60);
        assert_eq!(limiter.record_failure("1.2.3.4").await, 1);
        assert_eq!(limiter.record_failure("1.2.3.4").await, 2);
        assert!(!limiter.is_blocked("1.2.3.4").await);
        // the third failure is still answered normally; the next attempt is refused
        assert_eq!(limiter.record_failure("1.2.3.4").await, 3);
        assert!(limiter.is_blocked("1.2.3.4").await);
        assert!(!limiter.is_blocked("5.6.7.8").await);
    }

    #[tokio::test]
    async fn limiter_window_expires() {
        let limiter = AuthFailureLimiter::new(1, 0);
        assert_eq!(limiter.record_failure("1.2.3.4").await, 1);
        assert!(!limiter.is_blocked("1.2.3.4").await);
    }

    #[tokio::test]
    async fn clear_resets_the_count() {
        let limiter = AuthFailureLimiter::new(2, 60);
        limiter.record_failure("1.2.3.4").await;
        limiter.clear("1.2.3.4").await;
        assert_eq!(limiter.record_failure("1.2.3.4").await, 1);
        assert!(!limiter.is_blocked("1.2.3.4").await);
    }
}
