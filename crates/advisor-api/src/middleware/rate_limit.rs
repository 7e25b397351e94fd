//! Fixed-window HTTP rate limiting.
//!
//! Anonymous traffic is limited per client IP. Authenticated routes get a second,
//! per-user limit applied after the auth middleware has identified the caller.

use crate::auth::models::AuthContext;
use crate::error::HttpAppError;
use crate::utils::client_ip::extract_client_ip;
use advisor_core::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_SHARDS: usize = 16;
/// Buckets per shard before expired ones are swept inline.
const MAX_BUCKETS_PER_SHARD: usize = 10_000;

#[derive(Clone, Debug)]
struct Bucket {
    count: u32,
    reset_at: Instant,
}

impl Bucket {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            reset_at: now + WINDOW,
        }
    }

    /// `Ok(remaining)` when the request fits, `Err(reset_in)` otherwise.
    fn hit(&mut self, limit: u32, now: Instant) -> Result<u32, Duration> {
        if now >= self.reset_at {
            self.count = 0;
            self.reset_at = now + WINDOW;
        }
        if self.count < limit {
            self.count += 1;
            Ok(limit - self.count)
        } else {
            Err(self.reset_at.saturating_duration_since(now))
        }
    }
}

/// Sharded in-memory limiter: keys hash onto separate mutexes to spread contention.
pub struct HttpRateLimiter {
    shards: Vec<Mutex<HashMap<String, Bucket>>>,
    limit_per_minute: u32,
}

impl HttpRateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        Self::with_shards(limit_per_minute, DEFAULT_SHARDS)
    }

    pub fn with_shards(limit_per_minute: u32, shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self {
            shards,
            limit_per_minute,
        }
    }

    pub fn limit_per_minute(&self) -> u32 {
        self.limit_per_minute
    }

    fn shard(&self, key: &str) -> &Mutex<HashMap<String, Bucket>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    pub async fn check(&self, key: &str) -> Result<u32, Duration> {
        let now = Instant::now();
        let mut buckets = self.shard(key).lock().await;
        if buckets.len() >= MAX_BUCKETS_PER_SHARD {
            buckets.retain(|_, bucket| bucket.reset_at > now);
        }
        buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(now))
            .hit(self.limit_per_minute, now)
    }

    /// Drops buckets whose window has passed.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for shard in &self.shards {
            let mut buckets = shard.lock().await;
            let before = buckets.len();
            buckets.retain(|_, bucket| bucket.reset_at > now);
            removed += before - buckets.len();
        }
        if removed > 0 {
            tracing::debug!(buckets_removed = removed, "Expired rate limit buckets removed");
        }
        removed
    }
}

/// Per-IP limiter plus what the middleware needs to find the client IP.
#[derive(Clone)]
pub struct IpRateLimitState {
    pub limiter: Arc<HttpRateLimiter>,
    pub trusted_proxy_count: usize,
}

fn with_limit_headers(mut response: Response, limit: u32, remaining: u32) -> Response {
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
    response
}

fn limited(key: &str, path: &str, limit: u32, reset_in: Duration) -> Response {
    tracing::warn!(rate_limit_key = %key, path = %path, limit, "Rate limit exceeded");
    let response = HttpAppError(AppError::RateLimited(
        "Too many requests. Please slow down.".to_string(),
    ))
    .into_response();
    let mut response = with_limit_headers(response, limit, 0);
    response
        .headers_mut()
        .insert("Retry-After", HeaderValue::from(reset_in.as_secs().max(1)));
    response
}

pub async fn ip_rate_limit_middleware(
    State(state): State<IpRateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let socket_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = extract_client_ip(request.headers(), socket_addr.as_ref(), state.trusted_proxy_count);
    let key = format!("ip:{}", ip);
    let limit = state.limiter.limit_per_minute();

    match state.limiter.check(&key).await {
        Ok(remaining) => with_limit_headers(next.run(request).await, limit, remaining),
        Err(reset_in) => limited(&key, request.uri().path(), limit, reset_in),
    }
}

/// Runs inside the auth middleware. Without a caller context the request passes through.
pub async fn user_rate_limit_middleware(
    State(limiter): State<Arc<HttpRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(user_id) = request.extensions().get::<AuthContext>().map(|c| c.user_id) else {
        return next.run(request).await;
    };
    let key = format!("user:{}", user_id);
    let limit = limiter.limit_per_minute();

    match limiter.check(&key).await {
        Ok(_) => next.run(request).await,
        Err(reset_in) => limited(&key, request.uri().path(), limit, reset_in),
    }
}

/// Sweeps expired buckets every five minutes for the life of the process.
pub fn spawn_cleanup(limiter: Arc<HttpRateLimiter>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            limiter.cleanup_expired().await;
        }
    })
}
