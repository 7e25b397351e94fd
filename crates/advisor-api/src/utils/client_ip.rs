//! Client IP resolution for per-IP limits.
//!
//! With `trusted_proxy_count = N`, the last N entries of `X-Forwarded-For` are our own
//! proxies and the entry before them is the client. With no trusted proxies the headers
//! are ignored, since any client can set them.

use crate::state::AppState;
use axum::extract::{ConnectInfo, FromRef, FromRequestParts};
use axum::http::{request::Parts, HeaderMap};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Client IP inserted into request extensions by the auth middleware.
///
/// Also usable as an extractor on public routes, where it is resolved from the
/// connection and the forwarding headers.
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ip) = parts.extensions.get::<ClientIp>() {
            return Ok(ip.clone());
        }
        let app = Arc::<AppState>::from_ref(state);
        let auth = &app.auth;
        let socket_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientIp(extract_client_ip(
            &parts.headers,
            socket_addr.as_ref(),
            auth.trusted_proxy_count,
        )))
    }
}

pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_addr: Option<&SocketAddr>,
    trusted_proxy_count: usize,
) -> String {
    if trusted_proxy_count > 0 {
        if let Some(ip) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| from_forwarded_for(v, trusted_proxy_count))
        {
            return ip;
        }

        if let Some(ip) = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| is_valid_ip(v))
        {
            return ip.to_string();
        }
    }

    socket_addr
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn from_forwarded_for(header_value: &str, trusted_proxy_count: usize) -> Option<String> {
    let ips: Vec<&str> = header_value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    // a chain shorter than our proxy count was not built by our proxies
    if ips.len() <= trusted_proxy_count {
        return None;
    }

    let candidate = ips[ips.len() - trusted_proxy_count - 1];
    is_valid_ip(candidate).then(|| candidate.to_string())
}

fn is_valid_ip(ip: &str) -> bool {
    ip.parse::<IpAddr>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(forwarded: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_str(forwarded).unwrap());
        headers
    }

    #[test]
    fn ignores_forwarded_headers_without_trusted_proxies() {
        let socket: SocketAddr = "10.0.0.5:4000".parse().unwrap();
        let ip = extract_client_ip(&headers("1.2.3.4"), Some(&socket), 0);
        assert_eq!(ip, "10.0.0.5");
    }

    #[test]
    fn picks_entry_before_trusted_proxies() {
        let ip = extract_client_ip(&headers("6.6.6.6, 1.2.3.4, 10.0.0.1"), None, 1);
        assert_eq!(ip, "1.2.3.4");
    }

    #[test]
    fn short_chain_falls_back_to_socket() {
        let socket: SocketAddr = "10.0.0.5:4000".parse().unwrap();
        let ip = extract_client_ip(&headers("1.2.3.4"), Some(&socket), 2);
        assert_eq!(ip, "10.0.0.5");
    }

    #[test]
    fn invalid_entries_are_rejected() {
        assert_eq!(extract_client_ip(&headers("not-an-ip, 10.0.0.1"), None, 1), "unknown");
    }
}
