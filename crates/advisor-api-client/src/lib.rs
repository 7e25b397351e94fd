//! HTTP client for the Advisor reports API.
//!
//! Authenticates with `Authorization: Bearer` (a JWT access token or the master key).
//! Non-2xx responses are turned into [`ApiError`], which carries the server's
//! error envelope when one was returned. The CLI uses this client directly.

pub mod api;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

pub use advisor_core::constants::API_PREFIX;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Error envelope returned by the API on failure.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default)]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default)]
    pub code: Option<String>,
}

/// A request the server answered with a non-success status.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: Option<ErrorBody>,
    /// Raw response text when it was not an error envelope
    pub raw: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            Some(body) => {
                write!(f, "{} ({})", body.message, self.status)?;
                if let Some(errors) = &body.errors {
                    for (field, messages) in errors {
                        write!(f, "\n  {}: {}", field, messages.join("; "))?;
                    }
                }
                Ok(())
            }
            None if self.raw.is_empty() => write!(f, "API request failed with status {}", self.status),
            None => write!(f, "API request failed with status {}: {}", self.status, self.raw),
        }
    }
}

impl std::error::Error for ApiError {}

/// HTTP client for the Advisor API.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Client from ADVISOR_API_URL and ADVISOR_API_TOKEN. The token is optional so
    /// `login` can run before one exists.
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("ADVISOR_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let token = std::env::var("ADVISOR_API_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        Self::new(base_url, token)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a path under the API prefix.
    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let request = self.client.request(method, self.build_url(path));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.context("Failed to send request")?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let raw = response.text().await.unwrap_or_default();
        let body = serde_json::from_str::<ErrorBody>(&raw).ok();
        Err(ApiError { status, body, raw }.into())
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        self.send(request)
            .await?
            .json()
            .await
            .context("Failed to parse response as JSON")
    }

    /// GET with optional query parameters. Deserializes the JSON response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let mut request = self.request(reqwest::Method::GET, path);
        if !query.is_empty() {
            request = request.query(query);
        }
        self.json(request).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.json(self.request(reqwest::Method::POST, path).json(body))
            .await
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.json(self.request(reqwest::Method::PUT, path).json(body))
            .await
    }

    /// POST without a body.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.json(self.request(reqwest::Method::POST, path)).await
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<T> {
        self.json(self.request(reqwest::Method::POST, path).multipart(form))
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(self.request(reqwest::Method::DELETE, path))
            .await?;
        Ok(())
    }

    /// GET returning the raw body, for file downloads.
    pub async fn get_bytes(&self, path: &str) -> Result<bytes::Bytes> {
        self.send(self.request(reqwest::Method::GET, path))
            .await?
            .bytes()
            .await
            .context("Failed to read response body")
    }
}

/// Status code of an [`ApiError`] inside an `anyhow::Error`, if that is what it holds.
pub fn api_status(err: &anyhow::Error) -> Option<StatusCode> {
    err.downcast_ref::<ApiError>().map(|e| e.status)
}

pub use api::{GenerateOutcome, TaskListResponse};
pub use advisor_core::models::{
    Client as ClientRecord, ClientStatistics, DashboardStats, GenerateAcceptedResponse, Paginated,
    Recommendation, ReportFormat, ReportResponse, ReportStatus, ReportType, TaskStatusResponse,
    TokenResponse, UserResponse,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_built_under_the_api_prefix() {
        let client = ApiClient::new("http://example.test/", None).unwrap();
        assert_eq!(client.base_url(), "http://example.test");
        assert_eq!(
            client.build_url("/reports"),
            "http://example.test/api/v1/reports"
        );
    }

    #[test]
    fn error_display_includes_field_errors() {
        let err = ApiError {
            status: StatusCode::BAD_REQUEST,
            body: Some(ErrorBody {
                message: "Validation failed".to_string(),
                errors: Some(BTreeMap::from([(
                    "company_name".to_string(),
                    vec!["Company name must be between 1 and 255 characters".to_string()],
                )])),
                code: Some("VALIDATION_ERROR".to_string()),
            }),
            raw: String::new(),
        };
        let text = err.to_string();
        assert!(text.starts_with("Validation failed (400 Bad Request)"));
        assert!(text.contains("company_name: Company name must be"));
    }

    #[test]
    fn api_status_reads_through_anyhow() {
        let err: anyhow::Error = ApiError {
            status: StatusCode::NOT_FOUND,
            body: None,
            raw: String::new(),
        }
        .into();
        assert_eq!(api_status(&err), Some(StatusCode::NOT_FOUND));
        assert_eq!(api_status(&anyhow::anyhow!("other")), None);
    }
}
