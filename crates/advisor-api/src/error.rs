//! HTTP error response conversion
//!
//! Handlers return `Result<impl IntoResponse, HttpAppError>`. Anything that converts into
//! `AppError` converts into `HttpAppError` too, so `?` works on repository, storage and
//! processing results alike and every failure renders the same envelope.

use advisor_core::{AppError, ErrorMetadata, FieldErrors, LogLevel};
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use utoipa::ToSchema;

/// Body of every non-2xx response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Always `"error"`
    pub status: String,
    pub message: String,
    /// Field name -> messages, for validation and CSV format errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
    /// Machine-readable error code for programmatic handling
    pub code: String,
    /// Whether this error is recoverable (can be retried)
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl ErrorResponse {
    fn from_app_error(error: &AppError, include_details: bool) -> Self {
        Self {
            status: "error".to_string(),
            message: error.client_message(),
            errors: error.field_errors(),
            code: error.error_code().to_string(),
            recoverable: error.is_recoverable(),
            suggested_action: error.suggested_action().map(String::from),
            details: include_details.then(|| error.detailed_message()),
            error_type: include_details.then(|| error.error_type().to_string()),
        }
    }
}

/// Wrapper type for AppError to implement IntoResponse.
/// Orphan rules stop us implementing axum's trait on advisor-core's type.
#[derive(Debug)]
pub struct HttpAppError(pub AppError);

impl<E> From<E> for HttpAppError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        HttpAppError(err.into())
    }
}

/// Name of the field in serde's "missing field `name`" message, if present.
fn missing_field(body_text: &str) -> Option<&str> {
    let rest = body_text.split("missing field `").nth(1)?;
    rest.split('`').next().filter(|name| !name.is_empty())
}

fn rejection_error(body_text: String) -> AppError {
    if let Some(field) = missing_field(&body_text) {
        return AppError::field(field, "This field is required");
    }
    let message = if body_text.contains("expected a formatted UUID") {
        "Invalid request: identifiers must be UUID strings".to_string()
    } else {
        format!("Invalid request: {}", body_text)
    };
    AppError::InvalidInput(message)
}

/// Parses a JSON body read by hand, with the same error mapping as [`ValidatedJson`].
pub fn json_from_slice<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| rejection_error(e.to_string()))
}

/// JSON body extractor whose rejection is a 400 in the standard error envelope.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = HttpAppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(inner) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| HttpAppError(rejection_error(rejection.body_text())))?;
        Ok(ValidatedJson(inner))
    }
}

/// Query string extractor with the same rejection behavior as [`ValidatedJson`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedQuery<T>(pub T);

impl<T, S> axum::extract::FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = HttpAppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let axum::extract::Query(inner) =
            axum::extract::Query::<T>::from_request_parts(parts, state)
                .await
                .map_err(|rejection: QueryRejection| {
                    HttpAppError(rejection_error(rejection.body_text()))
                })?;
        Ok(ValidatedQuery(inner))
    }
}

fn log_error(error: &AppError) {
    let error_type = error.error_type();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, error_type = error_type, "Request failed");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, error_type = error_type, "Request failed");
        }
        LogLevel::Error => {
            tracing::error!(error = %error.detailed_message(), error_type = error_type, "Request failed");
        }
    }
}

fn is_production_env() -> bool {
    std::env::var("ENVIRONMENT")
        .map(|env| matches!(env.to_lowercase().as_str(), "production" | "prod"))
        .unwrap_or(false)
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let app_error = &self.0;
        let status = StatusCode::from_u16(app_error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        log_error(app_error);

        let include_details = !is_production_env() && !app_error.is_sensitive();
        let body = ErrorResponse::from_app_error(app_error, include_details);

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_processing::ValidationError;
    use advisor_storage::StorageError;
    use axum::body::to_bytes;

    async fn body_json(error: AppError) -> (StatusCode, serde_json::Value) {
        let response = HttpAppError(error).into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_errors_carry_field_messages() {
        let (status, json) = body_json(AppError::field("company_name", "This field is required")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
        assert_eq!(
            json["errors"]["company_name"][0],
            "This field is required"
        );
        assert!(json["message"].as_str().is_some());
        assert!(json["code"].as_str().is_some());
    }

    #[tokio::test]
    async fn not_found_has_no_field_errors() {
        let (status, json) = body_json(AppError::NotFound("Report not found".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["status"], "error");
        assert!(json.get("errors").is_none());
        assert_eq!(json["recoverable"], false);
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let (status, json) = body_json(AppError::Internal("connection pool exhausted".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json.get("details").is_none());
        assert!(!json["message"]
            .as_str()
            .unwrap()
            .contains("connection pool exhausted"));
    }

    #[tokio::test]
    async fn csv_row_errors_are_listed_under_file() {
        let (status, json) = body_json(AppError::CsvFormat {
            message: "2 rows could not be imported".to_string(),
            row_errors: vec![
                "line 3: unknown category 'Foo'".to_string(),
                "line 7: negative savings".to_string(),
            ],
        })
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"]["file"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn storage_not_found_maps_to_404() {
        let HttpAppError(err) = HttpAppError::from(StorageError::NotFound("k".to_string()));
        assert_eq!(err.http_status_code(), 404);
    }

    #[test]
    fn oversized_upload_maps_to_413() {
        let HttpAppError(err) = HttpAppError::from(ValidationError::FileTooLarge {
            size: 1000,
            max: 500,
        });
        assert_eq!(err.http_status_code(), 413);
    }

    #[test]
    fn missing_json_field_becomes_a_field_error() {
        let err = rejection_error(
            "Failed to deserialize the JSON body into the target type: missing field `company_name` at line 1 column 2"
                .to_string(),
        );
        let errors = err.field_errors().unwrap();
        assert_eq!(errors["company_name"][0], "This field is required");
        assert_eq!(err.http_status_code(), 400);
    }

    #[test]
    fn uuid_rejections_get_a_friendly_message() {
        let err = rejection_error("Failed to deserialize: expected a formatted UUID".to_string());
        match err {
            AppError::InvalidInput(msg) => assert!(msg.contains("UUID strings")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
