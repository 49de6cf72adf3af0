use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::Uri,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::config::ErrorConfig;
use crate::errors::{ApiError, ErrorKind};

lazy_static::lazy_static! {
    static ref START_TIME: Instant = Instant::now();
}

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub error_config: ErrorConfig,
    pub instance_id: String,
}

/// Generic API response wrapper; the success-side twin of
/// [`ErrorResponse`](crate::errors::ErrorResponse)
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Always true
    pub success: bool,
    /// Response payload
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// One entry of the error catalogue
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorKindInfo {
    pub kind: ErrorKind,
    pub status_code: u16,
    pub default_message: String,
}

impl From<ErrorKind> for ErrorKindInfo {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            status_code: kind.status_code(),
            default_message: kind.default_message().to_string(),
        }
    }
}

/// Optional overrides when raising an error
#[derive(Debug, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RaiseParams {
    /// Replaces the default message
    pub message: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EmailData {
    pub email: String,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = serde_json::Value)
    )
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "api-error",
        "version": env!("CARGO_PKG_VERSION"),
        "instance_id": state.instance_id,
        "include_stack": state.error_config.include_stack,
        "uptime_seconds": START_TIME.elapsed().as_secs(),
    }))
}

/// List every named error kind
#[utoipa::path(
    get,
    path = "/errors",
    tag = "errors",
    responses(
        (status = 200, description = "Error catalogue", body = Vec<ErrorKindInfo>)
    )
)]
pub async fn list_error_kinds() -> impl IntoResponse {
    let kinds: Vec<ErrorKindInfo> = ErrorKind::ALL.into_iter().map(Into::into).collect();
    Json(ApiResponse::success(kinds))
}

/// Raise the error produced by a named constructor
#[utoipa::path(
    get,
    path = "/errors/{kind}",
    tag = "errors",
    params(
        ("kind" = String, Path, description = "Error kind slug, e.g. not-found"),
        RaiseParams
    ),
    responses(
        (status = 400, description = "The requested error", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown kind", body = crate::errors::ErrorResponse)
    )
)]
pub async fn raise_error(
    Path(kind): Path<String>,
    params: Result<Query<RaiseParams>, QueryRejection>,
) -> ApiError {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => return rejection.into(),
    };

    let kind = match kind.parse::<ErrorKind>() {
        Ok(kind) => kind,
        Err(e) => {
            let known: Vec<&str> = ErrorKind::ALL.iter().map(|k| k.slug()).collect();
            return ApiError::not_found()
                .with_message(e.to_string())
                .with_error(json!({ "known": known }));
        }
    };

    debug!(kind = %kind, "Raising named error");

    let api_error = ApiError::from_kind(kind);
    match params.message {
        Some(message) => api_error.with_message(message),
        None => api_error,
    }
}

/// Raise an error with an arbitrary status code
#[utoipa::path(
    get,
    path = "/errors/status/{code}",
    tag = "errors",
    params(
        ("code" = u16, Path, description = "Status code to carry"),
        RaiseParams
    ),
    responses(
        (status = 500, description = "The requested error", body = crate::errors::ErrorResponse)
    )
)]
pub async fn raise_status(
    code: Result<Path<u16>, PathRejection>,
    params: Result<Query<RaiseParams>, QueryRejection>,
) -> ApiError {
    let Path(code) = match code {
        Ok(code) => code,
        Err(rejection) => return rejection.into(),
    };
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => return rejection.into(),
    };

    let api_error = ApiError::new(code);
    match params.message {
        Some(message) => api_error.with_message(message),
        None => api_error,
    }
}

/// Always panics; only mounted in development mode
pub async fn trigger_panic() -> &'static str {
    panic!("handler panicked on purpose")
}

/// Validate an email address
#[utoipa::path(
    post,
    path = "/validate/email",
    tag = "validation",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Address is valid", body = serde_json::Value),
        (status = 400, description = "Address is invalid", body = crate::errors::ErrorResponse),
        (status = 422, description = "Malformed body", body = crate::errors::ErrorResponse)
    )
)]
pub async fn validate_email(
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<EmailData>>, ApiError> {
    let Json(request) = payload?;
    let email = request.email.trim();

    if !is_valid_email(email) {
        return Err(ApiError::bad_request()
            .with_message("Invalid email")
            .with_error(json!({ "field": "email", "issue": "invalid format" })));
    }

    Ok(Json(ApiResponse::success(EmailData {
        email: email.to_string(),
    })))
}

/// Fallback for unknown routes
pub async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::not_found().with_message(format!("Route not found: {}", uri.path()))
}

/// OpenAPI document
pub async fn openapi_json() -> impl IntoResponse {
    Json(super::openapi::ApiDoc::openapi())
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .map(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("first.last@mail.example.org"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("user"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("us er@example.com"));
        assert!(!is_valid_email("user@.com"));
    }

    #[test]
    fn test_error_kind_info() {
        let info = ErrorKindInfo::from(ErrorKind::TooManyRequests);
        assert_eq!(info.status_code, 429);
        assert_eq!(info.default_message, "Too Many Requests");
    }
}
