use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::api_error::ApiError;

/// Structured error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Always false for errors
    pub success: bool,
    /// HTTP status code of the failure
    pub status_code: u16,
    /// Human-readable error message
    pub message: String,
    /// Caller-defined details, e.g. per-field validation issues
    #[schema(value_type = Vec<Object>)]
    pub errors: Vec<Value>,
    /// ISO-8601 instant the error was created
    pub timestamp: String,
    /// Stack trace, present only in development mode; `Some(None)` is an
    /// explicit `null` (development mode, nothing captured)
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    #[schema(value_type = Option<String>)]
    pub stack: Option<Option<String>>,
}

/// Maps a raw status code to an HTTP status, falling back to 500
pub(crate) fn http_status(status_code: u16) -> StatusCode {
    StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (http_status(self.status_code), Json(self)).into_response()
    }
}

/// Renders without a stack; the error itself rides along in the response
/// extensions so the error layer can log it and re-render it.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = self.to_response(false).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

fn from_rejection(status: StatusCode, body_text: String) -> ApiError {
    ApiError::new(status.as_u16()).with_message(body_text)
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        from_rejection(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        from_rejection(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        from_rejection(rejection.status(), rejection.body_text())
    }
}
