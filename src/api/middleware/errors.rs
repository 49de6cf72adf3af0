use axum::{
    body::HttpBody,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::any::Any;
use tracing::error;

use crate::config::ErrorConfig;
use crate::errors::ApiError;
use crate::metrics::API_ERRORS_TOTAL;

/// Centralized error handling.
///
/// Every response carrying an [`ApiError`] (see its `IntoResponse`) is logged,
/// counted and re-rendered with the configured stack visibility. Empty 404 and
/// 405 responses produced by the router itself are turned into the matching
/// named errors so clients always get the same body shape.
pub async fn handle_api_errors(
    State(config): State<ErrorConfig>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;

    let api_error = match response.extensions_mut().remove::<ApiError>() {
        Some(api_error) => api_error,
        None => match framework_error(&response) {
            Some(api_error) => api_error,
            None => return response,
        },
    };

    api_error.log();
    API_ERRORS_TOTAL
        .with_label_values(&[
            &api_error.status_code().to_string(),
            api_error.severity().as_str(),
        ])
        .inc();

    // Keep the status and every header the handler set; only the body changes
    let (mut parts, _) = response.into_parts();
    let (rendered, body) = Json(api_error.to_response(config.include_stack))
        .into_response()
        .into_parts();

    parts.headers.remove(header::CONTENT_LENGTH);
    if let Some(content_type) = rendered.headers.get(header::CONTENT_TYPE) {
        parts.headers.insert(header::CONTENT_TYPE, content_type.clone());
    }

    Response::from_parts(parts, body)
}

fn framework_error(response: &Response) -> Option<ApiError> {
    if response.body().size_hint().exact() != Some(0) {
        return None;
    }

    match response.status() {
        StatusCode::NOT_FOUND => Some(ApiError::not_found()),
        StatusCode::METHOD_NOT_ALLOWED => Some(ApiError::method_not_allowed()),
        _ => None,
    }
}

/// Panic handler for `CatchPanicLayer`; the error layer above logs the result
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    error!(panic = %detail, "Handler panicked");

    ApiError::internal_server().into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::header::RETRY_AFTER, middleware, routing::get, Router};
    use serde_json::Value;
    use tower::ServiceExt;

    fn error_layer_app(include_stack: bool) -> Router {
        Router::new()
            .route(
                "/limited",
                get(|| async { ([(RETRY_AFTER, "30")], ApiError::too_many_requests()) }),
            )
            .route("/plain", get(|| async { ApiError::unauthorized() }))
            .layer(middleware::from_fn_with_state(
                ErrorConfig { include_stack },
                handle_api_errors,
            ))
    }

    async fn call(app: Router, uri: &str) -> (Response, Value) {
        let request = axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        (Response::from_parts(parts, Body::empty()), json)
    }

    #[tokio::test]
    async fn test_error_layer_keeps_handler_headers() {
        let (response, body) = call(error_layer_app(false), "/limited").await;

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "30");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body["statusCode"], 429);
        assert_eq!(body["message"], "Too Many Requests");
        assert!(body.get("stack").is_none());
    }

    #[tokio::test]
    async fn test_error_layer_renders_stack_when_enabled() {
        let (response, body) = call(error_layer_app(true), "/plain").await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body["stack"].is_string());
        assert!(response.extensions().get::<ApiError>().is_none());
    }

    #[test]
    fn test_framework_error_for_empty_404() {
        let response = StatusCode::NOT_FOUND.into_response();
        let api_error = framework_error(&response).unwrap();
        assert_eq!(api_error.status_code(), 404);
        assert_eq!(api_error.message(), "Not Found");
    }

    #[test]
    fn test_framework_error_for_empty_405() {
        let response = StatusCode::METHOD_NOT_ALLOWED.into_response();
        let api_error = framework_error(&response).unwrap();
        assert_eq!(api_error.status_code(), 405);
    }

    #[test]
    fn test_framework_error_ignores_bodies_and_other_statuses() {
        let response = (StatusCode::NOT_FOUND, "custom body").into_response();
        assert!(framework_error(&response).is_none());

        let response = StatusCode::OK.into_response();
        assert!(framework_error(&response).is_none());
    }

    #[test]
    fn test_handle_panic_renders_internal_server_error() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<ApiError>().is_some());
    }
}
