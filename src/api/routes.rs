use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    health, list_error_kinds, openapi_json, raise_error, raise_status, route_not_found,
    trigger_panic, validate_email, AppState,
};
use super::middleware::{handle_api_errors, handle_panic, logging_middleware};
use crate::metrics;

pub fn create_router(state: AppState) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let error_config = state.error_config;

    let mut router = Router::new()
        // Health check
        .route("/health", get(health))
        // Metrics endpoint (Prometheus)
        .route("/metrics", get(metrics::metrics_handler))
        // OpenAPI documentation
        .route("/api-docs/openapi.json", get(openapi_json))
        // Error endpoints
        .route("/errors", get(list_error_kinds))
        .route("/errors/status/:code", get(raise_status))
        .route("/errors/:kind", get(raise_error))
        // Validation
        .route("/validate/email", post(validate_email));

    // Deliberate panic route, development mode only
    if error_config.include_stack {
        router = router.route("/errors/panic", get(trigger_panic));
    }

    router
        .route_layer(middleware::from_fn(metrics::middleware::track_metrics))
        .fallback(route_not_found)
        // Order matters: panics become errors before the error layer renders them,
        // and logging sees the final status.
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn_with_state(error_config, handle_api_errors))
        .layer(middleware::from_fn(logging_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
