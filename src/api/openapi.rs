use utoipa::OpenApi;

use crate::api::handlers::{EmailData, EmailRequest, ErrorKindInfo, RaiseParams};
use crate::errors::{ErrorKind, ErrorResponse};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "API Error Service",
        version = "0.1.0",
        description = "Standardized error responses for HTTP services. Every failure is reported with the same body: success flag, status code, message, detail list and timestamp, plus the stack trace in development mode.",
        contact(
            name = "API Error Service",
        )
    ),
    paths(
        crate::api::handlers::health,
        crate::api::handlers::list_error_kinds,
        crate::api::handlers::raise_error,
        crate::api::handlers::raise_status,
        crate::api::handlers::validate_email,
    ),
    components(
        schemas(
            ErrorResponse,
            ErrorKind,
            ErrorKindInfo,
            EmailRequest,
            EmailData,
            RaiseParams,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "errors", description = "Error catalogue and error raising endpoints"),
        (name = "validation", description = "Input validation endpoints"),
    )
)]
pub struct ApiDoc;
