//! Structured error handling for API responses

pub mod api_error;
pub mod codes;
pub mod response;
pub mod sink;

pub use api_error::{ApiError, DEFAULT_MESSAGE};
pub use codes::ErrorKind;
pub use response::ErrorResponse;
pub use sink::{DiagnosticSink, LogRecord, Severity, TracingSink};
