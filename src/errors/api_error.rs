use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::backtrace::{Backtrace, BacktraceStatus};

use super::codes::ErrorKind;
use super::response::ErrorResponse;
use super::sink::{DiagnosticSink, LogRecord, Severity, TracingSink};

/// Message used by [`ApiError::new`] when none is given
pub const DEFAULT_MESSAGE: &str = "Something went wrong";

/// A failed operation to be reported to the client and/or logged.
///
/// The status code is carried verbatim and never validated. The timestamp
/// is taken once at construction; none of the `with_*` overrides touch it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    status_code: u16,
    message: String,
    errors: Vec<Value>,
    timestamp: String,
    stack: Option<String>,
}

impl ApiError {
    /// Error with the generic message, no details, and a captured stack
    pub fn new(status_code: u16) -> Self {
        Self::from_parts(status_code, DEFAULT_MESSAGE, Vec::new(), None)
    }

    /// Full constructor. A non-empty `stack` is stored as-is, otherwise one
    /// is captured here.
    pub fn from_parts(
        status_code: u16,
        message: impl Into<String>,
        errors: Vec<Value>,
        stack: Option<String>,
    ) -> Self {
        let stack = match stack {
            Some(stack) if !stack.is_empty() => Some(stack),
            _ => capture_stack(),
        };

        Self {
            status_code,
            message: message.into(),
            errors,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            stack,
        }
    }

    pub fn from_kind(kind: ErrorKind) -> Self {
        Self::from_parts(kind.status_code(), kind.default_message(), Vec::new(), None)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_errors(mut self, errors: impl IntoIterator<Item = Value>) -> Self {
        self.errors = errors.into_iter().collect();
        self
    }

    /// Append a single detail
    pub fn with_error(mut self, error: Value) -> Self {
        self.errors.push(error);
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn errors(&self) -> &[Value] {
        &self.errors
    }

    /// Always false
    pub fn success(&self) -> bool {
        false
    }

    /// Always null; mirrors the `data` slot of success responses
    pub fn data(&self) -> Value {
        Value::Null
    }

    /// ISO-8601 UTC instant, millisecond precision
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    /// The named kind matching this status code, if any
    pub fn kind(&self) -> Option<ErrorKind> {
        ErrorKind::from_status_code(self.status_code)
    }

    pub fn severity(&self) -> Severity {
        Severity::for_status(self.status_code)
    }

    /// Client-facing body. `include_stack` is the development-mode switch.
    pub fn to_response(&self, include_stack: bool) -> ErrorResponse {
        ErrorResponse {
            success: false,
            status_code: self.status_code,
            message: self.message.clone(),
            errors: self.errors.clone(),
            timestamp: self.timestamp.clone(),
            stack: include_stack.then(|| self.stack.clone()),
        }
    }

    /// Same shape as [`to_response`](Self::to_response), as a JSON object
    pub fn to_json(&self, include_stack: bool) -> Value {
        let mut body = json!({
            "success": false,
            "statusCode": self.status_code,
            "message": self.message,
            "errors": self.errors,
            "timestamp": self.timestamp,
        });
        if include_stack {
            body["stack"] = json!(self.stack);
        }
        body
    }

    pub fn log_record(&self) -> LogRecord<'_> {
        LogRecord {
            status_code: self.status_code,
            message: &self.message,
            errors: &self.errors,
            stack: self.stack.as_deref(),
            timestamp: &self.timestamp,
        }
    }

    /// Write this error to the console through `tracing`
    pub fn log(&self) {
        self.log_to(&TracingSink);
    }

    pub fn log_to(&self, sink: &dyn DiagnosticSink) {
        sink.emit(self.severity(), &self.log_record());
    }
}

/// Named constructors for common statuses
impl ApiError {
    pub fn bad_request() -> Self {
        Self::from_kind(ErrorKind::BadRequest)
    }

    pub fn unauthorized() -> Self {
        Self::from_kind(ErrorKind::Unauthorized)
    }

    pub fn forbidden() -> Self {
        Self::from_kind(ErrorKind::Forbidden)
    }

    pub fn not_found() -> Self {
        Self::from_kind(ErrorKind::NotFound)
    }

    pub fn method_not_allowed() -> Self {
        Self::from_kind(ErrorKind::MethodNotAllowed)
    }

    pub fn conflict() -> Self {
        Self::from_kind(ErrorKind::Conflict)
    }

    pub fn unprocessable_entity() -> Self {
        Self::from_kind(ErrorKind::UnprocessableEntity)
    }

    pub fn too_many_requests() -> Self {
        Self::from_kind(ErrorKind::TooManyRequests)
    }

    pub fn internal_server() -> Self {
        Self::from_kind(ErrorKind::InternalServer)
    }

    pub fn not_implemented() -> Self {
        Self::from_kind(ErrorKind::NotImplemented)
    }

    pub fn bad_gateway() -> Self {
        Self::from_kind(ErrorKind::BadGateway)
    }

    pub fn service_unavailable() -> Self {
        Self::from_kind(ErrorKind::ServiceUnavailable)
    }

    pub fn gateway_timeout() -> Self {
        Self::from_kind(ErrorKind::GatewayTimeout)
    }
}

impl From<ErrorKind> for ApiError {
    fn from(kind: ErrorKind) -> Self {
        Self::from_kind(kind)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal_server().with_message(err.to_string())
    }
}

fn capture_stack() -> Option<String> {
    let backtrace = Backtrace::force_capture();
    match backtrace.status() {
        BacktraceStatus::Captured => Some(trim_stack(&backtrace.to_string())),
        _ => None,
    }
}

/// Frame symbols that belong to constructing the error, not to its caller
fn is_own_frame(symbol: &str) -> bool {
    let symbol = symbol.trim_start_matches('<');
    let module = module_path!();

    symbol.starts_with("std::backtrace")
        || symbol.strip_prefix(module).is_some_and(|rest| {
            rest.starts_with("::capture_stack") || rest.starts_with("::ApiError")
        })
}

/// Drops the leading frames of a rendered backtrace that are inside this
/// module, so the trace starts where the error was raised. Frames are
/// renumbered from zero.
fn trim_stack(raw: &str) -> String {
    // (symbol, has index, source location lines)
    let mut entries: Vec<(&str, bool, Vec<&str>)> = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with("at ") {
            if let Some((_, _, locations)) = entries.last_mut() {
                locations.push(line);
            }
            continue;
        }

        match trimmed.split_once(": ") {
            Some((index, symbol))
                if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) =>
            {
                entries.push((symbol, true, Vec::new()))
            }
            _ => entries.push((trimmed, false, Vec::new())),
        }
    }

    let skip = entries
        .iter()
        .take_while(|(symbol, _, _)| is_own_frame(symbol))
        .count();
    if skip == 0 || skip == entries.len() {
        return raw.to_string();
    }

    let mut out = String::new();
    let mut index = 0;
    for (position, (symbol, indexed, locations)) in entries.iter().skip(skip).enumerate() {
        if *indexed || position == 0 {
            out.push_str(&format!("{:>4}: {}\n", index, symbol));
            index += 1;
        } else {
            out.push_str(&format!("      {}\n", symbol));
        }
        for location in locations {
            out.push_str(location);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSink {
        calls: RefCell<Vec<(Severity, u16, String)>>,
    }

    impl RecordingSink {
        fn push(&self, severity: Severity, record: &LogRecord<'_>) {
            self.calls
                .borrow_mut()
                .push((severity, record.status_code, record.timestamp.to_string()));
        }
    }

    impl DiagnosticSink for RecordingSink {
        fn error(&self, record: &LogRecord<'_>) {
            self.push(Severity::Error, record);
        }

        fn warn(&self, record: &LogRecord<'_>) {
            self.push(Severity::Warning, record);
        }

        fn info(&self, record: &LogRecord<'_>) {
            self.push(Severity::Info, record);
        }
    }

    fn json_keys(value: &Value) -> Vec<String> {
        let mut keys: Vec<String> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    #[test]
    fn test_new_uses_generic_defaults() {
        let err = ApiError::new(418);
        assert_eq!(err.status_code(), 418);
        assert_eq!(err.message(), "Something went wrong");
        assert!(err.errors().is_empty());
        assert!(!err.success());
        assert!(err.data().is_null());
    }

    #[test]
    fn test_status_code_is_not_validated() {
        for status in [0, 99, 200, 999, u16::MAX] {
            let err = ApiError::new(status);
            assert_eq!(err.status_code(), status);
            assert!(!err.success());
        }
    }

    #[test]
    fn test_explicit_stack_is_kept_verbatim() {
        let err = ApiError::from_parts(500, "boom", vec![], Some("at handler (app.rs:1)".into()));
        assert_eq!(err.stack(), Some("at handler (app.rs:1)"));
    }

    #[test]
    fn test_empty_stack_falls_back_to_capture() {
        let err = ApiError::from_parts(500, "boom", vec![], Some(String::new()));
        assert_ne!(err.stack(), Some(""));
    }

    #[test]
    fn test_trim_stack_drops_constructor_frames() {
        let raw = "   0: api_error::errors::api_error::capture_stack
             at ./src/errors/api_error.rs:230:21
   1: api_error::errors::api_error::ApiError::from_parts
             at ./src/errors/api_error.rs:42:18
   2: <api_error::errors::api_error::ApiError as core::convert::From<anyhow::Error>>::from
             at ./src/errors/api_error.rs:222:9
   3: billing::handlers::charge
             at ./src/handlers.rs:10:5
   4: core::ops::function::FnOnce::call_once
";
        let trimmed = trim_stack(raw);
        assert_eq!(
            trimmed,
            "   0: billing::handlers::charge
             at ./src/handlers.rs:10:5
   1: core::ops::function::FnOnce::call_once
"
        );
    }

    #[test]
    fn test_trim_stack_keeps_callers_in_same_module() {
        let raw = "   0: api_error::errors::api_error::ApiError::new
   1: api_error::errors::api_error::tests::raises
   2: std::rt::lang_start
";
        let trimmed = trim_stack(raw);
        assert!(trimmed.starts_with("   0: api_error::errors::api_error::tests::raises\n"));
        assert!(trimmed.contains("   1: std::rt::lang_start"));
    }

    #[test]
    fn test_trim_stack_leaves_foreign_traces_alone() {
        let raw = "   0: <unknown>\n   1: <unknown>\n";
        assert_eq!(trim_stack(raw), raw);
    }

    #[test]
    fn test_captured_stack_starts_at_caller() {
        let err = ApiError::not_found();
        let first = err.stack().unwrap().lines().next().unwrap();
        assert!(first.trim_start().starts_with("0: "));
        assert!(!first.contains("capture_stack"));
        assert!(!first.contains("from_parts"));
        assert!(!first.contains("ApiError::"));
        assert!(!first.contains("<unknown>"));
    }

    #[test]
    fn test_named_factory_defaults() {
        let cases: [(fn() -> ApiError, u16, &str); 13] = [
            (ApiError::bad_request, 400, "Bad Request"),
            (ApiError::unauthorized, 401, "Unauthorized"),
            (ApiError::forbidden, 403, "Forbidden"),
            (ApiError::not_found, 404, "Not Found"),
            (ApiError::method_not_allowed, 405, "Method Not Allowed"),
            (ApiError::conflict, 409, "Conflict"),
            (ApiError::unprocessable_entity, 422, "Unprocessable Entity"),
            (ApiError::too_many_requests, 429, "Too Many Requests"),
            (ApiError::internal_server, 500, "Internal Server Error"),
            (ApiError::not_implemented, 501, "Not Implemented"),
            (ApiError::bad_gateway, 502, "Bad Gateway"),
            (ApiError::service_unavailable, 503, "Service Unavailable"),
            (ApiError::gateway_timeout, 504, "Gateway Timeout"),
        ];

        for (factory, status, message) in cases {
            let err = factory();
            assert_eq!(err.status_code(), status);
            assert_eq!(err.message(), message);
            assert!(err.errors().is_empty());
            assert!(!err.success());
        }
    }

    #[test]
    fn test_factory_override() {
        let err = ApiError::bad_request()
            .with_message("Invalid email")
            .with_errors([json!({"field": "email", "issue": "invalid format"})]);

        assert_eq!(err.status_code(), 400);
        assert_eq!(err.message(), "Invalid email");
        assert_eq!(
            err.errors(),
            &[json!({"field": "email", "issue": "invalid format"})]
        );
        assert!(!err.success());
    }

    #[test]
    fn test_direct_and_named_defaults_differ() {
        let direct = ApiError::new(404);
        let named = ApiError::not_found();
        assert_eq!(direct.status_code(), named.status_code());
        assert_eq!(direct.message(), "Something went wrong");
        assert_eq!(named.message(), "Not Found");
    }

    #[test]
    fn test_with_error_appends_in_order() {
        let err = ApiError::unprocessable_entity()
            .with_error(json!({"field": "name"}))
            .with_error(json!({"field": "age"}));
        assert_eq!(err.errors()[0]["field"], "name");
        assert_eq!(err.errors()[1]["field"], "age");
    }

    #[test]
    fn test_timestamp_format() {
        let err = ApiError::new(500);
        let parsed = chrono::DateTime::parse_from_rfc3339(err.timestamp()).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
        assert!(err.timestamp().ends_with('Z'));
        // YYYY-MM-DDTHH:MM:SS.mmmZ
        assert_eq!(err.timestamp().len(), 24);
    }

    #[test]
    fn test_timestamp_is_stable() {
        let err = ApiError::conflict();
        let before = err.timestamp().to_string();

        std::thread::sleep(std::time::Duration::from_millis(5));
        let first = err.to_json(false);
        err.log_to(&RecordingSink::default());
        let err = err.with_message("changed");
        let second = err.to_json(true);

        assert_eq!(first["timestamp"], before.as_str());
        assert_eq!(second["timestamp"], before.as_str());
        assert_eq!(err.timestamp(), before);
    }

    #[test]
    fn test_to_json_keys_without_stack() {
        let body = ApiError::internal_server().to_json(false);
        assert_eq!(
            json_keys(&body),
            vec!["errors", "message", "statusCode", "success", "timestamp"]
        );
        assert_eq!(body["success"], false);
        assert_eq!(body["statusCode"], 500);
    }

    #[test]
    fn test_to_json_keys_with_stack() {
        let body = ApiError::internal_server().to_json(true);
        assert_eq!(
            json_keys(&body),
            vec!["errors", "message", "stack", "statusCode", "success", "timestamp"]
        );
        let stack = body["stack"].as_str().unwrap();
        assert!(!stack.is_empty());
    }

    #[test]
    fn test_to_json_matches_typed_response() {
        let err = ApiError::bad_request().with_error(json!({"field": "email"}));
        for include_stack in [false, true] {
            let typed = serde_json::to_value(err.to_response(include_stack)).unwrap();
            assert_eq!(typed, err.to_json(include_stack));
        }
    }

    #[test]
    fn test_log_routing() {
        let sink = RecordingSink::default();
        for status in [500, 502, 503, 504, 400, 404, 429, 200] {
            ApiError::new(status).log_to(&sink);
        }

        let severities: Vec<(Severity, u16)> = sink
            .calls
            .borrow()
            .iter()
            .map(|(severity, status, _)| (*severity, *status))
            .collect();
        assert_eq!(
            severities,
            vec![
                (Severity::Error, 500),
                (Severity::Error, 502),
                (Severity::Error, 503),
                (Severity::Error, 504),
                (Severity::Warning, 400),
                (Severity::Warning, 404),
                (Severity::Warning, 429),
                (Severity::Info, 200),
            ]
        );
    }

    #[test]
    fn test_log_record_carries_attributes() {
        let err = ApiError::from_parts(503, "db down", vec![json!("pool")], Some("trace".into()));
        let record = err.log_record();
        assert_eq!(record.status_code, 503);
        assert_eq!(record.message, "db down");
        assert_eq!(record.errors, &[json!("pool")]);
        assert_eq!(record.stack, Some("trace"));
        assert_eq!(record.timestamp, err.timestamp());
        err.log();
    }

    #[test]
    fn test_display_is_message() {
        let err = ApiError::forbidden().with_message("no access to project");
        assert_eq!(err.to_string(), "no access to project");
    }

    #[test]
    fn test_from_anyhow() {
        let err: ApiError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.message(), "disk full");
    }

    #[test]
    fn test_kind_lookup() {
        assert_eq!(ApiError::gateway_timeout().kind(), Some(ErrorKind::GatewayTimeout));
        assert_eq!(ApiError::new(418).kind(), None);
        assert_eq!(ApiError::from(ErrorKind::Forbidden).status_code(), 403);
    }
}
