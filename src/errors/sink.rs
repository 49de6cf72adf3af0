//! Leveled diagnostic output for [`ApiError`](super::ApiError).

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{error, info, warn};

/// Log level an error is routed to, derived from its status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    /// `>= 500` is a server error, `400..500` a client error, anything else informational
    pub fn for_status(status_code: u16) -> Self {
        if status_code >= 500 {
            Self::Error
        } else if status_code >= 400 {
            Self::Warning
        } else {
            Self::Info
        }
    }

    /// Human-scannable prefix printed ahead of the record
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Error => "🚨 SERVER ERROR",
            Self::Warning => "⚠️ CLIENT ERROR",
            Self::Info => "ℹ️ INFO",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured record written by [`ApiError::log`](super::ApiError::log)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord<'a> {
    pub status_code: u16,
    pub message: &'a str,
    pub errors: &'a [Value],
    pub stack: Option<&'a str>,
    pub timestamp: &'a str,
}

/// Destination for leveled error records.
///
/// Implementations must not panic; logging is a terminal side effect.
pub trait DiagnosticSink {
    fn error(&self, record: &LogRecord<'_>);
    fn warn(&self, record: &LogRecord<'_>);
    fn info(&self, record: &LogRecord<'_>);

    fn emit(&self, severity: Severity, record: &LogRecord<'_>) {
        match severity {
            Severity::Error => self.error(record),
            Severity::Warning => self.warn(record),
            Severity::Info => self.info(record),
        }
    }
}

/// Default sink: `tracing` events on the console subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

fn errors_field(errors: &[Value]) -> String {
    serde_json::to_string(errors).unwrap_or_else(|_| "[]".to_string())
}

impl DiagnosticSink for TracingSink {
    fn error(&self, record: &LogRecord<'_>) {
        error!(
            status_code = record.status_code,
            message = %record.message,
            errors = %errors_field(record.errors),
            stack = record.stack.unwrap_or(""),
            timestamp = %record.timestamp,
            "{}",
            Severity::Error.marker()
        );
    }

    fn warn(&self, record: &LogRecord<'_>) {
        warn!(
            status_code = record.status_code,
            message = %record.message,
            errors = %errors_field(record.errors),
            stack = record.stack.unwrap_or(""),
            timestamp = %record.timestamp,
            "{}",
            Severity::Warning.marker()
        );
    }

    fn info(&self, record: &LogRecord<'_>) {
        info!(
            status_code = record.status_code,
            message = %record.message,
            errors = %errors_field(record.errors),
            stack = record.stack.unwrap_or(""),
            timestamp = %record.timestamp,
            "{}",
            Severity::Info.marker()
        );
    }
}
