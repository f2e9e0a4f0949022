//! Failure triage for logging.
//!
//! Classification decides how much context a failure is logged with. It never
//! changes control flow or what the caller receives.
//!
//! Structured error categories reported by the backends are authoritative.
//! Errors that only carry driver text fall back to substring heuristics,
//! which are best-effort.

use std::fmt;
use tracing::{error, info};

use crate::error::{Error, ErrorCategory};
use crate::security::redact_descriptor;

/// Failure classes, by diagnostic treatment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Host reachable but refused the connection
    ConnectionRefused,
    /// Descriptor missing required fields or unparseable
    MalformedDescriptor,
    /// Any other failure to establish a connection
    Connect,
    /// Statement or execution failure on a valid connection
    Query,
    /// Row decoding failure
    Scan,
}

impl FailureClass {
    /// Label attached to log records
    pub const fn label(self) -> &'static str {
        match self {
            Self::ConnectionRefused => "connectivity",
            Self::MalformedDescriptor => "malformed_descriptor",
            Self::Connect => "connect",
            Self::Query => "query",
            Self::Scan => "scan",
        }
    }

    /// Whether the descriptor is logged alongside the error
    pub const fn logs_descriptor(self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused | Self::MalformedDescriptor | Self::Connect
        )
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify an error.
pub fn classify(err: &Error) -> FailureClass {
    match err.category() {
        ErrorCategory::ConnectionRefused => FailureClass::ConnectionRefused,
        ErrorCategory::Descriptor => FailureClass::MalformedDescriptor,
        ErrorCategory::Scan => FailureClass::Scan,
        category => classify_text(&error_chain(err)).unwrap_or(if category.is_connect_failure() {
            FailureClass::Connect
        } else {
            FailureClass::Query
        }),
    }
}

/// Substring heuristics over driver text.
///
/// Recognizes "connection refused" and libpq's "missing ... in connection
/// info string". Returns `None` when neither pattern matches.
pub fn classify_text(message: &str) -> Option<FailureClass> {
    let lower = message.to_ascii_lowercase();
    if lower.contains("connection refused") {
        Some(FailureClass::ConnectionRefused)
    } else if lower.contains("missing") && lower.contains("in connection info") {
        Some(FailureClass::MalformedDescriptor)
    } else {
        None
    }
}

/// Error message followed by every source in its chain
fn error_chain(err: &Error) -> String {
    let mut text = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Classify `err` and log it with the context its class calls for.
///
/// Descriptors are redacted before logging. Returns the class.
pub fn log_failure(descriptor: &str, query: &str, err: &Error) -> FailureClass {
    let class = classify(err);

    if class.logs_descriptor() {
        info!(
            descriptor = %redact_descriptor(descriptor),
            query,
            class = %class,
            "connection descriptor and query"
        );
    } else if class == FailureClass::Query {
        info!(query, class = %class, "query");
    }

    match class {
        FailureClass::ConnectionRefused => {
            error!(class = %class, error = %err, "could not connect to database")
        }
        FailureClass::MalformedDescriptor => {
            error!(class = %class, error = %err, "malformed connection descriptor")
        }
        FailureClass::Connect => {
            error!(class = %class, error = %err, "could not connect to database")
        }
        FailureClass::Query => error!(class = %class, error = %err, "query failed"),
        FailureClass::Scan => error!(class = %class, error = %err, "failed to scan row"),
    }

    class
}
