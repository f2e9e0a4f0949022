//! Error types for sqlgate
//!
//! Failures are classified structurally so the gateway can triage them
//! without parsing driver text:
//! - Connect failures (refused, malformed descriptor, generic)
//! - Query failures (statement or execution errors)
//! - Scan failures (row decoding hit an unsupported kind)

use std::fmt;
use thiserror::Error;

/// Result type for sqlgate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Could not establish or re-establish a backend connection
    Connection,
    /// The target host actively refused the connection
    ConnectionRefused,
    /// The descriptor is missing required fields or cannot be parsed
    Descriptor,
    /// Statement or execution error on a valid connection
    Query,
    /// Row decoding failed
    Scan,
    /// Operation not supported by the backend
    Unsupported,
    /// Invalid gateway configuration
    Configuration,
}

impl ErrorCategory {
    /// Whether errors in this category may succeed on a fresh connection
    #[inline]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Connection | Self::ConnectionRefused)
    }

    /// Whether the failure happened before a connection was usable
    #[inline]
    pub const fn is_connect_failure(self) -> bool {
        matches!(
            self,
            Self::Connection | Self::ConnectionRefused | Self::Descriptor
        )
    }
}

/// Main error type for sqlgate
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    /// Connection could not be opened, or a live connection broke
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Host reachable but refused the connection
    #[error("connection refused: {message}")]
    ConnectionRefused { message: String },

    /// Descriptor missing required fields or unparseable
    #[error("malformed descriptor: {message}")]
    MalformedDescriptor { message: String },

    /// Query execution failed
    #[error("query error: {message}")]
    Query {
        message: String,
        sql: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A driver value could not be converted into a generic value
    #[error("scan error: {message}")]
    Scan { message: String },

    /// Unsupported operation for this backend
    #[error("unsupported: {message}")]
    Unsupported { message: String },

    /// Configuration error
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection { .. } => ErrorCategory::Connection,
            Self::ConnectionRefused { .. } => ErrorCategory::ConnectionRefused,
            Self::MalformedDescriptor { .. } => ErrorCategory::Descriptor,
            Self::Query { .. } => ErrorCategory::Query,
            Self::Scan { .. } => ErrorCategory::Scan,
            Self::Unsupported { .. } => ErrorCategory::Unsupported,
            Self::Configuration { .. } => ErrorCategory::Configuration,
        }
    }

    /// Whether this error is retriable
    #[inline]
    pub fn is_retriable(&self) -> bool {
        self.category().is_retriable()
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection-refused error
    pub fn refused(message: impl Into<String>) -> Self {
        Self::ConnectionRefused {
            message: message.into(),
        }
    }

    /// Create a malformed-descriptor error
    pub fn descriptor(message: impl Into<String>) -> Self {
        Self::MalformedDescriptor {
            message: message.into(),
        }
    }

    /// Create a query error
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: None,
            source: None,
        }
    }

    /// Create a query error with SQL
    pub fn query_with_sql(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: Some(sql.into()),
            source: None,
        }
    }

    /// Create a scan error
    pub fn scan(message: impl Into<String>) -> Self {
        Self::Scan {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Map an I/O failure from a connect attempt onto the taxonomy.
    ///
    /// `ConnectionRefused` is reported structurally; everything else stays a
    /// generic connection error carrying the source.
    pub fn from_connect_io(context: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::ConnectionRefused {
            Self::refused(format!("{context}: {err}"))
        } else {
            Self::connection_with_source(context.to_string(), err)
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::ConnectionRefused => write!(f, "connection_refused"),
            Self::Descriptor => write!(f, "descriptor"),
            Self::Query => write!(f, "query"),
            Self::Scan => write!(f, "scan"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}
