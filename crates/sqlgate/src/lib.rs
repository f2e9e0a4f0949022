//! # sqlgate
//!
//! Pooled query gateway: run a query against a backend named by a connection
//! descriptor and get the result back as a generic table.
//!
//! ## Features
//!
//! - **Connection Cache**: one reusable connection per descriptor, probed
//!   before reuse and transparently replaced when stale
//! - **Generic Values**: backend scalars collapse into nil / number / string /
//!   boolean, rows into ordered column maps
//! - **Parameter Binding**: numeric keys bind positionally, string keys by name,
//!   every value as text
//! - **Lenient Iteration**: a bad row truncates the result instead of failing it
//! - **Failure Triage**: errors are classified for logging, with credentials
//!   redacted from every descriptor that reaches a log line
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sqlgate::prelude::*;
//! use sqlgate::postgres::PgConnectionFactory;
//!
//! let gateway = Gateway::new(GatewayConfig::default(), Arc::new(PgConnectionFactory));
//!
//! // Default query against the default descriptor
//! let version = gateway.query(None, None, None).await;
//!
//! // Positional parameters
//! let params = ParamTable::new().with(1, "alice");
//! let rows = gateway
//!     .run(Some("SELECT id FROM users WHERE name = $1"), Some("host=db user=app"), Some(&params))
//!     .await?;
//! for row in &rows {
//!     println!("{:?}", row.get_by_name("id"));
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `postgres` - PostgreSQL support via tokio-postgres
//! - `sqlserver` - SQL Server support via tiberius
//! - `full` - All backends

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod cache;
pub mod classify;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod marshal;
pub mod params;
pub mod security;
pub mod types;

// Backend implementations (conditionally compiled)
#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlserver")]
pub mod sqlserver;

/// Prelude module for convenient imports
pub mod prelude {
    // Error types
    pub use crate::error::{Error, ErrorCategory, Result};

    // Values, rows and tables
    pub use crate::types::{DriverValue, GenericValue, ResultTable, Row};

    // Connection traits
    pub use crate::connection::{
        Connection, ConnectionFactory, DatabaseType, RowCursor, VecCursor,
    };

    // Cache and execution
    pub use crate::cache::{Acquired, CacheStats, ConnectionCache};
    pub use crate::classify::{classify, FailureClass};
    pub use crate::executor::QueryExecutor;
    pub use crate::marshal::{scan, scan_row};
    pub use crate::params::{bind, Argument, BoundArgs, ParamTable};

    // Boundary
    pub use crate::config::GatewayConfig;
    pub use crate::gateway::Gateway;

    pub use std::sync::Arc;
}

// Re-export commonly used items at crate root
pub use config::GatewayConfig;
pub use error::{Error, Result};
pub use gateway::Gateway;
pub use params::ParamTable;
pub use types::{GenericValue, ResultTable, Row};
