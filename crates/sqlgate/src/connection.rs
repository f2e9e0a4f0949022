//! Connection traits for sqlgate
//!
//! The gateway is written against these abstractions only:
//! - Connection: liveness probe, query submission, close
//! - RowCursor: row-by-row iteration over a result set
//! - ConnectionFactory: opens a connection from a descriptor

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;
use crate::params::BoundArgs;
use crate::types::DriverValue;

/// A live backend connection.
///
/// A cached connection is shared by every caller using the same descriptor,
/// so implementations must accept concurrent calls. Backends whose client
/// cannot multiplex serialize access internally.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Lightweight round trip used to validate a cached connection
    async fn ping(&self) -> Result<()>;

    /// Execute a statement with text arguments.
    ///
    /// Returns `Ok(None)` when the statement produces no result columns.
    async fn query(&self, sql: &str, args: &BoundArgs) -> Result<Option<Box<dyn RowCursor>>>;

    /// Close the connection. Closing twice is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Iterator over the rows of one result set
pub trait RowCursor: Send {
    /// Result column names, in result order
    fn columns(&self) -> &[String];

    /// Fetch the next row of driver values; `Ok(None)` at the end
    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Vec<DriverValue>>>> + Send + '_>>;
}

/// Cursor over rows that were already fetched.
///
/// Each row carries its own decode outcome so a single bad row surfaces at
/// the point of iteration where it occurs.
pub struct VecCursor {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Result<Vec<DriverValue>>>,
}

impl VecCursor {
    /// Create a cursor from decoded rows
    pub fn new(columns: Vec<String>, rows: Vec<Result<Vec<DriverValue>>>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
        }
    }

    /// Create a cursor where every row decoded successfully
    pub fn from_values(columns: Vec<String>, rows: Vec<Vec<DriverValue>>) -> Self {
        Self::new(columns, rows.into_iter().map(Ok).collect())
    }
}

impl RowCursor for VecCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Vec<DriverValue>>>> + Send + '_>> {
        Box::pin(async move { self.rows.next().transpose() })
    }
}

/// Factory for creating connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a new connection to the target named by `descriptor`
    async fn connect(&self, descriptor: &str) -> Result<Arc<dyn Connection>>;

    /// Get the database type
    fn database_type(&self) -> DatabaseType;
}

/// Database type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// PostgreSQL
    #[default]
    #[serde(alias = "postgresql", alias = "pg")]
    Postgres,
    /// SQL Server
    #[serde(alias = "mssql")]
    SqlServer,
    /// Unknown/custom
    Unknown,
}

impl DatabaseType {
    /// Query run when the caller supplies none
    pub const fn default_query(self) -> &'static str {
        match self {
            Self::Postgres => "SELECT version()",
            Self::SqlServer => "SELECT @@VERSION",
            Self::Unknown => "SELECT 1",
        }
    }

    /// Descriptor used when the caller supplies none
    pub const fn default_descriptor(self) -> &'static str {
        match self {
            Self::Postgres => "host=localhost port=5432 user=postgres dbname=test sslmode=disable",
            Self::SqlServer => "server=localhost;user=sa;password=Password123,port=1433",
            Self::Unknown => "",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres => write!(f, "PostgreSQL"),
            Self::SqlServer => write!(f, "SQL Server"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}
