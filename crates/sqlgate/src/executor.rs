//! Query execution over cached connections.
//!
//! One call acquires a connection, binds parameters, runs the statement and
//! marshals the rows. Row iteration is lenient: a row that fails to fetch or
//! decode stops iteration and the rows gathered so far are returned with the
//! table marked partial.

use std::sync::Arc;
use tracing::debug;

use crate::cache::ConnectionCache;
use crate::classify::log_failure;
use crate::connection::RowCursor;
use crate::error::Result;
use crate::marshal::scan_row;
use crate::params::{bind, ParamTable};
use crate::security::redact_descriptor;
use crate::types::ResultTable;

/// Runs queries against connections taken from a [`ConnectionCache`].
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    cache: Arc<ConnectionCache>,
}

impl QueryExecutor {
    /// Create an executor over `cache`
    pub fn new(cache: Arc<ConnectionCache>) -> Self {
        Self { cache }
    }

    /// The cache connections are taken from
    pub fn cache(&self) -> &Arc<ConnectionCache> {
        &self.cache
    }

    /// Execute `sql` on the connection for `descriptor`.
    ///
    /// Connect and execution failures are logged and returned. A statement
    /// with no result columns yields an empty table. Fetch and scan failures
    /// during iteration are logged and truncate the table instead of failing
    /// the call.
    pub async fn run(
        &self,
        descriptor: &str,
        sql: &str,
        params: Option<&ParamTable>,
    ) -> Result<ResultTable> {
        let acquired = match self.cache.acquire(descriptor).await {
            Ok(acquired) => acquired,
            Err(e) => {
                log_failure(descriptor, sql, &e);
                return Err(e);
            }
        };

        let args = params.map(bind).unwrap_or_default();
        debug!(
            descriptor = %redact_descriptor(descriptor),
            args = args.len(),
            fresh = acquired.is_fresh(),
            "executing query"
        );

        let outcome = match acquired.connection().query(sql, &args).await {
            Ok(Some(cursor)) => Ok(collect_rows(descriptor, sql, cursor).await),
            Ok(None) => Ok(ResultTable::new()),
            Err(e) => {
                log_failure(descriptor, sql, &e);
                Err(e)
            }
        };

        self.cache.release(acquired).await;
        outcome
    }
}

/// Drain `cursor` into a table, stopping at the first bad row
async fn collect_rows(descriptor: &str, sql: &str, mut cursor: Box<dyn RowCursor>) -> ResultTable {
    let columns: Arc<[String]> = cursor.columns().into();
    let mut table = ResultTable::new();

    loop {
        let values = match cursor.next().await {
            Ok(Some(values)) => values,
            Ok(None) => break,
            Err(e) => {
                log_failure(descriptor, sql, &e);
                table.mark_partial();
                break;
            }
        };

        match scan_row(&columns, values) {
            Ok(row) => table.push(row),
            Err(e) => {
                log_failure(descriptor, sql, &e);
                table.mark_partial();
                break;
            }
        }
    }

    debug!(rows = table.len(), partial = table.is_partial(), "query complete");
    table
}
