//! The gateway boundary.
//!
//! [`Gateway::query`] is the caller-facing operation: every argument is
//! optional, missing ones fall back to the configured defaults, and failures
//! come back as `None` after being logged. [`Gateway::run`] is the same call
//! with the error kept.
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlgate::prelude::*;
//! use sqlgate::postgres::PgConnectionFactory;
//!
//! let gateway = Gateway::new(GatewayConfig::default(), Arc::new(PgConnectionFactory));
//!
//! let params = ParamTable::new().with(1, 42);
//! if let Some(table) = gateway.query(Some("SELECT $1::int AS n"), None, Some(&params)).await {
//!     println!("{}", serde_json::to_string(&table)?);
//! }
//! ```

use std::sync::Arc;
use tracing::warn;

use crate::cache::{CacheStats, ConnectionCache};
use crate::config::GatewayConfig;
use crate::connection::ConnectionFactory;
use crate::error::Result;
use crate::executor::QueryExecutor;
use crate::params::ParamTable;
use crate::types::ResultTable;

/// Query gateway over one backend
#[derive(Debug, Clone)]
pub struct Gateway {
    config: GatewayConfig,
    executor: QueryExecutor,
}

impl Gateway {
    /// Create a gateway with its own connection cache
    pub fn new(config: GatewayConfig, factory: Arc<dyn ConnectionFactory>) -> Self {
        let cache = ConnectionCache::new(factory).with_probe_on_reuse(config.probe_on_reuse);
        Self::with_cache(config, Arc::new(cache))
    }

    /// Create a gateway over an existing cache
    pub fn with_cache(config: GatewayConfig, cache: Arc<ConnectionCache>) -> Self {
        if cache.database_type() != config.database_type {
            warn!(
                configured = %config.database_type,
                factory = %cache.database_type(),
                "gateway config and connection factory disagree on database type"
            );
        }
        Self {
            config,
            executor: QueryExecutor::new(cache),
        }
    }

    /// Run a query, logging and swallowing any failure.
    ///
    /// `None` or empty `query` runs the default query; `None` `descriptor`
    /// targets the default descriptor. Returns `None` on failure and
    /// `Some` (possibly empty or partial) on success.
    pub async fn query(
        &self,
        query: Option<&str>,
        descriptor: Option<&str>,
        params: Option<&ParamTable>,
    ) -> Option<ResultTable> {
        self.run(query, descriptor, params).await.ok()
    }

    /// Run a query, returning the failure instead of swallowing it
    pub async fn run(
        &self,
        query: Option<&str>,
        descriptor: Option<&str>,
        params: Option<&ParamTable>,
    ) -> Result<ResultTable> {
        let sql = query
            .filter(|q| !q.is_empty())
            .unwrap_or_else(|| self.config.query());
        let descriptor = descriptor.unwrap_or_else(|| self.config.descriptor());

        self.executor.run(descriptor, sql, params).await
    }

    /// Gateway configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The connection cache
    pub fn cache(&self) -> &Arc<ConnectionCache> {
        self.executor.cache()
    }

    /// Cache statistics
    pub fn stats(&self) -> CacheStats {
        self.cache().stats()
    }

    /// Close every cached connection
    pub async fn close_all(&self) {
        self.cache().close_all().await;
    }
}
