//! Gateway configuration
//!
//! Unset defaults fall back to the presets of the configured database type,
//! so a config that names only `database_type` is complete.

use serde::{Deserialize, Serialize};

use crate::connection::DatabaseType;
use crate::error::{Error, Result};
use crate::security::redact_descriptor;

/// Gateway configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Backend the gateway talks to
    pub database_type: DatabaseType,
    /// Query run when the caller supplies none (`None` = backend preset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_query: Option<String>,
    /// Descriptor used when the caller supplies none (`None` = backend preset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_descriptor: Option<String>,
    /// Whether cached connections are probed before reuse
    pub probe_on_reuse: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            database_type: DatabaseType::default(),
            default_query: None,
            default_descriptor: None,
            probe_on_reuse: true,
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("database_type", &self.database_type)
            .field("default_query", &self.query())
            .field("default_descriptor", &redact_descriptor(self.descriptor()))
            .field("probe_on_reuse", &self.probe_on_reuse)
            .finish()
    }
}

impl GatewayConfig {
    /// Presets for `database_type`
    pub fn for_database(database_type: DatabaseType) -> Self {
        Self {
            database_type,
            ..Default::default()
        }
    }

    /// Parse a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("invalid gateway config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the default query
    pub fn with_default_query(mut self, query: impl Into<String>) -> Self {
        self.default_query = Some(query.into());
        self
    }

    /// Set the default descriptor
    pub fn with_default_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.default_descriptor = Some(descriptor.into());
        self
    }

    /// Enable/disable the liveness probe on reuse
    pub fn with_probe_on_reuse(mut self, probe: bool) -> Self {
        self.probe_on_reuse = probe;
        self
    }

    /// Effective default query
    pub fn query(&self) -> &str {
        self.default_query
            .as_deref()
            .unwrap_or_else(|| self.database_type.default_query())
    }

    /// Effective default descriptor
    pub fn descriptor(&self) -> &str {
        self.default_descriptor
            .as_deref()
            .unwrap_or_else(|| self.database_type.default_descriptor())
    }

    /// Reject configurations that cannot serve a call without arguments
    pub fn validate(&self) -> Result<()> {
        if self.query().trim().is_empty() {
            return Err(Error::config("default query cannot be empty"));
        }
        if self.descriptor().trim().is_empty() {
            return Err(Error::config(format!(
                "no default descriptor for database type {}",
                self.database_type
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_database_type() {
        let pg = GatewayConfig::default();
        assert_eq!(pg.query(), "SELECT version()");
        assert!(pg.descriptor().starts_with("host=localhost"));
        assert!(pg.probe_on_reuse);

        let mssql = GatewayConfig::for_database(DatabaseType::SqlServer);
        assert_eq!(mssql.query(), "SELECT @@VERSION");
        assert!(mssql.descriptor().starts_with("server=localhost"));
    }

    #[test]
    fn test_builder_overrides() {
        let config = GatewayConfig::default()
            .with_default_query("SELECT 1")
            .with_default_descriptor("host=db user=app")
            .with_probe_on_reuse(false);

        assert_eq!(config.query(), "SELECT 1");
        assert_eq!(config.descriptor(), "host=db user=app");
        assert!(!config.probe_on_reuse);
    }

    #[test]
    fn test_from_json_fills_presets() {
        let config = GatewayConfig::from_json(r#"{"database_type": "mssql"}"#).unwrap();
        assert_eq!(config.database_type, DatabaseType::SqlServer);
        assert_eq!(config.query(), "SELECT @@VERSION");
        assert!(config.probe_on_reuse);
    }

    #[test]
    fn test_from_json_rejects_bad_input() {
        assert!(GatewayConfig::from_json("not json").is_err());
        assert!(GatewayConfig::from_json(r#"{"database_type": "unknown"}"#).is_err());
        assert!(GatewayConfig::from_json(r#"{"default_query": "  "}"#).is_err());
    }

    #[test]
    fn test_debug_redacts_descriptor() {
        let config = GatewayConfig::default().with_default_descriptor("host=db password=hunter2");
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("password=***"));
    }
}
