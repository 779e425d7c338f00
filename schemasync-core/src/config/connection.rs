//! Connection and statement limits.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeouts and pool sizing shared by the administrative connection and
/// every per-database session.
///
/// # Example
/// ```rust
/// use schemasync_core::config::ConnectionConfig;
/// use std::time::Duration;
///
/// let config = ConnectionConfig::default()
///     .with_statement_timeout(Duration::from_secs(10))
///     .with_schema("app");
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Time allowed to establish a connection
    pub connect_timeout: Duration,
    /// Time allowed for any single catalog query or DDL statement
    pub statement_timeout: Duration,
    /// Maximum connections in the administrative pool
    pub max_connections: u32,
    /// PostgreSQL schema holding the target tables
    pub schema: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            statement_timeout: Duration::from_secs(30),
            max_connections: 4,
            schema: "public".to_string(),
        }
    }
}

impl ConnectionConfig {
    /// Validates connection configuration parameters.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid or unsafe
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_connections == 0 {
            return Err(crate::error::SchemaSyncError::configuration(
                "max_connections must be greater than 0",
            ));
        }

        if self.max_connections > 100 {
            return Err(crate::error::SchemaSyncError::configuration(
                "max_connections should not exceed 100",
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(crate::error::SchemaSyncError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if self.statement_timeout.is_zero() {
            return Err(crate::error::SchemaSyncError::configuration(
                "statement_timeout must be greater than 0",
            ));
        }

        if self.schema.trim().is_empty() {
            return Err(crate::error::SchemaSyncError::configuration(
                "schema cannot be empty",
            ));
        }

        Ok(())
    }

    /// Builder method to set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder method to set the statement timeout.
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Builder method to set the administrative pool size.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Builder method to set the PostgreSQL schema.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }
}
