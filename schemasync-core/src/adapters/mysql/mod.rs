//! MySQL/MariaDB driver.
//!
//! # Module Structure
//! - `connection`: Connect options, pool setup and server error classification
//!
//! Catalog lookups read `information_schema` scoped to the session's current
//! database. Names are cast to CHAR because some server versions report
//! `information_schema` text columns as binary strings.

pub mod connection;


use super::{DatabaseDriver, DatabaseSession, catalog_query, with_statement_timeout};
use crate::config::ConnectionConfig;
use crate::dialect::Dialect;
use crate::error::DdlErrorKind;
use crate::models::Engine;
use crate::{Result, error::SchemaSyncError};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPool};
use sqlx::Connection;
use std::time::Duration;

pub use connection::{classify_connect_error, classify_ddl_error, connect_options};

/// Administrative connection to one MySQL/MariaDB server.
pub struct MySqlDriver {
    pool: MySqlPool,
    options: MySqlConnectOptions,
    config: ConnectionConfig,
    target: String,
}

impl std::fmt::Debug for MySqlDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlDriver")
            .field("target", &self.target)
            .field("config", &self.config)
            .field("pool_size", &self.pool.size())
            // options carry the password
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DatabaseDriver for MySqlDriver {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    fn dialect(&self) -> Dialect {
        Dialect::mysql()
    }

    async fn ping(&self) -> bool {
        let probe = sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&self.pool);
        matches!(
            with_statement_timeout(self.config.statement_timeout, probe).await,
            Ok(Ok(1))
        )
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        tracing::debug!("Listing databases on {}", self.target);
        catalog_query(
            self.config.statement_timeout,
            "list databases",
            sqlx::query_scalar::<_, String>(
                "SELECT CAST(SCHEMA_NAME AS CHAR) FROM INFORMATION_SCHEMA.SCHEMATA ORDER BY SCHEMA_NAME",
            )
            .fetch_all(&self.pool),
        )
        .await
    }

    async fn databases_with_table(&self, table: &str) -> Result<Vec<String>> {
        tracing::debug!("Looking for databases containing '{}' on {}", table, self.target);
        catalog_query(
            self.config.statement_timeout,
            &format!("find databases containing '{}'", table),
            sqlx::query_scalar::<_, String>(
                r#"
                SELECT DISTINCT CAST(TABLE_SCHEMA AS CHAR) AS TABLE_SCHEMA
                FROM INFORMATION_SCHEMA.TABLES
                WHERE TABLE_NAME = ?
                ORDER BY TABLE_SCHEMA
                "#,
            )
            .bind(table)
            .fetch_all(&self.pool),
        )
        .await
    }

    async fn open(&self, database: &str) -> Result<Box<dyn DatabaseSession>> {
        let session = self.open_session(database).await?;
        Ok(Box::new(session))
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("Closed administrative pool for {}", self.target);
    }
}

/// One connection bound to a single MySQL database.
pub struct MySqlSession {
    conn: MySqlConnection,
    database: String,
    statement_timeout: Duration,
}

impl std::fmt::Debug for MySqlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlSession")
            .field("database", &self.database)
            .field("statement_timeout", &self.statement_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DatabaseSession for MySqlSession {
    fn database(&self) -> &str {
        &self.database
    }

    async fn ping(&mut self) -> bool {
        matches!(
            with_statement_timeout(self.statement_timeout, self.conn.ping()).await,
            Ok(Ok(()))
        )
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        catalog_query(
            self.statement_timeout,
            &format!("list tables in '{}'", self.database),
            sqlx::query_scalar::<_, String>(
                r#"
                SELECT CAST(TABLE_NAME AS CHAR) AS TABLE_NAME
                FROM INFORMATION_SCHEMA.TABLES
                WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
                ORDER BY TABLE_NAME
                "#,
            )
            .fetch_all(&mut self.conn),
        )
        .await
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        let count = catalog_query(
            self.statement_timeout,
            &format!("check table {}.{}", self.database, table),
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
            )
            .bind(table)
            .fetch_one(&mut self.conn),
        )
        .await?;
        Ok(count > 0)
    }

    async fn column_exists(&mut self, table: &str, column: &str) -> Result<bool> {
        let count = catalog_query(
            self.statement_timeout,
            &format!("check column {}.{}.{}", self.database, table, column),
            sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*) FROM INFORMATION_SCHEMA.COLUMNS
                WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND COLUMN_NAME = ?
                "#,
            )
            .bind(table)
            .bind(column)
            .fetch_one(&mut self.conn),
        )
        .await?;
        Ok(count > 0)
    }

    async fn execute_ddl(&mut self, object: &str, sql: &str) -> Result<()> {
        let object = format!("{}.{}", self.database, object);
        tracing::trace!("Executing DDL on {}: {}", object, sql);

        let execution = sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(sql));
        match with_statement_timeout(self.statement_timeout, execution).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(SchemaSyncError::ddl_failed(classify_ddl_error(&e), object, e)),
            Err(elapsed) => Err(SchemaSyncError::ddl_failed(
                DdlErrorKind::ConnectionLost,
                object,
                elapsed,
            )),
        }
    }

    async fn close(self: Box<Self>) {
        let Self { conn, database, .. } = *self;
        if let Err(e) = conn.close().await {
            tracing::debug!("Closing session for '{}' failed: {}", database, e);
        }
    }
}
