//! PostgreSQL driver.
//!
//! # Module Structure
//! - `connection`: Connect options, pool setup and SQLSTATE classification
//!
//! Catalog lookups are scoped to the configured schema. Finding databases
//! that contain a table requires one connection per database, because
//! PostgreSQL catalogs only describe the database they belong to.

pub mod connection;


use super::{DatabaseDriver, DatabaseSession, catalog_query, with_statement_timeout};
use crate::config::ConnectionConfig;
use crate::dialect::Dialect;
use crate::error::DdlErrorKind;
use crate::models::Engine;
use crate::{Result, error::SchemaSyncError};
use async_trait::async_trait;
use sqlx::Connection;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool};
use std::time::Duration;

pub use connection::{classify_connect_error, classify_ddl_error, connect_options, session_options};

const TABLE_EXISTS_QUERY: &str =
    "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2";

/// Administrative connection to one PostgreSQL server.
pub struct PostgresDriver {
    pool: PgPool,
    options: PgConnectOptions,
    config: ConnectionConfig,
    target: String,
}

impl std::fmt::Debug for PostgresDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDriver")
            .field("target", &self.target)
            .field("config", &self.config)
            .field("pool_size", &self.pool.size())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    fn dialect(&self) -> Dialect {
        Dialect::postgres(self.config.schema.clone())
    }

    async fn ping(&self) -> bool {
        let probe = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool);
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
                r#"
                SELECT datname::text
                FROM pg_database
                WHERE NOT datistemplate AND datallowconn
                ORDER BY datname
                "#,
            )
            .fetch_all(&self.pool),
        )
        .await
    }

    async fn databases_with_table(&self, table: &str) -> Result<Vec<String>> {
        let candidates = self.list_databases().await?;
        tracing::debug!(
            "Probing {} databases for '{}.{}'",
            candidates.len(),
            self.config.schema,
            table
        );

        let mut found = Vec::new();
        for database in candidates {
            let mut session = match self.open_session(&database).await {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!("Skipping database '{}': {}", database, e);
                    continue;
                }
            };

            match session.table_exists(table).await {
                Ok(true) => found.push(database),
                Ok(false) => {}
                Err(e) => tracing::warn!("Skipping database '{}': {}", database, e),
            }

            Box::new(session).close().await;
        }

        Ok(found)
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

/// One connection bound to a single PostgreSQL database and schema.
pub struct PostgresSession {
    conn: PgConnection,
    database: String,
    schema: String,
    statement_timeout: Duration,
}

impl std::fmt::Debug for PostgresSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSession")
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("statement_timeout", &self.statement_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DatabaseSession for PostgresSession {
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
                SELECT table_name::text
                FROM information_schema.tables
                WHERE table_schema = $1 AND table_type = 'BASE TABLE'
                ORDER BY table_name
                "#,
            )
            .bind(self.schema.as_str())
            .fetch_all(&mut self.conn),
        )
        .await
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        let count = catalog_query(
            self.statement_timeout,
            &format!("check table {}.{}.{}", self.database, self.schema, table),
            sqlx::query_scalar::<_, i64>(TABLE_EXISTS_QUERY)
                .bind(self.schema.as_str())
                .bind(table)
                .fetch_one(&mut self.conn),
        )
        .await?;
        Ok(count > 0)
    }

    async fn column_exists(&mut self, table: &str, column: &str) -> Result<bool> {
        let count = catalog_query(
            self.statement_timeout,
            &format!(
                "check column {}.{}.{}.{}",
                self.database, self.schema, table, column
            ),
            sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*) FROM information_schema.columns
                WHERE table_schema = $1 AND table_name = $2 AND column_name = $3
                "#,
            )
            .bind(self.schema.as_str())
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
