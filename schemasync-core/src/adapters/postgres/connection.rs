//! PostgreSQL connection setup and SQLSTATE classification.

use super::{PostgresDriver, PostgresSession};
use crate::adapters::{connect_timed_out, is_transport_error};
use crate::config::{ConnectionConfig, ServerCredentials};
use crate::error::{ConnectionErrorKind, DdlErrorKind};
use crate::{Result, error::SchemaSyncError};
use sqlx::Connection;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPoolOptions};

/// Builds connect options from credentials, without selecting a database.
pub fn connect_options(credentials: &ServerCredentials) -> PgConnectOptions {
    let options = PgConnectOptions::new()
        .host(&credentials.host)
        .port(credentials.port)
        .username(&credentials.username)
        .application_name("schemasync");

    match credentials.password() {
        Some(password) => options.password(password),
        None => options,
    }
}

/// Options for a session bound to `database` with `schema` first on the search path.
pub fn session_options(base: &PgConnectOptions, database: &str, schema: &str) -> PgConnectOptions {
    base.clone()
        .database(database)
        .options([("search_path", schema)])
}

/// Maps a SQLSTATE to a connection failure class.
pub fn classify_connect_state(state: &str) -> ConnectionErrorKind {
    match state {
        "28P01" | "28000" => ConnectionErrorKind::AuthFailure,
        "3D000" => ConnectionErrorKind::DatabaseNotFound,
        "57P03" => ConnectionErrorKind::NetworkUnreachable,
        s if s.starts_with("08") => ConnectionErrorKind::NetworkUnreachable,
        _ => ConnectionErrorKind::Other,
    }
}

/// Maps a SQLSTATE to a DDL failure class.
pub fn classify_ddl_state(state: &str) -> DdlErrorKind {
    match state {
        "42601" => DdlErrorKind::SyntaxError,
        "42501" => DdlErrorKind::PermissionDenied,
        "42P07" | "42701" | "42710" | "42P06" => DdlErrorKind::AlreadyExists,
        "57P01" | "57P02" | "57P03" => DdlErrorKind::ConnectionLost,
        s if s.starts_with("08") => DdlErrorKind::ConnectionLost,
        _ => DdlErrorKind::Other,
    }
}

/// Classifies a failed connection attempt.
pub fn classify_connect_error(error: &sqlx::Error) -> ConnectionErrorKind {
    if is_transport_error(error) {
        return ConnectionErrorKind::NetworkUnreachable;
    }
    error
        .as_database_error()
        .and_then(|db| db.code())
        .map_or(ConnectionErrorKind::Other, |code| classify_connect_state(&code))
}

/// Classifies a failed DDL statement.
pub fn classify_ddl_error(error: &sqlx::Error) -> DdlErrorKind {
    if is_transport_error(error) {
        return DdlErrorKind::ConnectionLost;
    }
    error
        .as_database_error()
        .and_then(|db| db.code())
        .map_or(DdlErrorKind::Other, |code| classify_ddl_state(&code))
}

impl PostgresDriver {
    /// Opens the administrative pool against the admin database.
    ///
    /// # Errors
    /// Returns a classified connection error if the server is unreachable or
    /// rejects the login.
    pub async fn connect(credentials: ServerCredentials, config: ConnectionConfig) -> Result<Self> {
        let options = connect_options(&credentials);
        let admin_options = match credentials.admin_database() {
            Some(database) => options.clone().database(database),
            None => options.clone(),
        };

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect_with(admin_options)
            .await
            .map_err(|e| {
                SchemaSyncError::connection_failed(
                    classify_connect_error(&e),
                    format!("Failed to connect to {}", credentials),
                    e,
                )
            })?;

        tracing::info!("Connected to {}", credentials);

        Ok(Self {
            pool,
            options,
            config,
            target: credentials.to_string(),
        })
    }

    /// Opens a single connection bound to `database`.
    pub(super) async fn open_session(&self, database: &str) -> Result<PostgresSession> {
        let options = session_options(&self.options, database, &self.config.schema);
        let context = || format!("Failed to open database '{}' on {}", database, self.target);

        let conn = match tokio::time::timeout(
            self.config.connect_timeout,
            PgConnection::connect_with(&options),
        )
        .await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                return Err(SchemaSyncError::connection_failed(
                    classify_connect_error(&e),
                    context(),
                    e,
                ));
            }
            Err(_) => {
                return Err(SchemaSyncError::connection_failed(
                    ConnectionErrorKind::NetworkUnreachable,
                    context(),
                    connect_timed_out(self.config.connect_timeout),
                ));
            }
        };

        tracing::debug!("Opened session for database '{}'", database);

        Ok(PostgresSession {
            conn,
            database: database.to_string(),
            schema: self.config.schema.clone(),
            statement_timeout: self.config.statement_timeout,
        })
    }
}
