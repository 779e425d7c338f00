//! MySQL connection setup and server error classification.
//!
//! # Security Features
//! - Passwords travel only inside `MySqlConnectOptions`, never in URLs or logs
//! - Connect attempts are bounded by the configured connect timeout

use super::{MySqlDriver, MySqlSession};
use crate::adapters::{connect_timed_out, is_transport_error};
use crate::config::{ConnectionConfig, ServerCredentials};
use crate::error::{ConnectionErrorKind, DdlErrorKind};
use crate::{Result, error::SchemaSyncError};
use sqlx::Connection;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlPoolOptions};

/// ER_DBACCESS_DENIED_ERROR
pub const ER_DBACCESS_DENIED: u16 = 1044;
/// ER_ACCESS_DENIED_ERROR
pub const ER_ACCESS_DENIED: u16 = 1045;
/// ER_BAD_DB_ERROR
pub const ER_BAD_DB: u16 = 1049;
/// ER_TABLE_EXISTS_ERROR
pub const ER_TABLE_EXISTS: u16 = 1050;
/// ER_DUP_FIELDNAME
pub const ER_DUP_FIELDNAME: u16 = 1060;
/// ER_DUP_KEYNAME
pub const ER_DUP_KEYNAME: u16 = 1061;
/// ER_PARSE_ERROR
pub const ER_PARSE_ERROR: u16 = 1064;
/// ER_TABLEACCESS_DENIED_ERROR
pub const ER_TABLEACCESS_DENIED: u16 = 1142;
/// ER_COLUMNACCESS_DENIED_ERROR
pub const ER_COLUMNACCESS_DENIED: u16 = 1143;
/// ER_SPECIFIC_ACCESS_DENIED_ERROR
pub const ER_SPECIFIC_ACCESS_DENIED: u16 = 1227;
/// ER_ACCESS_DENIED_NO_PASSWORD_ERROR
pub const ER_ACCESS_DENIED_NO_PASSWORD: u16 = 1698;

/// Builds connect options from credentials, without selecting a database.
pub fn connect_options(credentials: &ServerCredentials) -> MySqlConnectOptions {
    let options = MySqlConnectOptions::new()
        .host(&credentials.host)
        .port(credentials.port)
        .username(&credentials.username)
        .charset("utf8mb4");

    match credentials.password() {
        Some(password) => options.password(password),
        None => options,
    }
}

/// Maps a server error number to a connection failure class.
pub fn classify_connect_number(number: u16) -> ConnectionErrorKind {
    match number {
        ER_ACCESS_DENIED | ER_DBACCESS_DENIED | ER_ACCESS_DENIED_NO_PASSWORD => {
            ConnectionErrorKind::AuthFailure
        }
        ER_BAD_DB => ConnectionErrorKind::DatabaseNotFound,
        _ => ConnectionErrorKind::Other,
    }
}

/// Maps a server error number to a DDL failure class.
pub fn classify_ddl_number(number: u16) -> DdlErrorKind {
    match number {
        ER_PARSE_ERROR => DdlErrorKind::SyntaxError,
        ER_DBACCESS_DENIED | ER_TABLEACCESS_DENIED | ER_COLUMNACCESS_DENIED
        | ER_SPECIFIC_ACCESS_DENIED => DdlErrorKind::PermissionDenied,
        ER_TABLE_EXISTS | ER_DUP_FIELDNAME | ER_DUP_KEYNAME => DdlErrorKind::AlreadyExists,
        _ => DdlErrorKind::Other,
    }
}

fn error_number(error: &sqlx::Error) -> Option<u16> {
    error
        .as_database_error()
        .and_then(|db| db.try_downcast_ref::<MySqlDatabaseError>())
        .map(|db| db.number())
}

/// Classifies a failed connection attempt.
pub fn classify_connect_error(error: &sqlx::Error) -> ConnectionErrorKind {
    if is_transport_error(error) {
        return ConnectionErrorKind::NetworkUnreachable;
    }
    error_number(error).map_or(ConnectionErrorKind::Other, classify_connect_number)
}

/// Classifies a failed DDL statement.
pub fn classify_ddl_error(error: &sqlx::Error) -> DdlErrorKind {
    if is_transport_error(error) {
        return DdlErrorKind::ConnectionLost;
    }
    error_number(error).map_or(DdlErrorKind::Other, classify_ddl_number)
}

impl MySqlDriver {
    /// Opens the administrative pool and verifies it with one connection.
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

        let pool = MySqlPoolOptions::new()
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
    pub(super) async fn open_session(&self, database: &str) -> Result<MySqlSession> {
        let options = self.options.clone().database(database);
        let context = || format!("Failed to open database '{}' on {}", database, self.target);

        let conn = match tokio::time::timeout(
            self.config.connect_timeout,
            MySqlConnection::connect_with(&options),
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

        Ok(MySqlSession {
            conn,
            database: database.to_string(),
            statement_timeout: self.config.statement_timeout,
        })
    }
}
