//! The `schemasync.toml` configuration file.
//!
//! Read once at startup into an immutable [`SyncConfig`]. Every section is
//! optional at the TOML level; [`SyncConfig::validate`] decides what a run
//! actually needs.

use super::{ConnectionConfig, ServerCredentials};
use crate::discovery::DiscoveryStrategy;
use crate::filter::FilterRule;
use crate::models::{ColumnSpec, Engine, TableBatch, TableSpec};
use crate::reconcile::{ColumnPlan, ReconcileOptions, ReconcilePlan};
use crate::{Result, error::SchemaSyncError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the configured password.
pub const PASSWORD_ENV: &str = "SCHEMASYNC_PASSWORD";

/// Upper bound for `run.max_concurrency`.
pub const MAX_CONCURRENCY: usize = 64;

/// `[server]`: where to connect and how long to wait.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Connection URL; explicit fields below override its parts
    pub url: Option<String>,
    pub engine: Option<Engine>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub admin_database: Option<String>,
    pub connect_timeout_secs: u64,
    pub statement_timeout_secs: u64,
    pub max_connections: u32,
    /// PostgreSQL schema holding the target tables
    pub schema: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        let connection = ConnectionConfig::default();
        Self {
            url: None,
            engine: None,
            host: None,
            port: None,
            user: None,
            password: None,
            admin_database: None,
            connect_timeout_secs: connection.connect_timeout.as_secs(),
            statement_timeout_secs: connection.statement_timeout.as_secs(),
            max_connections: connection.max_connections,
            schema: connection.schema,
        }
    }
}

impl std::fmt::Debug for ServerSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSection")
            .field(
                "url",
                &self.url.as_deref().map(crate::error::redact_database_url),
            )
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("has_password", &self.password.is_some())
            .field("admin_database", &self.admin_database)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Discovery strategy names as written in config and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    File,
    ReferenceTable,
    All,
}

impl std::str::FromStr for StrategyKind {
    type Err = SchemaSyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "reference-table" | "reference_table" | "reference" => Ok(Self::ReferenceTable),
            "all" => Ok(Self::All),
            other => Err(SchemaSyncError::configuration(format!(
                "unknown discovery strategy '{}' (expected file, reference-table or all)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::File => "file",
            Self::ReferenceTable => "reference-table",
            Self::All => "all",
        })
    }
}

/// `[discovery]`: which databases to visit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    pub strategy: Option<StrategyKind>,
    pub reference_table: Option<String>,
    /// Relative paths resolve against the config file's directory
    pub database_list: Option<PathBuf>,
    pub fallback: Option<StrategyKind>,
}

/// `[run]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSection {
    pub max_concurrency: usize,
}

impl Default for RunSection {
    fn default() -> Self {
        Self { max_concurrency: 1 }
    }
}

/// `[columns]`: columns added to every table matching `include`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnPlanConfig {
    pub include: String,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub add: Vec<ColumnSpec>,
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub server: ServerSection,
    pub discovery: DiscoveryConfig,
    pub run: RunSection,
    pub tables: Vec<TableSpec>,
    pub table_batch: Option<TableBatch>,
    pub columns: Option<ColumnPlanConfig>,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl SyncConfig {
    /// Reads and parses a configuration file.
    ///
    /// # Errors
    /// Returns a configuration error if the file is missing, unreadable or
    /// not valid TOML for this schema.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SchemaSyncError::configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_toml_str(&content).map_err(|e| {
            SchemaSyncError::configuration(format!("{}: {}", path.display(), e))
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf);

        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parses configuration text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| SchemaSyncError::configuration(format!("invalid configuration: {}", e)))
    }

    /// Replaces the server URL, e.g. from `--database-url`.
    ///
    /// The URL supersedes every connection field of `[server]`: engine, host,
    /// port, user, password and admin database are cleared. Timeouts, pool
    /// size and schema are kept. `SCHEMASYNC_PASSWORD` still applies.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        let server = &mut self.server;
        server.url = Some(url.into());
        server.engine = None;
        server.host = None;
        server.port = None;
        server.user = None;
        server.password = None;
        server.admin_database = None;
        self
    }

    /// Builds server credentials.
    ///
    /// Password precedence: `SCHEMASYNC_PASSWORD`, then `server.password`,
    /// then the URL's password.
    ///
    /// # Errors
    /// Returns a configuration error when neither a URL nor an engine and
    /// user are configured, or the resulting credentials are invalid.
    pub fn credentials(&self) -> Result<ServerCredentials> {
        let server = &self.server;

        let mut credentials = match &server.url {
            Some(url) => {
                let credentials = ServerCredentials::from_url(url)?;
                if let Some(engine) = server.engine
                    && engine != credentials.engine
                {
                    return Err(SchemaSyncError::configuration(format!(
                        "server.engine is {} but the URL is for {}",
                        engine, credentials.engine
                    )));
                }
                credentials
            }
            None => {
                let engine = server.engine.ok_or_else(|| {
                    SchemaSyncError::configuration("server.url or server.engine is required")
                })?;
                let user = server.user.clone().ok_or_else(|| {
                    SchemaSyncError::configuration("server.user is required without server.url")
                })?;
                let host = server.host.clone().unwrap_or_else(|| "localhost".to_string());
                ServerCredentials::new(engine, host, user)
            }
        };

        if server.url.is_some() {
            if let Some(host) = &server.host {
                credentials.host = host.clone();
            }
            if let Some(user) = &server.user {
                credentials.username = user.clone();
            }
        }
        if let Some(port) = server.port {
            credentials = credentials.with_port(port);
        }
        if let Some(database) = &server.admin_database {
            credentials = credentials.with_admin_database(database.clone());
        }

        if let Ok(password) = std::env::var(PASSWORD_ENV)
            && !password.is_empty()
        {
            credentials = credentials.with_password(password);
        } else if let Some(password) = &server.password {
            credentials = credentials.with_password(password.clone());
        }

        credentials.validate()?;
        Ok(credentials)
    }

    /// Timeouts, pool size and schema from `[server]`.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::default()
            .with_connect_timeout(Duration::from_secs(self.server.connect_timeout_secs))
            .with_statement_timeout(Duration::from_secs(self.server.statement_timeout_secs))
            .with_max_connections(self.server.max_connections)
            .with_schema(self.server.schema.clone())
    }

    /// Run options from `[run]`.
    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            max_concurrency: self.run.max_concurrency,
        }
    }

    /// Builds a concrete strategy of `kind` from the `[discovery]` parameters.
    ///
    /// # Errors
    /// Returns a configuration error when the strategy's parameter is missing.
    pub fn strategy_of(&self, kind: StrategyKind) -> Result<DiscoveryStrategy> {
        match kind {
            StrategyKind::File => {
                let path = self.discovery.database_list.as_ref().ok_or_else(|| {
                    SchemaSyncError::configuration(
                        "the file strategy needs discovery.database_list",
                    )
                })?;
                Ok(DiscoveryStrategy::File {
                    path: self.resolve_path(path),
                })
            }
            StrategyKind::ReferenceTable => {
                let table = self
                    .discovery
                    .reference_table
                    .as_ref()
                    .filter(|t| !t.trim().is_empty())
                    .ok_or_else(|| {
                        SchemaSyncError::configuration(
                            "the reference-table strategy needs discovery.reference_table",
                        )
                    })?;
                Ok(DiscoveryStrategy::ReferenceTable {
                    table: table.clone(),
                })
            }
            StrategyKind::All => Ok(DiscoveryStrategy::All),
        }
    }

    /// The primary discovery strategy.
    ///
    /// # Errors
    /// Returns a configuration error when no strategy is configured.
    pub fn strategy(&self) -> Result<DiscoveryStrategy> {
        let kind = self
            .discovery
            .strategy
            .ok_or_else(|| SchemaSyncError::configuration("discovery.strategy is not set"))?;
        self.strategy_of(kind)
    }

    /// The fallback strategy, if one is configured.
    pub fn fallback_strategy(&self) -> Result<Option<DiscoveryStrategy>> {
        self.discovery
            .fallback
            .map(|kind| self.strategy_of(kind))
            .transpose()
    }

    /// Compiles the reconcile plan from `tables`, `table_batch` and `columns`.
    ///
    /// # Errors
    /// Returns a configuration error for invalid patterns, duplicate names,
    /// non-additive DDL or an empty plan.
    pub fn plan(&self) -> Result<ReconcilePlan> {
        let columns = self
            .columns
            .as_ref()
            .map(|section| {
                let filter = FilterRule::new(&section.include, &section.exclude)?;
                Ok::<_, SchemaSyncError>(ColumnPlan {
                    filter,
                    columns: section.add.clone(),
                })
            })
            .transpose()?;

        let plan = ReconcilePlan {
            tables: self.tables.clone(),
            batch: self.table_batch.clone(),
            columns,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Validates everything that can be checked without a server.
    ///
    /// # Errors
    /// Returns the first configuration problem found.
    pub fn validate(&self) -> Result<()> {
        self.connection_config().validate()?;

        if self.run.max_concurrency == 0 || self.run.max_concurrency > MAX_CONCURRENCY {
            return Err(SchemaSyncError::configuration(format!(
                "run.max_concurrency must be between 1 and {}",
                MAX_CONCURRENCY
            )));
        }

        if self.discovery.strategy.is_some() {
            self.strategy()?;
        }
        self.fallback_strategy()?;
        self.plan()?;
        Ok(())
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() && !base.as_os_str().is_empty() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}
