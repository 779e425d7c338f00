//! Desired-schema data structures shared by configuration and the engine.

use serde::{Deserialize, Serialize};

/// Relational engines the reconciler can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// MySQL and MariaDB (same catalog and DDL dialect)
    #[serde(alias = "mariadb")]
    MySql,
    /// PostgreSQL
    #[serde(alias = "postgresql")]
    Postgres,
}

impl Engine {
    /// Default TCP port for the engine
    pub fn default_port(self) -> u16 {
        match self {
            Self::MySql => 3306,
            Self::Postgres => 5432,
        }
    }

    /// Built-in databases never targeted by reconciliation.
    pub fn system_databases(self) -> &'static [&'static str] {
        match self {
            Self::MySql => &[
                "information_schema",
                "mysql",
                "performance_schema",
                "sys",
                "test",
                "tmp",
                "temp",
            ],
            Self::Postgres => &[
                "postgres",
                "template0",
                "template1",
                "information_schema",
                "pg_catalog",
                "pg_toast",
            ],
        }
    }

    /// Checks whether `name` is one of the engine's system databases.
    pub fn is_system_database(self, name: &str) -> bool {
        self.system_databases().contains(&name)
    }

    /// Detects the engine from a connection URL scheme.
    pub fn from_url_scheme(url: &str) -> Option<Self> {
        if url.starts_with("mysql://") || url.starts_with("mariadb://") {
            Some(Self::MySql)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Self::Postgres)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MySql => write!(f, "MySQL/MariaDB"),
            Self::Postgres => write!(f, "PostgreSQL"),
        }
    }
}

/// A table that must exist in every target database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Table name as stored in the catalog
    pub name: String,
    /// Full CREATE TABLE statement (may include index statements)
    #[serde(default)]
    pub ddl: Option<String>,
    /// Table comment applied after creation
    #[serde(default)]
    pub comment: Option<String>,
}

impl TableSpec {
    /// Creates a table spec with creation DDL and no comment.
    pub fn new(name: impl Into<String>, ddl: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ddl: Some(ddl.into()),
            comment: None,
        }
    }

    /// Builder method to set the table comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Several tables created by one multi-statement script.
///
/// Listed tables are probed before and after the script runs, so partially
/// applied scripts are reported per table rather than as one outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableBatch {
    /// Tables the script creates, in dependency order
    pub tables: Vec<String>,
    /// DDL script; statements separated by semicolons
    pub script: String,
}

/// A column that must exist on every table selected by the filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,
    /// Raw type expression, e.g. `TEXT DEFAULT NULL`
    #[serde(rename = "type")]
    pub type_expr: String,
    /// Column comment applied after the column is added
    #[serde(default)]
    pub comment: Option<String>,
}

impl ColumnSpec {
    /// Creates a column spec without a comment.
    pub fn new(name: impl Into<String>, type_expr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_expr: type_expr.into(),
            comment: None,
        }
    }

    /// Builder method to set the column comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Comment text if one is configured and non-empty.
    pub fn effective_comment(&self) -> Option<&str> {
        self.comment.as_deref().filter(|c| !c.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_from_url_scheme() {
        assert_eq!(Engine::from_url_scheme("mysql://u@h/db"), Some(Engine::MySql));
        assert_eq!(Engine::from_url_scheme("mariadb://u@h"), Some(Engine::MySql));
        assert_eq!(Engine::from_url_scheme("postgres://u@h"), Some(Engine::Postgres));
        assert_eq!(Engine::from_url_scheme("postgresql://u@h"), Some(Engine::Postgres));
        assert_eq!(Engine::from_url_scheme("sqlite://x.db"), None);
    }

    #[test]
    fn test_system_databases() {
        assert!(Engine::MySql.is_system_database("performance_schema"));
        assert!(Engine::MySql.is_system_database("mysql"));
        assert!(!Engine::MySql.is_system_database("shopA"));

        assert!(Engine::Postgres.is_system_database("template0"));
        assert!(Engine::Postgres.is_system_database("postgres"));
        assert!(!Engine::Postgres.is_system_database("template2"));
    }

    #[test]
    fn test_engine_deserialize_aliases() {
        #[derive(Deserialize)]
        struct Wrapper {
            engine: Engine,
        }

        let parsed: Wrapper = toml::from_str("engine = \"mariadb\"").unwrap();
        assert_eq!(parsed.engine, Engine::MySql);
        let parsed: Wrapper = toml::from_str("engine = \"postgresql\"").unwrap();
        assert_eq!(parsed.engine, Engine::Postgres);
    }

    #[test]
    fn test_column_effective_comment() {
        let column = ColumnSpec::new("session_id", "TEXT DEFAULT NULL");
        assert_eq!(column.effective_comment(), None);

        let column = column.with_comment("   ");
        assert_eq!(column.effective_comment(), None);

        let column = ColumnSpec::new("session_id", "TEXT").with_comment("session id");
        assert_eq!(column.effective_comment(), Some("session id"));
    }
}
