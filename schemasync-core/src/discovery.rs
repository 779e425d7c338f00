//! Target database discovery.
//!
//! Resolves the ordered list of databases a run will visit, using one of
//! three strategies:
//! - `File`: a newline-delimited list (blank lines and `#` lines skipped)
//! - `ReferenceTable`: every database containing a named table
//! - `All`: every database on the server minus the engine's system databases
//!
//! Names are never invented: they come from the file or from the server's
//! catalog. Duplicates are dropped, keeping the first occurrence.

use crate::adapters::DatabaseDriver;
use crate::{Result, error::SchemaSyncError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// How the target databases are found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum DiscoveryStrategy {
    /// Read names from a newline-delimited file
    File { path: PathBuf },
    /// Databases containing `table`
    ReferenceTable { table: String },
    /// All non-system databases
    All,
}

impl std::fmt::Display for DiscoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File { path } => write!(f, "file {}", path.display()),
            Self::ReferenceTable { table } => write!(f, "reference-table {}", table),
            Self::All => write!(f, "all"),
        }
    }
}

/// Databases produced by discovery, with the strategy that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    /// Target databases in discovery order
    pub databases: Vec<String>,
    /// Strategy that produced the list
    pub strategy: DiscoveryStrategy,
    /// True when the primary strategy failed and the fallback was used
    pub used_fallback: bool,
}

/// Parses database-list file contents.
///
/// Lines are trimmed; empty lines and lines starting with `#` are skipped.
///
/// # Example
/// ```rust
/// use schemasync_core::discovery::parse_database_list;
///
/// let names = parse_database_list("shopA\n#comment\n\nshopB");
/// assert_eq!(names, vec!["shopA", "shopB"]);
/// ```
pub fn parse_database_list(contents: &str) -> Vec<String> {
    dedup_preserving_order(
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect(),
    )
}

/// Reads and parses a database-list file.
///
/// # Errors
/// Returns a configuration error if the file is missing, unreadable, not
/// UTF-8, or contains no usable entries.
pub async fn read_database_list(path: &Path) -> Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        SchemaSyncError::configuration(format!(
            "Cannot read database list {}: {}",
            path.display(),
            e
        ))
    })?;

    let databases = parse_database_list(&contents);
    if databases.is_empty() {
        return Err(SchemaSyncError::configuration(format!(
            "Database list {} contains no database names",
            path.display()
        )));
    }

    Ok(databases)
}

fn dedup_preserving_order(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| {
            let first = seen.insert(name.clone());
            if !first {
                tracing::debug!("Ignoring duplicate database name '{}'", name);
            }
            first
        })
        .collect()
}

/// Resolves one strategy against the server.
///
/// # Errors
/// - `Configuration` for an unreadable or empty list file
/// - `Query` when a catalog query fails
/// - `NotFound` when the server yields no matching database
pub async fn resolve(
    driver: &dyn DatabaseDriver,
    strategy: &DiscoveryStrategy,
) -> Result<Vec<String>> {
    let engine = driver.engine();

    let databases = match strategy {
        DiscoveryStrategy::File { path } => return read_database_list(path).await,
        DiscoveryStrategy::ReferenceTable { table } => {
            let found: Vec<String> = driver
                .databases_with_table(table)
                .await?
                .into_iter()
                .filter(|db| !engine.is_system_database(db))
                .collect();
            if found.is_empty() {
                return Err(SchemaSyncError::not_found(format!(
                    "no database contains reference table '{}'",
                    table
                )));
            }
            found
        }
        DiscoveryStrategy::All => {
            let found: Vec<String> = driver
                .list_databases()
                .await?
                .into_iter()
                .filter(|db| {
                    let system = engine.is_system_database(db);
                    if system {
                        tracing::debug!("Skipping system database '{}'", db);
                    }
                    !system
                })
                .collect();
            if found.is_empty() {
                return Err(SchemaSyncError::not_found(format!(
                    "no user databases on the {} server",
                    engine
                )));
            }
            found
        }
    };

    Ok(dedup_preserving_order(databases))
}

/// Resolves `primary`, trying `fallback` if the primary fails for any reason
/// other than a connection failure.
///
/// # Errors
/// Returns the primary's error when no fallback is configured or the failure
/// is a connection error; otherwise the fallback's error.
pub async fn resolve_with_fallback(
    driver: &dyn DatabaseDriver,
    primary: &DiscoveryStrategy,
    fallback: Option<&DiscoveryStrategy>,
) -> Result<Discovered> {
    tracing::info!("Discovering databases using strategy: {}", primary);

    match resolve(driver, primary).await {
        Ok(databases) => Ok(Discovered {
            databases,
            strategy: primary.clone(),
            used_fallback: false,
        }),
        Err(e) if e.is_connection_error() => Err(e),
        Err(e) => {
            let Some(fallback) = fallback else {
                return Err(e);
            };
            tracing::warn!(
                "Strategy '{}' failed ({}); falling back to '{}'",
                primary,
                e.detailed_message(),
                fallback
            );
            let databases = resolve(driver, fallback).await?;
            Ok(Discovered {
                databases,
                strategy: fallback.clone(),
                used_fallback: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_database_list() {
        assert_eq!(
            parse_database_list("shopA\n#comment\n\nshopB"),
            vec!["shopA", "shopB"]
        );
        assert_eq!(
            parse_database_list("  shopA  \r\n\t\n# shopX\nshopB\nshopA\n"),
            vec!["shopA", "shopB"]
        );
        assert!(parse_database_list("# only comments\n\n").is_empty());
    }

    #[tokio::test]
    async fn test_read_database_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "shopA\n#comment\n\nshopB\n").unwrap();

        let databases = read_database_list(file.path()).await.unwrap();
        assert_eq!(databases, vec!["shopA", "shopB"]);
    }

    #[tokio::test]
    async fn test_read_database_list_errors() {
        let err = read_database_list(Path::new("/nonexistent/db_list.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaSyncError::Configuration { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# nothing here").unwrap();
        let err = read_database_list(file.path()).await.unwrap_err();
        assert!(err.to_string().contains("no database names"));
    }

    #[test]
    fn test_strategy_display_and_serde() {
        let strategy = DiscoveryStrategy::ReferenceTable {
            table: "chatbot_setup".into(),
        };
        assert_eq!(strategy.to_string(), "reference-table chatbot_setup");

        let json = serde_json::to_string(&strategy).unwrap();
        assert!(json.contains("\"strategy\":\"reference-table\""));
        assert_eq!(DiscoveryStrategy::All.to_string(), "all");
    }
}
