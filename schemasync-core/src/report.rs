//! Per-database and run-level reconciliation reports.
//!
//! A [`DatabaseReport`] is built by the orchestrator while one database is
//! processed; [`RunReport::fold`] adds it to the run totals. Reports are
//! plain data: serializable to JSON and renderable as a text summary.

use crate::error::SchemaSyncError;
use crate::filter::Exclusion;
use crate::models::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;
use uuid::Uuid;

/// Outcome counts for one kind of object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectCounts {
    /// Objects created (or columns added) by this run
    pub created: usize,
    /// Objects that were already present
    pub existing: usize,
    /// Objects that could not be checked or created
    pub failed: usize,
}

impl ObjectCounts {
    /// Objects visited.
    pub fn total(&self) -> usize {
        self.created + self.existing + self.failed
    }
}

impl std::ops::AddAssign for ObjectCounts {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.existing += other.existing;
        self.failed += other.failed;
    }
}

impl std::fmt::Display for ObjectCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "created={} existing={} failed={}",
            self.created, self.existing, self.failed
        )
    }
}

/// What a failure entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectKind {
    Database,
    Table,
    Column,
    TableComment,
    ColumnComment,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Database => "database",
            Self::Table => "table",
            Self::Column => "column",
            Self::TableComment => "table comment",
            Self::ColumnComment => "column comment",
        };
        f.write_str(label)
    }
}

/// One object that could not be checked, created or commented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectFailure {
    pub database: String,
    /// `table` or `table.column`; the database name for connection failures
    pub object: String,
    pub kind: ObjectKind,
    /// Error class, e.g. `ddl:permission-denied`
    pub category: String,
    pub error: String,
}

/// Result of reconciling one database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseReport {
    pub database: String,
    pub tables: ObjectCounts,
    pub columns: ObjectCounts,
    pub comments_set: usize,
    pub comments_failed: usize,
    /// Tables selected by the column filter
    pub tables_matched: usize,
    /// Tables dropped by an exclusion pattern
    pub excluded: Vec<Exclusion>,
    pub failures: Vec<ObjectFailure>,
    pub warnings: Vec<String>,
    /// The session could not be opened or was lost mid-way
    pub connection_failed: bool,
    pub duration_ms: u64,
}

impl DatabaseReport {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    /// Records a failure for `object`.
    pub fn record_failure(&mut self, kind: ObjectKind, object: impl Into<String>, error: &SchemaSyncError) {
        self.failures.push(ObjectFailure {
            database: self.database.clone(),
            object: object.into(),
            kind,
            category: error.category(),
            error: error.detailed_message(),
        });
    }

    /// Records a warning line.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Marks the database as unreachable or lost.
    pub fn record_connection_failure(&mut self, error: &SchemaSyncError) {
        self.connection_failed = true;
        let database = self.database.clone();
        self.record_failure(ObjectKind::Database, database, error);
    }

    /// True when nothing failed in this database.
    pub fn is_clean(&self) -> bool {
        !self.connection_failed && self.failures.is_empty() && self.comments_failed == 0
    }

    pub fn set_duration(&mut self, elapsed: Duration) {
        self.duration_ms = duration_ms(elapsed);
    }
}

/// Aggregate counts across all databases of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub tables: ObjectCounts,
    pub columns: ObjectCounts,
    pub comments_set: usize,
    pub comments_failed: usize,
    pub tables_excluded: usize,
    pub databases_succeeded: usize,
    pub databases_with_failures: usize,
    pub databases_unreachable: usize,
}

/// Report for one complete run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub engine: Engine,
    /// Discovery strategy that produced the target list
    pub strategy: String,
    pub used_fallback: bool,
    pub databases_discovered: usize,
    /// Per-database reports in discovery order
    pub databases: Vec<DatabaseReport>,
    pub totals: RunTotals,
}

impl RunReport {
    /// Starts an empty report stamped with a fresh run id and the current time.
    pub fn new(engine: Engine, strategy: impl Into<String>, used_fallback: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            duration_ms: 0,
            engine,
            strategy: strategy.into(),
            used_fallback,
            databases_discovered: 0,
            databases: Vec::new(),
            totals: RunTotals::default(),
        }
    }

    /// Adds one database's outcome to the run.
    pub fn fold(&mut self, report: DatabaseReport) {
        let totals = &mut self.totals;
        totals.tables += report.tables;
        totals.columns += report.columns;
        totals.comments_set += report.comments_set;
        totals.comments_failed += report.comments_failed;
        totals.tables_excluded += report.excluded.len();

        if report.connection_failed {
            totals.databases_unreachable += 1;
        } else if report.is_clean() {
            totals.databases_succeeded += 1;
        } else {
            totals.databases_with_failures += 1;
        }

        self.databases.push(report);
    }

    pub fn set_duration(&mut self, elapsed: Duration) {
        self.duration_ms = duration_ms(elapsed);
    }

    /// Every failure across the run, in database order.
    pub fn failures(&self) -> impl Iterator<Item = &ObjectFailure> {
        self.databases.iter().flat_map(|db| db.failures.iter())
    }

    /// True when at least one object or database failed.
    pub fn has_failures(&self) -> bool {
        self.databases.iter().any(|db| !db.is_clean())
    }

    /// Report for `database`, if it was processed.
    pub fn database(&self, database: &str) -> Option<&DatabaseReport> {
        self.databases.iter().find(|db| db.database == database)
    }

    /// Pretty JSON rendering.
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| SchemaSyncError::Serialization {
            context: "run report".to_string(),
            source: e,
        })
    }

    /// Human-readable summary: one line per database, totals, then failures.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Run {} ({}, strategy: {}{})",
            self.run_id,
            self.engine,
            self.strategy,
            if self.used_fallback { ", fallback" } else { "" }
        );
        let _ = writeln!(out, "Databases: {}", self.databases_discovered);

        for db in &self.databases {
            if db.connection_failed {
                let _ = writeln!(out, "  ✗ {}: connection failed", db.database);
                continue;
            }
            let marker = if db.is_clean() { "✓" } else { "!" };
            let _ = writeln!(
                out,
                "  {} {}: tables [{}] columns [{}] comments set={} failed={} excluded={}",
                marker,
                db.database,
                db.tables,
                db.columns,
                db.comments_set,
                db.comments_failed,
                db.excluded.len()
            );
        }

        let t = &self.totals;
        let _ = writeln!(out, "Tables:  {}", t.tables);
        let _ = writeln!(out, "Columns: {}", t.columns);
        let _ = writeln!(
            out,
            "Comments: set={} failed={}",
            t.comments_set, t.comments_failed
        );
        let _ = writeln!(
            out,
            "Databases: {} ok, {} with failures, {} unreachable ({} ms)",
            t.databases_succeeded, t.databases_with_failures, t.databases_unreachable, self.duration_ms
        );

        let failures: Vec<_> = self.failures().collect();
        if !failures.is_empty() {
            let _ = writeln!(out, "Failures:");
            for failure in failures {
                let _ = writeln!(
                    out,
                    "  {} {} {} [{}]: {}",
                    failure.database, failure.kind, failure.object, failure.category, failure.error
                );
            }
        }

        let warnings: Vec<_> = self
            .databases
            .iter()
            .flat_map(|db| db.warnings.iter().map(move |w| (&db.database, w)))
            .collect();
        if !warnings.is_empty() {
            let _ = writeln!(out, "Warnings:");
            for (database, warning) in warnings {
                let _ = writeln!(out, "  {}: {}", database, warning);
            }
        }

        out
    }
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DdlErrorKind;

    fn denied(object: &str) -> SchemaSyncError {
        SchemaSyncError::ddl_failed(
            DdlErrorKind::PermissionDenied,
            object,
            std::io::Error::other("ALTER command denied"),
        )
    }

    #[test]
    fn test_fold_accumulates_totals() {
        let mut run = RunReport::new(Engine::MySql, "file db_list.txt", false);
        run.databases_discovered = 3;

        let mut a = DatabaseReport::new("shopA");
        a.tables = ObjectCounts {
            created: 1,
            existing: 2,
            failed: 0,
        };
        a.columns.created = 1;
        a.comments_set = 1;

        let mut b = DatabaseReport::new("shopB");
        b.columns.failed = 1;
        b.record_failure(ObjectKind::Column, "orders.session_id", &denied("shopB.orders"));

        let mut c = DatabaseReport::new("shopC");
        c.record_connection_failure(&SchemaSyncError::configuration("unreachable"));

        run.fold(a);
        run.fold(b);
        run.fold(c);

        assert_eq!(run.totals.tables.total(), 3);
        assert_eq!(run.totals.columns.created, 1);
        assert_eq!(run.totals.columns.failed, 1);
        assert_eq!(run.totals.databases_succeeded, 1);
        assert_eq!(run.totals.databases_with_failures, 1);
        assert_eq!(run.totals.databases_unreachable, 1);
        assert_eq!(run.failures().count(), 2);
        assert!(run.has_failures());
    }

    #[test]
    fn test_failure_records_category_and_message() {
        let mut report = DatabaseReport::new("shopB");
        report.record_failure(ObjectKind::Column, "orders.note", &denied("shopB.orders"));

        let failure = &report.failures[0];
        assert_eq!(failure.database, "shopB");
        assert_eq!(failure.category, "ddl:permission-denied");
        assert!(failure.error.contains("ALTER command denied"));
        assert!(!report.is_clean());
    }

    #[test]
    fn test_render_text_lists_databases_and_failures() {
        let mut run = RunReport::new(Engine::Postgres, "all", true);
        run.databases_discovered = 2;

        let mut ok = DatabaseReport::new("tenant_a");
        ok.columns.created = 1;
        run.fold(ok);

        let mut bad = DatabaseReport::new("tenant_b");
        bad.record_failure(ObjectKind::Table, "translation_log", &denied("tenant_b.translation_log"));
        bad.warn("comment on translation_log failed");
        run.fold(bad);

        let text = run.render_text();
        assert!(text.contains("strategy: all, fallback"));
        assert!(text.contains("✓ tenant_a"));
        assert!(text.contains("! tenant_b"));
        assert!(text.contains("Failures:"));
        assert!(text.contains("ddl:permission-denied"));
        assert!(text.contains("Warnings:"));
    }

    #[test]
    fn test_report_json_shape() {
        let mut run = RunReport::new(Engine::MySql, "all", false);
        run.fold(DatabaseReport::new("shopA"));

        let json: serde_json::Value = serde_json::from_str(&run.to_json().unwrap()).unwrap();
        assert_eq!(json["engine"], "mysql");
        assert_eq!(json["databases"][0]["database"], "shopA");
        assert_eq!(json["totals"]["databases_succeeded"], 1);
    }
}
