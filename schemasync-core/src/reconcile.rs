//! Reconciliation orchestrator.
//!
//! For every target database the [`Reconciler`] opens one session and walks
//! the plan in a fixed order:
//!
//! 1. **Tables**: each [`TableSpec`] is checked, then created when absent.
//! 2. **Batch**: a multi-statement script creating several tables, judged by
//!    probing each listed table before and after the script runs.
//! 3. **Columns**: tables selected by the [`FilterRule`] get every missing
//!    [`ColumnSpec`] added, followed by a best-effort comment.
//!
//! Failures are recorded at the smallest granularity possible. A failing
//! object never stops its siblings; a lost session stops only its database;
//! one unreachable database never stops the run.
//!
//! # Concurrency
//! Databases are processed through a bounded `buffered` stream, so results
//! keep discovery order. Within a database every object is checked before
//! it is created and objects are visited strictly in plan order.

use crate::adapters::{DatabaseDriver, DatabaseSession};
use crate::discovery::Discovered;
use crate::error::{DdlErrorKind, SchemaSyncError};
use crate::existence;
use crate::filter::FilterRule;
use crate::models::{ColumnSpec, TableBatch, TableSpec};
use crate::mutator::SchemaMutator;
use crate::report::{DatabaseReport, ObjectKind, RunReport};
use crate::Result;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Columns to add to every table selected by a filter.
#[derive(Debug, Clone)]
pub struct ColumnPlan {
    pub filter: FilterRule,
    pub columns: Vec<ColumnSpec>,
}

/// Desired objects for every target database.
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    /// Tables ensured one by one, in order
    pub tables: Vec<TableSpec>,
    /// Tables created together by one script
    pub batch: Option<TableBatch>,
    /// Columns ensured on filtered tables
    pub columns: Option<ColumnPlan>,
}

impl ReconcilePlan {
    /// True when the plan would not touch anything.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
            && self.batch.is_none()
            && self.columns.as_ref().is_none_or(|c| c.columns.is_empty())
    }

    /// Checks names and DDL before any database is contacted.
    ///
    /// # Errors
    /// Returns a configuration error for an empty plan, duplicate or blank
    /// names, non-additive DDL, or a column type that smuggles in a second
    /// statement.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(SchemaSyncError::configuration(
                "nothing to reconcile: configure tables, table_batch or columns",
            ));
        }

        let mut table_names = HashSet::new();
        for spec in &self.tables {
            if spec.name.trim().is_empty() {
                return Err(SchemaSyncError::configuration("table name cannot be empty"));
            }
            if !table_names.insert(spec.name.as_str()) {
                return Err(SchemaSyncError::configuration(format!(
                    "table '{}' is listed more than once",
                    spec.name
                )));
            }
            if let Some(ddl) = &spec.ddl {
                crate::dialect::ensure_additive(ddl).map_err(|e| {
                    SchemaSyncError::configuration(format!("table '{}': {}", spec.name, e))
                })?;
            }
        }

        if let Some(batch) = &self.batch {
            if batch.tables.is_empty() {
                return Err(SchemaSyncError::configuration(
                    "table_batch must list the tables its script creates",
                ));
            }
            for table in &batch.tables {
                if table.trim().is_empty() {
                    return Err(SchemaSyncError::configuration(
                        "table_batch contains an empty table name",
                    ));
                }
                if !table_names.insert(table.as_str()) {
                    return Err(SchemaSyncError::configuration(format!(
                        "table '{}' is listed more than once",
                        table
                    )));
                }
            }
            crate::dialect::ensure_additive(&batch.script).map_err(|e| {
                SchemaSyncError::configuration(format!("table_batch script: {}", e))
            })?;
        }

        if let Some(plan) = &self.columns {
            let mut column_names = HashSet::new();
            for column in &plan.columns {
                if column.name.trim().is_empty() {
                    return Err(SchemaSyncError::configuration("column name cannot be empty"));
                }
                if !column_names.insert(column.name.as_str()) {
                    return Err(SchemaSyncError::configuration(format!(
                        "column '{}' is listed more than once",
                        column.name
                    )));
                }
                if column.type_expr.trim().is_empty() || column.type_expr.contains(';') {
                    return Err(SchemaSyncError::configuration(format!(
                        "column '{}' has an invalid type expression",
                        column.name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Run-level knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Databases processed at once; 1 is strictly sequential
    pub max_concurrency: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self { max_concurrency: 1 }
    }
}

/// Applies a [`ReconcilePlan`] to a list of databases.
pub struct Reconciler {
    driver: Arc<dyn DatabaseDriver>,
    plan: ReconcilePlan,
    options: ReconcileOptions,
    mutator: SchemaMutator,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("engine", &self.driver.engine())
            .field("plan", &self.plan)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(driver: Arc<dyn DatabaseDriver>, plan: ReconcilePlan, options: ReconcileOptions) -> Self {
        let mutator = SchemaMutator::new(driver.dialect());
        Self {
            driver,
            plan,
            options,
            mutator,
        }
    }

    pub fn plan(&self) -> &ReconcilePlan {
        &self.plan
    }

    /// Reconciles every discovered database and returns the run report.
    pub async fn run(&self, discovered: &Discovered) -> RunReport {
        let started = Instant::now();
        let mut run = RunReport::new(
            self.driver.engine(),
            discovered.strategy.to_string(),
            discovered.used_fallback,
        );
        run.databases_discovered = discovered.databases.len();

        let concurrency = self.options.max_concurrency.max(1);
        tracing::info!(
            "Reconciling {} databases (concurrency {})",
            discovered.databases.len(),
            concurrency
        );

        let reports: Vec<DatabaseReport> = stream::iter(&discovered.databases)
            .map(|database| self.reconcile_database(database))
            .buffered(concurrency)
            .collect()
            .await;

        for report in reports {
            run.fold(report);
        }
        run.set_duration(started.elapsed());

        tracing::info!(
            "Reconciliation finished: tables [{}], columns [{}], {} databases unreachable",
            run.totals.tables,
            run.totals.columns,
            run.totals.databases_unreachable
        );

        run
    }

    /// Reconciles one database on its own session.
    ///
    /// Never fails: connection problems are recorded in the returned report.
    pub async fn reconcile_database(&self, database: &str) -> DatabaseReport {
        let started = Instant::now();
        let mut report = DatabaseReport::new(database);
        tracing::info!("📂 Processing database: {}", database);

        let mut session = match self.driver.open(database).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("  ❌ Cannot open {}: {}", database, e.detailed_message());
                report.record_connection_failure(&e);
                report.set_duration(started.elapsed());
                return report;
            }
        };

        if let Err(e) = self.apply_plan(session.as_mut(), &mut report).await {
            tracing::error!(
                "  ❌ Session for {} lost, skipping the rest of it: {}",
                database,
                e.detailed_message()
            );
            report.record_connection_failure(&e);
        }

        session.close().await;
        report.set_duration(started.elapsed());
        tracing::info!(
            "  Done {}: tables [{}], columns [{}]",
            database,
            report.tables,
            report.columns
        );
        report
    }

    /// Runs all three phases; `Err` means the session is gone.
    async fn apply_plan(
        &self,
        session: &mut dyn DatabaseSession,
        report: &mut DatabaseReport,
    ) -> Result<()> {
        for spec in &self.plan.tables {
            self.ensure_table(session, spec, report).await?;
        }

        if let Some(batch) = &self.plan.batch {
            self.ensure_batch(session, batch, report).await?;
        }

        if let Some(plan) = &self.plan.columns {
            self.ensure_columns(session, plan, report).await?;
        }

        Ok(())
    }

    /// Decides whether a failure leaves the session usable.
    async fn check_session(
        &self,
        session: &mut dyn DatabaseSession,
        error: SchemaSyncError,
    ) -> Result<()> {
        let suspicious = error.is_connection_error() || matches!(error, SchemaSyncError::Query { .. });
        if suspicious && !session.ping().await {
            return Err(error);
        }
        Ok(())
    }

    async fn ensure_table(
        &self,
        session: &mut dyn DatabaseSession,
        spec: &TableSpec,
        report: &mut DatabaseReport,
    ) -> Result<()> {
        let table = spec.name.as_str();

        match existence::table_exists(session, table).await {
            Ok(true) => {
                tracing::info!("    ✓ Table exists: {}", table);
                report.tables.existing += 1;
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("    ⚠️ Cannot check table {}: {}", table, e.detailed_message());
                report.tables.failed += 1;
                report.record_failure(ObjectKind::Table, table, &e);
                return self.check_session(session, e).await;
            }
        }

        let Some(ddl) = spec.ddl.as_deref() else {
            tracing::warn!("    ⚠️ Table {} is missing and has no DDL", table);
            report.tables.failed += 1;
            report.record_failure(
                ObjectKind::Table,
                table,
                &SchemaSyncError::not_found(format!("table '{}' is missing and no DDL is configured", table)),
            );
            return Ok(());
        };

        match self.mutator.create_table(session, table, ddl).await {
            Ok(()) => {
                tracing::info!("    ✅ Created table: {}", table);
                report.tables.created += 1;
            }
            Err(e) if e.ddl_kind() == Some(DdlErrorKind::AlreadyExists) => {
                tracing::warn!("    ✓ Table {} appeared concurrently; counting as existing", table);
                report.tables.existing += 1;
                report.warn(format!("table {} already existed at creation time", table));
                return Ok(());
            }
            Err(e) => {
                tracing::error!("    ❌ Failed to create table {}: {}", table, e.detailed_message());
                report.tables.failed += 1;
                report.record_failure(ObjectKind::Table, table, &e);
                return self.check_session(session, e).await;
            }
        }

        if let Some(comment) = spec.comment.as_deref().filter(|c| !c.trim().is_empty()) {
            match self.mutator.set_table_comment(session, table, comment).await {
                Ok(()) => report.comments_set += 1,
                Err(e) => {
                    tracing::warn!(
                        "    ⚠️ Table {} created but comment failed: {}",
                        table,
                        e.detailed_message()
                    );
                    report.comments_failed += 1;
                    report.record_failure(ObjectKind::TableComment, table, &e);
                    return self.check_session(session, e).await;
                }
            }
        }

        Ok(())
    }

    async fn ensure_batch(
        &self,
        session: &mut dyn DatabaseSession,
        batch: &TableBatch,
        report: &mut DatabaseReport,
    ) -> Result<()> {
        let mut absent = Vec::new();
        for (table, result) in existence::probe_tables(session, &batch.tables).await {
            match result {
                Ok(true) => {
                    tracing::info!("    ✓ Table exists: {}", table);
                    report.tables.existing += 1;
                }
                Ok(false) => absent.push(table),
                Err(e) => {
                    tracing::warn!("    ⚠️ Cannot check table {}: {}", table, e.detailed_message());
                    report.tables.failed += 1;
                    report.record_failure(ObjectKind::Table, &table, &e);
                    self.check_session(session, e).await?;
                }
            }
        }

        if absent.is_empty() {
            return Ok(());
        }

        let label = format!("batch({})", batch.tables.join(", "));
        tracing::info!("    Running table script for {} missing tables", absent.len());
        let script_error = match self.mutator.run_script(session, &label, &batch.script).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(
                    "    ⚠️ Table script failed, probing tables individually: {}",
                    e.detailed_message()
                );
                if e.is_connection_error() && !session.ping().await {
                    for table in &absent {
                        report.tables.failed += 1;
                        report.record_failure(ObjectKind::Table, table, &e);
                    }
                    return Err(e);
                }
                Some(e)
            }
        };

        for table in absent {
            match existence::table_exists(session, &table).await {
                Ok(true) => {
                    tracing::info!("    ✅ Created table: {}", table);
                    report.tables.created += 1;
                }
                Ok(false) => {
                    tracing::error!("    ❌ Table {} still missing after script", table);
                    report.tables.failed += 1;
                    let missing = SchemaSyncError::not_found(format!(
                        "table '{}' still missing after the table script ran",
                        table
                    ));
                    report.record_failure(ObjectKind::Table, &table, script_error.as_ref().unwrap_or(&missing));
                }
                Err(e) => {
                    report.tables.failed += 1;
                    report.record_failure(ObjectKind::Table, &table, &e);
                    self.check_session(session, e).await?;
                }
            }
        }

        Ok(())
    }

    async fn ensure_columns(
        &self,
        session: &mut dyn DatabaseSession,
        plan: &ColumnPlan,
        report: &mut DatabaseReport,
    ) -> Result<()> {
        let candidates = match session.list_tables().await {
            Ok(tables) => tables,
            Err(e) => {
                tracing::warn!(
                    "  ⚠️ Cannot list tables in {}, treating as no match: {}",
                    session.database(),
                    e.detailed_message()
                );
                report.warn(format!("cannot list tables: {}", e.detailed_message()));
                return self.check_session(session, e).await;
            }
        };

        let outcome = plan.filter.apply(&candidates);
        report.tables_matched = outcome.kept.len();
        report.excluded = outcome.excluded;

        if outcome.kept.is_empty() {
            tracing::info!("  No tables match '{}'", plan.filter.include());
            return Ok(());
        }

        for table in &outcome.kept {
            tracing::info!("  📋 Table: {}", table);
            for column in &plan.columns {
                self.ensure_column(session, table, column, report).await?;
            }
        }

        Ok(())
    }

    async fn ensure_column(
        &self,
        session: &mut dyn DatabaseSession,
        table: &str,
        column: &ColumnSpec,
        report: &mut DatabaseReport,
    ) -> Result<()> {
        let object = format!("{}.{}", table, column.name);

        match existence::column_exists(session, table, &column.name).await {
            Ok(true) => {
                tracing::info!("    ✓ Column exists: {}", object);
                report.columns.existing += 1;
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("    ⚠️ Cannot check column {}: {}", object, e.detailed_message());
                report.columns.failed += 1;
                report.record_failure(ObjectKind::Column, &object, &e);
                return self.check_session(session, e).await;
            }
        }

        match self
            .mutator
            .add_column(session, table, &column.name, &column.type_expr)
            .await
        {
            Ok(()) => {
                tracing::info!("    ✅ Added column: {} ({})", object, column.type_expr);
                report.columns.created += 1;
            }
            Err(e) if e.ddl_kind() == Some(DdlErrorKind::AlreadyExists) => {
                tracing::warn!("    ✓ Column {} appeared concurrently; counting as existing", object);
                report.columns.existing += 1;
                report.warn(format!("column {} already existed at creation time", object));
                return Ok(());
            }
            Err(e) => {
                tracing::error!("    ❌ Failed to add column {}: {}", object, e.detailed_message());
                report.columns.failed += 1;
                report.record_failure(ObjectKind::Column, &object, &e);
                return self.check_session(session, e).await;
            }
        }

        let Some(comment) = column.effective_comment() else {
            return Ok(());
        };

        match self
            .mutator
            .set_column_comment(session, table, &column.name, &column.type_expr, comment)
            .await
        {
            Ok(()) => {
                tracing::info!("    📝 Comment set on {}", object);
                report.comments_set += 1;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    "    ⚠️ Column {} added but comment failed: {}",
                    object,
                    e.detailed_message()
                );
                report.comments_failed += 1;
                report.record_failure(ObjectKind::ColumnComment, &object, &e);
                self.check_session(session, e).await
            }
        }
    }
}
