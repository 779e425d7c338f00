//! Additive schema changes.
//!
//! Every statement issued here creates or annotates; nothing is dropped,
//! renamed or rewritten. User-supplied table DDL is re-checked with
//! [`ensure_additive`] immediately before execution.

use crate::Result;
use crate::adapters::DatabaseSession;
use crate::dialect::{Dialect, ensure_additive};

/// Issues CREATE/ALTER ADD/COMMENT statements through a session.
#[derive(Debug, Clone)]
pub struct SchemaMutator {
    dialect: Dialect,
}

impl SchemaMutator {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Runs the CREATE TABLE statement (plus any index statements) for `table`.
    ///
    /// # Errors
    /// Returns a configuration error for non-additive DDL, otherwise the
    /// classified DDL error from the server.
    pub async fn create_table(
        &self,
        session: &mut dyn DatabaseSession,
        table: &str,
        ddl: &str,
    ) -> Result<()> {
        ensure_additive(ddl)?;
        session.execute_ddl(table, ddl).await
    }

    /// Runs a multi-statement script that creates several tables.
    pub async fn run_script(
        &self,
        session: &mut dyn DatabaseSession,
        label: &str,
        script: &str,
    ) -> Result<()> {
        ensure_additive(script)?;
        session.execute_ddl(label, script).await
    }

    /// `ALTER TABLE .. ADD COLUMN ..`
    pub async fn add_column(
        &self,
        session: &mut dyn DatabaseSession,
        table: &str,
        column: &str,
        type_expr: &str,
    ) -> Result<()> {
        let sql = self.dialect.add_column(table, column, type_expr);
        session
            .execute_ddl(&format!("{}.{}", table, column), &sql)
            .await
    }

    /// Sets a column comment without changing the column's definition.
    pub async fn set_column_comment(
        &self,
        session: &mut dyn DatabaseSession,
        table: &str,
        column: &str,
        type_expr: &str,
        comment: &str,
    ) -> Result<()> {
        let sql = self.dialect.column_comment(table, column, type_expr, comment);
        session
            .execute_ddl(&format!("{}.{}", table, column), &sql)
            .await
    }

    pub async fn set_table_comment(
        &self,
        session: &mut dyn DatabaseSession,
        table: &str,
        comment: &str,
    ) -> Result<()> {
        let sql = self.dialect.table_comment(table, comment);
        session.execute_ddl(table, &sql).await
    }
}
