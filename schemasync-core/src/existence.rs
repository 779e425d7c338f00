//! Catalog existence checks run before any mutation.

use crate::Result;
use crate::adapters::DatabaseSession;

/// Checks whether `table` exists in the session's database.
pub async fn table_exists(session: &mut dyn DatabaseSession, table: &str) -> Result<bool> {
    let exists = session.table_exists(table).await?;
    tracing::debug!(
        "{}.{}: table {}",
        session.database(),
        table,
        if exists { "present" } else { "absent" }
    );
    Ok(exists)
}

/// Checks whether `table.column` exists; an absent table yields `false`.
pub async fn column_exists(
    session: &mut dyn DatabaseSession,
    table: &str,
    column: &str,
) -> Result<bool> {
    let exists = session.column_exists(table, column).await?;
    tracing::debug!(
        "{}.{}.{}: column {}",
        session.database(),
        table,
        column,
        if exists { "present" } else { "absent" }
    );
    Ok(exists)
}

/// Probes several tables in order, keeping each result separate.
pub async fn probe_tables(
    session: &mut dyn DatabaseSession,
    tables: &[String],
) -> Vec<(String, Result<bool>)> {
    let mut results = Vec::with_capacity(tables.len());
    for table in tables {
        let result = table_exists(session, table).await;
        results.push((table.clone(), result));
    }
    results
}
