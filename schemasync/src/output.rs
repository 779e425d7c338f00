//! Report and discovery output on stdout and to files.

use crate::OutputFormat;
use schemasync_core::{Result, RunReport, SchemaSyncError, discovery::Discovered};
use std::path::Path;

/// Prints the run summary.
pub fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{}", report.render_text()),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }
    Ok(())
}

/// Writes the JSON report to `path`.
pub async fn save_report(report: &RunReport, path: &Path) -> Result<()> {
    let json = report.to_json()?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| SchemaSyncError::Io {
            context: format!("Failed to write report to {}", path.display()),
            source: e,
        })
}

/// Prints discovered database names, one per line, or as a JSON document.
pub fn print_databases(discovered: &Discovered, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for database in &discovered.databases {
                println!("{}", database);
            }
        }
        OutputFormat::Json => {
            let document = serde_json::json!({
                "strategy": discovered.strategy.to_string(),
                "used_fallback": discovered.used_fallback,
                "databases": discovered.databases,
            });
            let json = serde_json::to_string_pretty(&document).map_err(|e| {
                SchemaSyncError::Serialization {
                    context: "discovered databases".to_string(),
                    source: e,
                }
            })?;
            println!("{}", json);
        }
    }
    Ok(())
}
