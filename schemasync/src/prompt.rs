//! Interactive prompts: password entry and strategy selection.

use schemasync_core::{Result, SchemaSyncError, StrategyKind};
use std::io::{self, BufRead, IsTerminal, Write};

/// Reads the database password without echo.
pub fn read_password() -> Result<String> {
    let password = rpassword::prompt_password("Database password: ").map_err(|e| {
        SchemaSyncError::configuration(format!("Failed to read password: {}", e))
    })?;

    if password.is_empty() {
        return Err(SchemaSyncError::configuration("Password cannot be empty"));
    }

    Ok(password)
}

/// Asks which discovery strategy to use when none is configured.
///
/// Only prompts on an interactive terminal; otherwise a strategy must be
/// given in the config file or with `--strategy`.
pub fn choose_strategy() -> Result<StrategyKind> {
    if !io::stdin().is_terminal() {
        return Err(SchemaSyncError::configuration(
            "no discovery strategy configured; set discovery.strategy or pass --strategy",
        ));
    }

    eprintln!("Select how to find target databases:");
    eprintln!("  1) file             read names from discovery.database_list");
    eprintln!("  2) reference-table  databases containing discovery.reference_table");
    eprintln!("  3) all              every non-system database");
    eprint!("Choice [1-3]: ");
    io::stderr().flush().map_err(|e| {
        SchemaSyncError::configuration(format!("Failed to flush prompt: {}", e))
    })?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).map_err(|e| {
        SchemaSyncError::configuration(format!("Failed to read strategy choice: {}", e))
    })?;

    parse_choice(&line)
}

/// Accepts a menu number or a strategy name.
pub fn parse_choice(input: &str) -> Result<StrategyKind> {
    match input.trim() {
        "1" => Ok(StrategyKind::File),
        "2" => Ok(StrategyKind::ReferenceTable),
        "3" => Ok(StrategyKind::All),
        other => other.parse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("1\n").unwrap(), StrategyKind::File);
        assert_eq!(parse_choice(" 2 ").unwrap(), StrategyKind::ReferenceTable);
        assert_eq!(parse_choice("3").unwrap(), StrategyKind::All);
        assert_eq!(parse_choice("all\n").unwrap(), StrategyKind::All);
        assert!(parse_choice("4").is_err());
        assert!(parse_choice("").is_err());
    }
}
