//! Engine-specific DDL text: identifier quoting, comment literals and the
//! additive statements the mutator issues.

use crate::models::Engine;
use crate::{Result, error::SchemaSyncError};
use regex::Regex;
use std::sync::OnceLock;

/// SQL dialect for one engine (and, for PostgreSQL, one schema).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    engine: Engine,
    schema: Option<String>,
}

impl Dialect {
    /// MySQL/MariaDB dialect; statements target the session's current database.
    pub fn mysql() -> Self {
        Self {
            engine: Engine::MySql,
            schema: None,
        }
    }

    /// PostgreSQL dialect; statements are qualified with `schema`.
    pub fn postgres(schema: impl Into<String>) -> Self {
        Self {
            engine: Engine::Postgres,
            schema: Some(schema.into()),
        }
    }

    /// Dialect for `engine`, using `schema` where the engine needs one.
    pub fn for_engine(engine: Engine, schema: &str) -> Self {
        match engine {
            Engine::MySql => Self::mysql(),
            Engine::Postgres => Self::postgres(schema),
        }
    }

    /// Engine this dialect targets.
    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// Quotes an identifier, doubling any embedded quote character.
    pub fn quote_ident(&self, identifier: &str) -> String {
        match self.engine {
            Engine::MySql => format!("`{}`", identifier.replace('`', "``")),
            Engine::Postgres => format!("\"{}\"", identifier.replace('"', "\"\"")),
        }
    }

    /// Quotes a string literal for use in a COMMENT clause.
    pub fn quote_literal(&self, value: &str) -> String {
        match self.engine {
            Engine::MySql => format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''")),
            Engine::Postgres => format!("'{}'", value.replace('\'', "''")),
        }
    }

    /// Table reference, schema-qualified where the dialect has a schema.
    pub fn table_ref(&self, table: &str) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", self.quote_ident(schema), self.quote_ident(table)),
            None => self.quote_ident(table),
        }
    }

    /// `ALTER TABLE .. ADD COLUMN ..`
    pub fn add_column(&self, table: &str, column: &str, type_expr: &str) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.table_ref(table),
            self.quote_ident(column),
            type_expr.trim()
        )
    }

    /// Comment-only column change.
    ///
    /// MySQL restates the column type because `MODIFY COLUMN` replaces the
    /// whole definition; the type passed must be the one just added.
    pub fn column_comment(&self, table: &str, column: &str, type_expr: &str, comment: &str) -> String {
        match self.engine {
            Engine::MySql => format!(
                "ALTER TABLE {} MODIFY COLUMN {} {} COMMENT {}",
                self.table_ref(table),
                self.quote_ident(column),
                type_expr.trim(),
                self.quote_literal(comment)
            ),
            Engine::Postgres => format!(
                "COMMENT ON COLUMN {}.{} IS {}",
                self.table_ref(table),
                self.quote_ident(column),
                self.quote_literal(comment)
            ),
        }
    }

    /// Table comment change.
    pub fn table_comment(&self, table: &str, comment: &str) -> String {
        match self.engine {
            Engine::MySql => format!(
                "ALTER TABLE {} COMMENT = {}",
                self.table_ref(table),
                self.quote_literal(comment)
            ),
            Engine::Postgres => format!(
                "COMMENT ON TABLE {} IS {}",
                self.table_ref(table),
                self.quote_literal(comment)
            ),
        }
    }
}

struct DdlPatterns {
    literals: Regex,
    comments: Regex,
    leading_keyword: Regex,
    alter_destructive: Regex,
    or_replace: Regex,
}

impl DdlPatterns {
    fn instance() -> &'static Self {
        static PATTERNS: OnceLock<DdlPatterns> = OnceLock::new();
        PATTERNS.get_or_init(|| Self {
            literals: Regex::new(r#"'(?:[^'\\]|\\.|'')*'|"(?:[^"]|"")*"|`(?:[^`]|``)*`"#)
                .expect("literal pattern compiles"),
            comments: Regex::new(r"(?s)--[^\n]*|#[^\n]*|/\*.*?\*/").expect("comment pattern compiles"),
            leading_keyword: Regex::new(r"^\s*([A-Za-z]+)").expect("keyword pattern compiles"),
            alter_destructive: Regex::new(r"(?i)\b(DROP|CHANGE|MODIFY|RENAME|TRUNCATE)\b")
                .expect("alter pattern compiles"),
            or_replace: Regex::new(r"(?i)\bOR\s+REPLACE\b").expect("replace pattern compiles"),
        })
    }
}

/// Rejects user-supplied DDL that could drop, rewrite or delete anything.
///
/// Every statement in `sql` must start with `CREATE`, `ALTER`, `COMMENT` or
/// `SET`; `ALTER` statements may not drop, change, modify or rename, and
/// `CREATE OR REPLACE` is refused. Quoted text and SQL comments are ignored.
///
/// # Errors
/// Returns a configuration error naming the offending statement's keyword.
pub fn ensure_additive(sql: &str) -> Result<()> {
    let patterns = DdlPatterns::instance();
    let without_literals = patterns.literals.replace_all(sql, "''");
    let stripped = patterns.comments.replace_all(&without_literals, " ");

    let mut statements = 0usize;
    for statement in stripped.split(';').filter(|s| !s.trim().is_empty()) {
        statements += 1;
        let keyword = patterns
            .leading_keyword
            .captures(statement)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_ascii_uppercase())
            .unwrap_or_default();

        match keyword.as_str() {
            "CREATE" if patterns.or_replace.is_match(statement) => {
                return Err(SchemaSyncError::configuration(
                    "DDL must be additive: CREATE OR REPLACE is not allowed",
                ));
            }
            "CREATE" | "COMMENT" | "SET" => {}
            "ALTER" => {
                if let Some(found) = patterns.alter_destructive.find(statement) {
                    return Err(SchemaSyncError::configuration(format!(
                        "DDL must be additive: ALTER ... {} is not allowed",
                        found.as_str().to_ascii_uppercase()
                    )));
                }
            }
            other => {
                return Err(SchemaSyncError::configuration(format!(
                    "DDL must be additive: statements starting with '{}' are not allowed",
                    if other.is_empty() { "<unknown>" } else { other }
                )));
            }
        }
    }

    if statements == 0 {
        return Err(SchemaSyncError::configuration("DDL text is empty"));
    }

    Ok(())
}
