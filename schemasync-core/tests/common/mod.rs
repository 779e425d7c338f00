//! In-memory server used by the integration tests.
//!
//! Interprets the small DDL subset schemasync emits (`CREATE TABLE`,
//! `CREATE INDEX`, `ALTER TABLE .. ADD COLUMN`, comment statements) and
//! supports failure injection per database and statement.

#![allow(dead_code)]

use async_trait::async_trait;
use schemasync_core::dialect::Dialect;
use schemasync_core::error::{ConnectionErrorKind, DdlErrorKind};
use schemasync_core::{DatabaseDriver, DatabaseSession, Engine, Result, SchemaSyncError};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct FakeDatabase {
    tables: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFailure {
    Connection,
    Query,
}

#[derive(Debug)]
struct DdlFault {
    database: String,
    needle: String,
    kind: DdlErrorKind,
}

#[derive(Debug, Default)]
struct State {
    order: Vec<String>,
    databases: BTreeMap<String, FakeDatabase>,
    unreachable: HashSet<String>,
    hidden: HashSet<(String, String)>,
    faults: Vec<DdlFault>,
    catalog_failure: Option<CatalogFailure>,
    dead: HashSet<String>,
    ddl_log: Vec<(String, String)>,
    open_sessions: usize,
    max_open_sessions: usize,
    opened: Vec<String>,
}

/// Shared handle to a fake server; clones see the same state.
#[derive(Debug, Clone)]
pub struct FakeServer {
    engine: Engine,
    state: Arc<Mutex<State>>,
    open_delay: Duration,
}

impl FakeServer {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            state: Arc::default(),
            open_delay: Duration::ZERO,
        }
    }

    /// Each `open` sleeps this long, letting concurrent opens overlap.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_database(&self, name: &str) {
        let mut state = self.state();
        if !state.databases.contains_key(name) {
            state.order.push(name.to_string());
            state.databases.insert(name.to_string(), FakeDatabase::default());
        }
    }

    pub fn add_table(&self, database: &str, table: &str, columns: &[&str]) {
        self.add_database(database);
        let mut state = self.state();
        let db = state.databases.get_mut(database).unwrap();
        db.tables.insert(
            table.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
    }

    /// The database refuses connections.
    pub fn make_unreachable(&self, database: &str) {
        self.state().unreachable.insert(database.to_string());
    }

    /// `table` exists but the first existence check misses it.
    pub fn hide_table_once(&self, database: &str, table: &str) {
        self.state()
            .hidden
            .insert((database.to_string(), table.to_string()));
    }

    /// Any statement in `database` containing `needle` fails with `kind`.
    /// `ConnectionLost` also kills the session.
    pub fn fail_ddl(&self, database: &str, needle: &str, kind: DdlErrorKind) {
        self.state().faults.push(DdlFault {
            database: database.to_string(),
            needle: needle.to_string(),
            kind,
        });
    }

    /// Server-level catalog queries fail.
    pub fn fail_catalog(&self, failure: CatalogFailure) {
        self.state().catalog_failure = Some(failure);
    }

    pub fn tables(&self, database: &str) -> Vec<String> {
        self.state()
            .databases
            .get(database)
            .map(|db| db.tables.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn columns(&self, database: &str, table: &str) -> Vec<String> {
        self.state()
            .databases
            .get(database)
            .and_then(|db| db.tables.get(table).cloned())
            .unwrap_or_default()
    }

    /// Every statement executed, as `(database, sql)`.
    pub fn ddl_log(&self) -> Vec<(String, String)> {
        self.state().ddl_log.clone()
    }

    pub fn ddl_count(&self) -> usize {
        self.state().ddl_log.len()
    }

    pub fn open_sessions(&self) -> usize {
        self.state().open_sessions
    }

    pub fn max_open_sessions(&self) -> usize {
        self.state().max_open_sessions
    }

    /// Databases in the order sessions were opened.
    pub fn opened(&self) -> Vec<String> {
        self.state().opened.clone()
    }

    pub fn driver(&self) -> Arc<dyn DatabaseDriver> {
        Arc::new(self.clone())
    }

    fn catalog_error(&self) -> Option<SchemaSyncError> {
        self.state().catalog_failure.map(|failure| match failure {
            CatalogFailure::Connection => SchemaSyncError::connection_failed(
                ConnectionErrorKind::NetworkUnreachable,
                "fake server is down",
                std::io::Error::other("connection refused"),
            ),
            CatalogFailure::Query => SchemaSyncError::query_failed(
                "fake catalog",
                std::io::Error::other("catalog unavailable"),
            ),
        })
    }
}

#[async_trait]
impl DatabaseDriver for FakeServer {
    fn engine(&self) -> Engine {
        self.engine
    }

    fn dialect(&self) -> Dialect {
        Dialect::for_engine(self.engine, "public")
    }

    async fn ping(&self) -> bool {
        self.state().catalog_failure != Some(CatalogFailure::Connection)
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        if let Some(e) = self.catalog_error() {
            return Err(e);
        }
        Ok(self.state().order.clone())
    }

    async fn databases_with_table(&self, table: &str) -> Result<Vec<String>> {
        if let Some(e) = self.catalog_error() {
            return Err(e);
        }
        let state = self.state();
        Ok(state
            .order
            .iter()
            .filter(|name| state.databases[*name].tables.contains_key(table))
            .cloned()
            .collect())
    }

    async fn open(&self, database: &str) -> Result<Box<dyn DatabaseSession>> {
        {
            let state = self.state();
            if state.unreachable.contains(database) {
                return Err(SchemaSyncError::connection_failed(
                    ConnectionErrorKind::NetworkUnreachable,
                    format!("cannot reach {}", database),
                    std::io::Error::other("connection refused"),
                ));
            }
            if !state.databases.contains_key(database) {
                return Err(SchemaSyncError::connection_failed(
                    ConnectionErrorKind::DatabaseNotFound,
                    format!("unknown database {}", database),
                    std::io::Error::other("no such database"),
                ));
            }
        }

        {
            let mut state = self.state();
            state.open_sessions += 1;
            state.max_open_sessions = state.max_open_sessions.max(state.open_sessions);
            state.opened.push(database.to_string());
        }

        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }

        Ok(Box::new(FakeSession {
            server: self.clone(),
            database: database.to_string(),
        }))
    }

    async fn close(&self) {}
}

pub struct FakeSession {
    server: FakeServer,
    database: String,
}

impl FakeSession {
    fn lost(&self) -> SchemaSyncError {
        SchemaSyncError::connection_failed(
            ConnectionErrorKind::Other,
            format!("session to {} lost", self.database),
            std::io::Error::other("broken pipe"),
        )
    }

    fn is_dead(&self) -> bool {
        self.server.state().dead.contains(&self.database)
    }
}

fn clean_ident(token: &str) -> String {
    let token = token.split('(').next().unwrap_or(token);
    token
        .rsplit('.')
        .next()
        .unwrap_or(token)
        .trim_matches(|c| c == '`' || c == '"')
        .to_string()
}

fn ddl_error(kind: DdlErrorKind, object: &str, message: &str) -> SchemaSyncError {
    SchemaSyncError::ddl_failed(kind, object, std::io::Error::other(message.to_string()))
}

fn apply_statement(db: &mut FakeDatabase, object: &str, statement: &str) -> Result<()> {
    let tokens: Vec<&str> = statement.split_whitespace().collect();
    let upper: Vec<String> = tokens.iter().map(|t| t.to_uppercase()).collect();
    let word = |i: usize| upper.get(i).map(String::as_str).unwrap_or("");

    match (word(0), word(1)) {
        ("CREATE", "TABLE") => {
            let (if_not_exists, name_at) = if word(2) == "IF" && word(3) == "NOT" && word(4) == "EXISTS" {
                (true, 5)
            } else {
                (false, 2)
            };
            let name = clean_ident(tokens.get(name_at).copied().unwrap_or(""));
            if db.tables.contains_key(&name) {
                if if_not_exists {
                    return Ok(());
                }
                return Err(ddl_error(DdlErrorKind::AlreadyExists, object, "table exists"));
            }
            db.tables.insert(name, Vec::new());
            Ok(())
        }
        ("CREATE", "INDEX") | ("CREATE", "UNIQUE") | ("COMMENT", "ON") => Ok(()),
        ("ALTER", "TABLE") => {
            let name = clean_ident(tokens.get(2).copied().unwrap_or(""));
            let Some(columns) = db.tables.get_mut(&name) else {
                return Err(ddl_error(DdlErrorKind::Other, object, "no such table"));
            };
            if word(3) == "ADD" && word(4) == "COLUMN" {
                let column = clean_ident(tokens.get(5).copied().unwrap_or(""));
                if columns.contains(&column) {
                    return Err(ddl_error(DdlErrorKind::AlreadyExists, object, "duplicate column"));
                }
                columns.push(column);
            }
            Ok(())
        }
        _ => Err(ddl_error(DdlErrorKind::SyntaxError, object, "unrecognised statement")),
    }
}

#[async_trait]
impl DatabaseSession for FakeSession {
    fn database(&self) -> &str {
        &self.database
    }

    async fn ping(&mut self) -> bool {
        !self.is_dead()
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        if self.is_dead() {
            return Err(self.lost());
        }
        Ok(self.server.tables(&self.database))
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        if self.is_dead() {
            return Err(self.lost());
        }
        let mut state = self.server.state();
        if state.hidden.remove(&(self.database.clone(), table.to_string())) {
            return Ok(false);
        }
        Ok(state
            .databases
            .get(&self.database)
            .is_some_and(|db| db.tables.contains_key(table)))
    }

    async fn column_exists(&mut self, table: &str, column: &str) -> Result<bool> {
        if self.is_dead() {
            return Err(self.lost());
        }
        Ok(self
            .server
            .columns(&self.database, table)
            .iter()
            .any(|c| c == column))
    }

    async fn execute_ddl(&mut self, object: &str, sql: &str) -> Result<()> {
        if self.is_dead() {
            return Err(self.lost());
        }

        let mut state = self.server.state();
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            state
                .ddl_log
                .push((self.database.clone(), statement.to_string()));

            let fault = state
                .faults
                .iter()
                .find(|f| f.database == self.database && statement.contains(&f.needle))
                .map(|f| f.kind);
            if let Some(kind) = fault {
                if kind == DdlErrorKind::ConnectionLost {
                    state.dead.insert(self.database.clone());
                }
                return Err(ddl_error(kind, object, "injected failure"));
            }

            let db = state
                .databases
                .get_mut(&self.database)
                .ok_or_else(|| self.lost())?;
            apply_statement(db, object, statement)?;
        }
        Ok(())
    }

    async fn close(self: Box<Self>) {
        let mut state = self.server.state();
        state.open_sessions = state.open_sessions.saturating_sub(1);
    }
}
