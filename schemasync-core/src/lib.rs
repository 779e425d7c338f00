//! Core engine for schemasync.
//!
//! Given a set of MySQL/MariaDB or PostgreSQL databases on one server, this
//! crate idempotently ensures that configured tables and columns exist,
//! creating them only when absent and never altering or dropping anything
//! that is already there.
//!
//! # Pipeline
//! 1. [`discovery`] resolves the target databases (file, reference table, all)
//! 2. [`filter`] narrows table candidates by inclusion/exclusion patterns
//! 3. [`existence`] checks each table or column in the catalog
//! 4. [`mutator`] issues additive DDL for whatever is missing
//! 5. [`reconcile`] drives the above per database and folds a [`report::RunReport`]
//!
//! # Security Guarantees
//! - Passwords are zeroized on drop and never logged or displayed
//! - Connection URLs are redacted in every error message
//! - User-supplied DDL is rejected unless it is purely additive

pub mod adapters;
pub mod config;
pub mod dialect;
pub mod discovery;
pub mod error;
pub mod existence;
pub mod filter;
pub mod logging;
pub mod models;
pub mod mutator;
pub mod reconcile;
pub mod report;

// Re-export commonly used types
pub use adapters::{DatabaseDriver, DatabaseSession, create_driver};
pub use config::{ConnectionConfig, ServerCredentials, StrategyKind, SyncConfig};
pub use discovery::{Discovered, DiscoveryStrategy};
pub use error::{ConnectionErrorKind, DdlErrorKind, Result, SchemaSyncError};
pub use filter::{FilterOutcome, FilterRule};
pub use models::{ColumnSpec, Engine, TableBatch, TableSpec};
pub use reconcile::{ColumnPlan, ReconcileOptions, ReconcilePlan, Reconciler};
pub use report::{DatabaseReport, ObjectCounts, ObjectFailure, ObjectKind, RunReport};
