//! Configuration types for connecting to a server and describing a run.
//!
//! # Module Structure
//! - `credentials`: Server location and login, with a zeroized password
//! - `connection`: Timeouts, pool size and PostgreSQL schema
//! - `sync`: The `schemasync.toml` file and everything derived from it

mod connection;
mod credentials;
mod sync;

pub use connection::ConnectionConfig;
pub use credentials::ServerCredentials;
pub use sync::{
    ColumnPlanConfig, DiscoveryConfig, MAX_CONCURRENCY, PASSWORD_ENV, RunSection, ServerSection,
    StrategyKind, SyncConfig,
};
