//! `SQLite` stores.
//!
//! ## Module Structure
//!
//! - [`connection`]: connection opening, pragmas, transactions
//! - [`metrics`]: operation metrics shared by both stores
//! - [`hits`]: the hit store ([`SqliteHitStore`])
//! - [`exports`]: the export job store ([`SqliteExportStore`])
//!
//! Both stores may share one database file; each keeps its own connection.

mod connection;
mod exports;
mod hits;
mod metrics;

pub use connection::{
    BUSY_TIMEOUT_MS, configure_connection, in_transaction, open_connection, open_in_memory,
};
pub use exports::{LIST_WINDOW, SqliteExportStore};
pub use hits::{DEFAULT_INGEST_BUFFER, SqliteHitStore};
pub use metrics::{record_operation_metrics, timed};
