//! # Hitport
//!
//! Export and import of an analytics site's hit history.
//!
//! Hitport serializes every recorded hit of a site into a gzip-compressed,
//! SHA-256 checksummed CSV artifact, and reconstructs hits from such an
//! artifact back into live storage.
//!
//! ## Features
//!
//! - Paginated export by ascending hit ID, resumable from any checkpoint
//! - Versioned, positional row format shared by both directions
//! - Import with per-row fault isolation and a bounded fault summary
//! - Session identities remapped per import run
//! - Pluggable record stores (`SQLite`, in-memory) and completion notifiers
//!
//! ## Example
//!
//! ```rust,ignore
//! use hitport::io::{ExportService, ImportService};
//!
//! let (mut job, file) = exports.create_job(site_id, 0, &dir)?;
//! exports.run(&mut job, file, false)?;
//!
//! let summary = imports.run(&ImportTarget::new(site_id), File::open(&job.path)?, false, false)?;
//! println!("imported {} hits", summary.imported);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod io;
pub mod models;
pub mod notify;
pub mod observability;
pub mod storage;

pub use config::HitportConfig;
pub use io::{ExportService, FaultGroup, ImportService, ImportSummary, ImportTarget};
pub use models::{ExportJob, ExportStatus, Hit, RefScheme, ScreenSize, SessionRef};
pub use notify::{CompletionNotifier, Notification, NotificationKind};
pub use storage::{MemoryHitStore, SqliteExportStore, SqliteHitStore};

/// Error type for hitport operations.
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Bad CLI arguments, malformed configuration values |
/// | `OperationFailed` | I/O, compression, `SQLite` or CSV failures |
/// | `UnsupportedVersion` | An import artifact carries a different schema version |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - Artifact files cannot be created, written, synced or hashed
    /// - `SQLite` queries fail
    /// - The import stream cannot be decompressed or read
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The artifact header does not carry the expected schema version.
    #[error("wrong version of CSV database: {found} (expected: {expected})")]
    UnsupportedVersion {
        /// Version tag found in the header (first character of the first cell).
        found: String,
        /// Version tag this build reads and writes.
        expected: &'static str,
    },
}

impl Error {
    /// Shorthand for [`Error::OperationFailed`].
    pub fn operation(operation: &str, cause: impl ToString) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for hitport operations.
pub type Result<T> = std::result::Result<T, Error>;
