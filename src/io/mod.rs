//! Export and import of hit artifacts.
//!
//! # Architecture
//!
//! - **Row codec** ([`row`]) maps a [`Hit`](crate::models::Hit) to a fixed,
//!   versioned row and back, validating on the way in
//! - **Artifact streams** ([`artifact`]) wrap rows in gzip-compressed CSV
//! - **Fault group** ([`faults`]) bounds the detail kept about rejected rows
//! - **Traits** ([`traits`]) are the storage capabilities the engines need
//! - **Services** orchestrate export and import runs
//!
//! # Artifact Format
//!
//! | Line | Content |
//! |------|---------|
//! | 1 | Header; the first cell is prefixed with the schema version (`1Path`) |
//! | 2.. | One hit per row, 12 columns in fixed order |
//!
//! # Examples
//!
//! ```rust,ignore
//! use hitport::io::{ExportService, ImportService, ImportTarget};
//! use std::fs::File;
//!
//! let (mut job, file) = exports.create_job(site_id, 0, &dir)?;
//! exports.run(&mut job, file, false)?;
//!
//! let summary = imports.run(&ImportTarget::new(other_site), File::open(&job.path)?, true, false)?;
//! println!("Imported {} hits, {} rejected", summary.imported, summary.fault_count);
//! ```

pub mod artifact;
pub mod faults;
pub mod row;
pub mod services;
pub mod throttle;
pub mod traits;
pub mod validation;

// Re-exports for convenience
pub use artifact::{ArtifactReader, ArtifactWriter, RowRead};
pub use faults::{Fault, FaultGroup};
pub use row::{COLUMN_COUNT, COLUMNS, EXPORT_VERSION, ExportRow};
pub use services::{
    ExportOptions, ExportService, ImportOptions, ImportService, ImportSummary, ImportTarget,
    SessionRemap, hash_file,
};
pub use throttle::Throttle;
pub use traits::{ExportJobStore, HitBatch, HitSink, HitSource};
pub use validation::{RowError, RowValidator, ValidationIssue, ValidationIssues};
