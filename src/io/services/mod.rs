//! Export and import engines.
//!
//! Both run as one sequential pass on the calling thread; callers put them on
//! a blocking task.

pub mod export;
pub mod import;

pub use export::{ExportOptions, ExportService, hash_file};
pub use import::{ImportOptions, ImportService, ImportSummary, ImportTarget, SessionRemap};
