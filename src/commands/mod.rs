//! Command handlers module.
//!
//! - `io.rs`: export, import and export listing
//! - `config.rs`: configuration display

mod config;
mod io;

pub use config::cmd_config;
pub use io::{cmd_export, cmd_exports, cmd_import};
