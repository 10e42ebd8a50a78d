//! Record stores.
//!
//! Backends implementing the capabilities in [`crate::io::traits`]:
//!
//! | Backend | Hits | Export jobs | Notes |
//! |---------|------|-------------|-------|
//! | `SQLite` | [`SqliteHitStore`] | [`SqliteExportStore`] | Buffered ingest, WAL mode |
//! | Memory | [`MemoryHitStore`] | - | Tests and dry runs |

// Dropping connection guards slightly earlier provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

mod lock;
pub mod memory;
pub mod sqlite;

pub use lock::acquire_lock;
pub use memory::MemoryHitStore;
pub use sqlite::{SqliteExportStore, SqliteHitStore};
