//! Capabilities the export and import engines need from storage.
//!
//! The engines only see these traits, so any backend (or a test fake) can be
//! plugged in:
//!
//! | Trait | Used by | Implemented by |
//! |-------|---------|----------------|
//! | [`HitSource`] | export | `SqliteHitStore`, `MemoryHitStore` |
//! | [`HitSink`] | import | `SqliteHitStore`, `MemoryHitStore` |
//! | [`ExportJobStore`] | export | `SqliteExportStore` |

use crate::Result;
use crate::models::{ExportJob, Hit};
use uuid::Uuid;

/// One page of hits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HitBatch {
    /// Hits in ascending ID order.
    pub hits: Vec<Hit>,
    /// ID of the last hit in the page; the requested `after_id` if empty.
    pub last_id: i64,
}

impl HitBatch {
    /// Returns whether the page is empty, which signals the end of data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Paginated read access to a site's hits.
pub trait HitSource: Send + Sync {
    /// Returns at most `limit` hits of `site_id` with an ID greater than
    /// `after_id`, in ascending ID order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn list_after(&self, site_id: i64, after_id: i64, limit: usize) -> Result<HitBatch>;
}

/// Write access for reconstructed hits.
pub trait HitSink: Send + Sync {
    /// Submits one hit. Backends may buffer it until [`HitSink::flush`].
    ///
    /// # Errors
    ///
    /// Returns an error if the hit cannot be accepted.
    fn ingest(&self, hit: Hit) -> Result<()>;

    /// Deletes every stored hit of `site_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails. The deletion may be partially
    /// applied.
    fn wipe_all(&self, site_id: i64) -> Result<()>;

    /// Mints a fresh session identity.
    fn session_id(&self) -> Uuid {
        Uuid::new_v4()
    }

    /// Writes out buffered hits.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered hits cannot be persisted.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Persistence of export job records.
pub trait ExportJobStore: Send + Sync {
    /// Stores a new job and returns it with its assigned ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the job cannot be stored.
    fn create(&self, job: ExportJob) -> Result<ExportJob>;

    /// Loads a job of `site_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, site_id: i64, id: i64) -> Result<Option<ExportJob>>;

    /// Lists recent jobs of `site_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn list(&self, site_id: i64) -> Result<Vec<ExportJob>>;

    /// Records a fatal error for `job`.
    ///
    /// # Errors
    ///
    /// Returns an error if the job cannot be updated.
    fn mark_failed(&self, job: &ExportJob) -> Result<()>;

    /// Records the terminal state of `job`: rows, checkpoint, finish time and
    /// either its size and hash or its verification error.
    ///
    /// # Errors
    ///
    /// Returns an error if the job cannot be updated.
    fn mark_finished(&self, job: &ExportJob) -> Result<()>;
}
