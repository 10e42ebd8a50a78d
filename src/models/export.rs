//! Export job records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of the error message recorded for artifacts that were fully written
/// but could not be synced, measured or hashed.
pub const UNVERIFIED_PREFIX: &str = "unverified artifact: ";

/// Lifecycle state of an export job, derived from its recorded fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    /// Created and not yet terminal.
    Running,
    /// Artifact written, hashed and measured.
    Finished,
    /// Aborted; the partial artifact was deleted.
    Failed,
    /// All rows were written but the artifact could not be verified.
    /// The file is left in place without a hash and must not be trusted.
    Unverified,
}

impl ExportStatus {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Unverified => "unverified",
        }
    }

    /// Returns whether the job will not change anymore.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One export run of a site's hits into an artifact file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportJob {
    /// Job ID.
    pub id: i64,
    /// Site being exported.
    pub site_id: i64,
    /// Hit ID the export started after.
    pub start_from_hit_id: i64,
    /// Last hit ID written; the checkpoint to resume from.
    pub last_hit_id: Option<i64>,
    /// Artifact path.
    pub path: PathBuf,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job finished; absent until terminal.
    pub finished_at: Option<DateTime<Utc>>,
    /// Number of hits written; absent until terminal.
    pub num_rows: Option<u64>,
    /// Artifact size in MiB with one decimal, set on success.
    pub size: Option<String>,
    /// Artifact digest (`sha256-<hex>`), set on success.
    pub hash: Option<String>,
    /// First fatal error, if any.
    pub error: Option<String>,
}

impl ExportJob {
    /// Creates a job that has not been stored yet.
    #[must_use]
    pub fn new(site_id: i64, start_from_hit_id: i64, path: PathBuf, created_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            site_id,
            start_from_hit_id,
            last_hit_id: None,
            path,
            created_at,
            finished_at: None,
            num_rows: None,
            size: None,
            hash: None,
            error: None,
        }
    }

    /// Returns the artifact file name for a new job.
    #[must_use]
    pub fn file_name(site_id: i64, created_at: DateTime<Utc>, start_from_hit_id: i64) -> String {
        format!(
            "hitport-export-{site_id}-{}-{start_from_hit_id}.csv.gz",
            created_at.format("%Y%m%dT%H%M%SZ")
        )
    }

    /// Returns the artifact path for a new job inside `dir`.
    #[must_use]
    pub fn artifact_path(
        dir: &Path,
        site_id: i64,
        created_at: DateTime<Utc>,
        start_from_hit_id: i64,
    ) -> PathBuf {
        dir.join(Self::file_name(site_id, created_at, start_from_hit_id))
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn status(&self) -> ExportStatus {
        match (&self.error, &self.finished_at, &self.hash) {
            (Some(_), Some(_), _) => ExportStatus::Unverified,
            (Some(_), None, _) => ExportStatus::Failed,
            (None, Some(_), Some(_)) => ExportStatus::Finished,
            (None, _, _) => ExportStatus::Running,
        }
    }

    /// Returns the hit ID a follow-up export should start from.
    #[must_use]
    pub fn resume_from(&self) -> i64 {
        self.last_hit_id.unwrap_or(self.start_from_hit_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job() -> ExportJob {
        let created = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        ExportJob::new(7, 0, PathBuf::from("/tmp/x.csv.gz"), created)
    }

    #[test]
    fn test_file_name() {
        let created = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            ExportJob::file_name(7, created, 120),
            "hitport-export-7-20240309T140507Z-120.csv.gz"
        );
    }

    #[test]
    fn test_status_transitions() {
        let mut job = job();
        assert_eq!(job.status(), ExportStatus::Running);
        assert!(!job.status().is_terminal());

        job.finished_at = Some(Utc::now());
        job.hash = Some("sha256-00".to_string());
        assert_eq!(job.status(), ExportStatus::Finished);

        job.hash = None;
        job.error = Some(format!("{UNVERIFIED_PREFIX}sync failed"));
        assert_eq!(job.status(), ExportStatus::Unverified);

        job.finished_at = None;
        assert_eq!(job.status(), ExportStatus::Failed);
        assert!(job.status().is_terminal());
    }

    #[test]
    fn test_resume_from() {
        let mut job = job();
        job.start_from_hit_id = 10;
        assert_eq!(job.resume_from(), 10);
        job.last_hit_id = Some(42);
        assert_eq!(job.resume_from(), 42);
    }
}
