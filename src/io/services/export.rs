//! Hit export service.
//!
//! Streams every hit of a site, in ascending ID order, into a compressed
//! artifact and records the outcome on an [`ExportJob`].

#![allow(clippy::cast_precision_loss)]

use crate::io::artifact::ArtifactWriter;
use crate::io::row::ExportRow;
use crate::io::throttle::Throttle;
use crate::io::traits::{ExportJobStore, HitSource};
use crate::models::{ExportJob, ExportStatus, UNVERIFIED_PREFIX};
use crate::notify::{CompletionNotifier, Notification};
use crate::{Error, Result};
use chrono::{SubsecRound, Utc};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Default number of hits fetched per batch.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Default pause between batches in production mode.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(500);

/// Options for hit export.
#[derive(Debug, Clone, Copy)]
pub struct ExportOptions {
    batch_size: usize,
    throttle: Throttle,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, Throttle::disabled())
    }
}

impl ExportOptions {
    /// Creates options fetching `batch_size` hits per batch. Zero is treated
    /// as one.
    #[must_use]
    pub const fn new(batch_size: usize, throttle: Throttle) -> Self {
        Self {
            batch_size: if batch_size == 0 { 1 } else { batch_size },
            throttle,
        }
    }

    /// Sets the batch size. Zero is treated as one.
    #[must_use]
    pub const fn with_batch_size(self, batch_size: usize) -> Self {
        Self::new(batch_size, self.throttle)
    }

    /// Sets the throttle.
    #[must_use]
    pub const fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    /// Hits fetched per batch.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Pacing between batches.
    #[must_use]
    pub const fn throttle(&self) -> Throttle {
        self.throttle
    }
}

/// Service for exporting a site's hits.
pub struct ExportService {
    source: Arc<dyn HitSource>,
    jobs: Arc<dyn ExportJobStore>,
    notifier: Option<Arc<dyn CompletionNotifier>>,
    options: ExportOptions,
}

impl ExportService {
    /// Creates a new export service.
    #[must_use]
    pub fn new(source: Arc<dyn HitSource>, jobs: Arc<dyn ExportJobStore>) -> Self {
        Self {
            source,
            jobs,
            notifier: None,
            options: ExportOptions::default(),
        }
    }

    /// Sets the notifier used when a run asks for notification.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn CompletionNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Sets the export options.
    #[must_use]
    pub const fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    /// Creates a job for `site_id` and its artifact file inside `dir`.
    ///
    /// The returned file is the only handle that should write the artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created, or the
    /// job cannot be stored.
    pub fn create_job(
        &self,
        site_id: i64,
        start_from: i64,
        dir: &Path,
    ) -> Result<(ExportJob, File)> {
        std::fs::create_dir_all(dir).map_err(|e| Error::operation("create_export_dir", e))?;

        let created_at = Utc::now().trunc_subsecs(0);
        let path = ExportJob::artifact_path(dir, site_id, created_at, start_from);
        let file =
            File::create_new(&path).map_err(|e| Error::operation("create_export_file", e))?;

        let job = ExportJob::new(site_id, start_from, path.clone(), created_at);
        match self.jobs.create(job) {
            Ok(job) => Ok((job, file)),
            Err(e) => {
                drop(file);
                let _ = std::fs::remove_file(&path);
                Err(e)
            },
        }
    }

    /// Runs an export job, writing its artifact to `file`.
    ///
    /// Returns [`ExportStatus::Finished`], or [`ExportStatus::Unverified`] if
    /// all rows were written but the artifact could not be synced or hashed;
    /// in that case the artifact is kept and the job records the cause.
    ///
    /// # Errors
    ///
    /// Returns an error if reading hits or writing the artifact fails. The
    /// error is recorded on the job and the partial artifact is deleted.
    #[instrument(skip(self, job, file), fields(export.id = job.id, site.id = job.site_id))]
    pub fn run(&self, job: &mut ExportJob, file: File, notify: bool) -> Result<ExportStatus> {
        info!(start_from = job.start_from_hit_id, path = %job.path.display(), "export started");

        let writer = match self.stream_rows(job, &file) {
            Ok(writer) => writer,
            Err(e) => {
                self.abort(job, &e);
                return Err(e);
            },
        };

        let sealed = Self::seal(writer);
        drop(file);
        Ok(self.complete(job, sealed, notify))
    }

    /// Records the outcome of a run whose rows were all written.
    ///
    /// `sealed` is the artifact length, or the error that kept the artifact
    /// from being synced. The artifact is hashed from its path; if sealing or
    /// hashing fails the job is kept as [`ExportStatus::Unverified`].
    fn complete(&self, job: &mut ExportJob, sealed: Result<u64>, notify: bool) -> ExportStatus {
        let verified =
            sealed.and_then(|len| hash_file(&job.path).map(|hash| (format_size(len), hash)));
        job.finished_at = Some(Utc::now().trunc_subsecs(0));

        let status = match verified {
            Ok((size, hash)) => {
                job.size = Some(size);
                job.hash = Some(hash);
                ExportStatus::Finished
            },
            Err(e) => {
                warn!(error = %e, "export artifact could not be verified");
                job.size = None;
                job.hash = None;
                job.error = Some(format!("{UNVERIFIED_PREFIX}{e}"));
                ExportStatus::Unverified
            },
        };

        if let Err(e) = self.jobs.mark_finished(job) {
            error!(error = %e, "failed to record finished export");
        }
        metrics::counter!("export_runs_total", "status" => status.as_str()).increment(1);
        info!(
            rows = job.num_rows.unwrap_or(0),
            last_id = job.last_hit_id,
            size = job.size.as_deref().unwrap_or(""),
            status = status.as_str(),
            "export finished"
        );

        if notify && status == ExportStatus::Finished {
            if let Some(notifier) = &self.notifier {
                notifier.notify(&Notification::export_done(job));
            }
        }
        status
    }

    /// Writes the header and every batch; advances the checkpoint after each
    /// flushed batch.
    fn stream_rows<'f>(
        &self,
        job: &mut ExportJob,
        file: &'f File,
    ) -> Result<ArtifactWriter<&'f File>> {
        let mut writer = ArtifactWriter::new(file);
        writer.write_header()?;

        let mut last_id = job.start_from_hit_id;
        let mut num_rows: u64 = 0;
        let mut batches: u64 = 0;
        loop {
            let batch = self
                .source
                .list_after(job.site_id, last_id, self.options.batch_size)?;
            if batch.is_empty() {
                break;
            }

            for hit in &batch.hits {
                writer.write_row(&ExportRow::from_hit(hit))?;
            }
            writer.flush()?;

            let written = batch.hits.len() as u64;
            last_id = batch.last_id;
            num_rows += written;
            batches += 1;
            job.last_hit_id = Some(last_id);
            job.num_rows = Some(num_rows);
            metrics::counter!("export_rows_total").increment(written);
            debug!(batch = batches, rows = written, last_id, "export batch written");

            self.options.throttle.tick(batches);
        }

        job.num_rows = Some(num_rows);
        if job.last_hit_id.is_none() {
            job.last_hit_id = Some(last_id);
        }
        Ok(writer)
    }

    /// Completes the gzip stream, syncs the file and returns its length.
    fn seal(writer: ArtifactWriter<&File>) -> Result<u64> {
        let file = writer.finish()?;
        file.sync_all()
            .map_err(|e| Error::operation("sync_export", e))?;
        file.metadata()
            .map(|m| m.len())
            .map_err(|e| Error::operation("stat_export", e))
    }

    fn abort(&self, job: &mut ExportJob, cause: &Error) {
        error!(error = %cause, "export failed");
        job.error = Some(cause.to_string());
        job.size = None;
        job.hash = None;

        if let Err(e) = std::fs::remove_file(&job.path) {
            warn!(error = %e, path = %job.path.display(), "failed to remove partial export");
        }
        if let Err(e) = self.jobs.mark_failed(job) {
            error!(error = %e, "failed to record export failure");
        }
        metrics::counter!("export_runs_total", "status" => "failed").increment(1);
    }
}

/// Formats a byte length as MiB with one decimal.
fn format_size(len: u64) -> String {
    format!("{:.1}", len as f64 / 1024.0 / 1024.0)
}

/// Computes the `sha256-<hex>` digest of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::operation("hash_export", e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| Error::operation("hash_export", e))?;
    Ok(format!("sha256-{}", hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::traits::HitSink;
    use crate::models::Hit;
    use crate::notify::NotificationKind;
    use crate::storage::{MemoryHitStore, SqliteExportStore};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<NotificationKind>>);

    impl CompletionNotifier for Recorder {
        fn notify(&self, notification: &Notification) {
            self.0.lock().unwrap().push(notification.kind);
        }
    }

    fn service(store: &Arc<MemoryHitStore>) -> (ExportService, Arc<SqliteExportStore>) {
        let jobs = Arc::new(SqliteExportStore::in_memory().unwrap());
        let service = ExportService::new(store.clone(), jobs.clone())
            .with_options(ExportOptions::default().with_batch_size(2));
        (service, jobs)
    }

    #[test]
    fn test_export_records_checkpoint_and_hash() {
        let store = Arc::new(MemoryHitStore::new());
        for path in ["/a", "/b", "/c"] {
            store.ingest(Hit::new(1, path, Utc::now())).unwrap();
        }
        let dir = TempDir::new().unwrap();
        let (service, jobs) = service(&store);

        let (mut job, file) = service.create_job(1, 0, dir.path()).unwrap();
        let status = service.run(&mut job, file, false).unwrap();

        assert_eq!(status, ExportStatus::Finished);
        assert_eq!(job.num_rows, Some(3));
        assert_eq!(job.last_hit_id, Some(3));
        assert_eq!(job.hash, Some(hash_file(&job.path).unwrap()));
        assert!(job.error.is_none());

        let stored = jobs.get(1, job.id).unwrap().unwrap();
        assert_eq!(stored, job);
    }

    #[test]
    fn test_create_job_creates_artifact() {
        let store = Arc::new(MemoryHitStore::new());
        let dir = TempDir::new().unwrap();
        let (service, _) = service(&store);
        let (job, _file) = service.create_job(1, 0, dir.path()).unwrap();
        assert!(job.path.exists());
        assert!(job.path.starts_with(dir.path()));
    }

    #[test]
    fn test_hash_file_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            hash_file(&path).unwrap(),
            "sha256-ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_batch_size_zero_clamped() {
        assert_eq!(ExportOptions::default().with_batch_size(0).batch_size(), 1);
        assert_eq!(ExportOptions::new(0, Throttle::disabled()).batch_size(), 1);
    }

    #[test]
    fn test_sync_failure_leaves_job_unverified() {
        let store = Arc::new(MemoryHitStore::new());
        store.ingest(Hit::new(1, "/a", Utc::now())).unwrap();
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let (service, jobs) = service(&store);
        let service = service.with_notifier(recorder.clone());

        let (mut job, file) = service.create_job(1, 0, dir.path()).unwrap();
        let writer = service.stream_rows(&mut job, &file).unwrap();
        writer.finish().unwrap();
        drop(file);

        let status = service.complete(&mut job, Err(Error::operation("sync_export", "EIO")), true);

        assert_eq!(status, ExportStatus::Unverified);
        assert!(job.path.exists());
        assert!(job.hash.is_none());
        assert!(job.size.is_none());
        assert_eq!(job.num_rows, Some(1));
        let error = job.error.as_deref().unwrap();
        assert!(error.starts_with(UNVERIFIED_PREFIX), "{error}");
        assert!(error.contains("EIO"));
        assert!(recorder.0.lock().unwrap().is_empty());

        let stored = jobs.get(1, job.id).unwrap().unwrap();
        assert_eq!(stored.status(), ExportStatus::Unverified);
    }

    #[test]
    fn test_missing_artifact_leaves_job_unverified() {
        let store = Arc::new(MemoryHitStore::new());
        let dir = TempDir::new().unwrap();
        let (service, _) = service(&store);

        let (mut job, file) = service.create_job(1, 0, dir.path()).unwrap();
        drop(file);
        std::fs::remove_file(&job.path).unwrap();

        let status = service.complete(&mut job, Ok(0), false);
        assert_eq!(status, ExportStatus::Unverified);
        assert!(job.hash.is_none());
        assert!(job.error.unwrap().contains("hash_export"));
    }
}
