//! `SQLite`-based export job store.

use super::connection::{open_connection, open_in_memory};
use super::metrics::timed;
use crate::io::row::format_timestamp;
use crate::io::traits::ExportJobStore;
use crate::models::ExportJob;
use crate::storage::acquire_lock;
use crate::{Error, Result};
use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::instrument;

const BACKEND: &str = "sqlite_exports";

const SELECT_COLUMNS: &str = "export_id, site_id, path, created_at, start_from_hit_id, \
                              last_hit_id, finished_at, num_rows, size, hash, error";

/// How far back [`ExportJobStore::list`] looks.
pub const LIST_WINDOW: TimeDelta = TimeDelta::days(1);

/// `SQLite`-based store for export job records.
pub struct SqliteExportStore {
    conn: Mutex<Connection>,
}

impl SqliteExportStore {
    /// Opens (or creates) the store at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        Self::from_connection(open_connection(&db_path.into())?)
    }

    /// Creates a store backed by a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS exports (
                export_id INTEGER PRIMARY KEY AUTOINCREMENT,
                site_id INTEGER NOT NULL,
                path TEXT NOT NULL,
                created_at TEXT NOT NULL,
                start_from_hit_id INTEGER NOT NULL,
                last_hit_id INTEGER,
                finished_at TEXT,
                num_rows INTEGER,
                size TEXT,
                hash TEXT,
                error TEXT
            )",
            [],
        )
        .map_err(|e| Error::operation("create_exports_table", e))?;
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_exports_site_created ON exports(site_id, created_at DESC)",
            [],
        );
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn list_since(&self, site_id: i64, since: DateTime<Utc>) -> Result<Vec<ExportJob>> {
        timed(BACKEND, "list", || {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare_cached(&format!(
                    "SELECT {SELECT_COLUMNS} FROM exports
                     WHERE site_id = ?1 AND created_at > ?2
                     ORDER BY created_at DESC, export_id DESC"
                ))
                .map_err(|e| Error::operation("list_exports", e))?;
            let rows = stmt
                .query_map(params![site_id, format_timestamp(&since)], JobRow::from_row)
                .map_err(|e| Error::operation("list_exports", e))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| Error::operation("list_exports", e))?;
            rows.into_iter().map(JobRow::into_job).collect()
        })
    }
}

/// Raw column values of one `exports` row.
struct JobRow {
    id: i64,
    site_id: i64,
    path: String,
    created_at: String,
    start_from_hit_id: i64,
    last_hit_id: Option<i64>,
    finished_at: Option<String>,
    num_rows: Option<i64>,
    size: Option<String>,
    hash: Option<String>,
    error: Option<String>,
}

impl JobRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            site_id: row.get(1)?,
            path: row.get(2)?,
            created_at: row.get(3)?,
            start_from_hit_id: row.get(4)?,
            last_hit_id: row.get(5)?,
            finished_at: row.get(6)?,
            num_rows: row.get(7)?,
            size: row.get(8)?,
            hash: row.get(9)?,
            error: row.get(10)?,
        })
    }

    fn into_job(self) -> Result<ExportJob> {
        let parse = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| Error::operation("read_exports", format!("export {}: {e}", self.id)))
        };
        Ok(ExportJob {
            id: self.id,
            site_id: self.site_id,
            start_from_hit_id: self.start_from_hit_id,
            last_hit_id: self.last_hit_id,
            path: PathBuf::from(self.path),
            created_at: parse(&self.created_at)?,
            finished_at: self.finished_at.as_deref().map(parse).transpose()?,
            num_rows: self.num_rows.and_then(|n| u64::try_from(n).ok()),
            size: self.size,
            hash: self.hash,
            error: self.error,
        })
    }
}

fn num_rows_param(job: &ExportJob) -> Option<i64> {
    job.num_rows.map(|n| i64::try_from(n).unwrap_or(i64::MAX))
}

impl ExportJobStore for SqliteExportStore {
    #[instrument(skip(self, job), fields(operation = "create", backend = BACKEND, site.id = job.site_id))]
    fn create(&self, job: ExportJob) -> Result<ExportJob> {
        timed(BACKEND, "create", || {
            let conn = acquire_lock(&self.conn);
            conn.execute(
                "INSERT INTO exports (site_id, path, created_at, start_from_hit_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    job.site_id,
                    job.path.to_string_lossy(),
                    format_timestamp(&job.created_at),
                    job.start_from_hit_id,
                ],
            )
            .map_err(|e| Error::operation("create_export", e))?;
            Ok(ExportJob {
                id: conn.last_insert_rowid(),
                ..job
            })
        })
    }

    #[instrument(skip(self), fields(operation = "get", backend = BACKEND))]
    fn get(&self, site_id: i64, id: i64) -> Result<Option<ExportJob>> {
        timed(BACKEND, "get", || {
            let conn = acquire_lock(&self.conn);
            conn.query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM exports WHERE export_id = ?1 AND site_id = ?2"),
                params![id, site_id],
                JobRow::from_row,
            )
            .optional()
            .map_err(|e| Error::operation("get_export", e))?
            .map(JobRow::into_job)
            .transpose()
        })
    }

    fn list(&self, site_id: i64) -> Result<Vec<ExportJob>> {
        self.list_since(site_id, Utc::now() - LIST_WINDOW)
    }

    #[instrument(skip(self, job), fields(operation = "mark_failed", backend = BACKEND, export.id = job.id))]
    fn mark_failed(&self, job: &ExportJob) -> Result<()> {
        timed(BACKEND, "mark_failed", || {
            let conn = acquire_lock(&self.conn);
            conn.execute(
                "UPDATE exports SET error = ?1, last_hit_id = ?2, num_rows = ?3
                 WHERE export_id = ?4",
                params![job.error, job.last_hit_id, num_rows_param(job), job.id],
            )
            .map_err(|e| Error::operation("mark_export_failed", e))?;
            Ok(())
        })
    }

    #[instrument(skip(self, job), fields(operation = "mark_finished", backend = BACKEND, export.id = job.id))]
    fn mark_finished(&self, job: &ExportJob) -> Result<()> {
        timed(BACKEND, "mark_finished", || {
            let conn = acquire_lock(&self.conn);
            conn.execute(
                "UPDATE exports SET
                    finished_at = ?1, num_rows = ?2, size = ?3, hash = ?4,
                    last_hit_id = ?5, error = ?6
                 WHERE export_id = ?7",
                params![
                    job.finished_at.as_ref().map(format_timestamp),
                    num_rows_param(job),
                    job.size,
                    job.hash,
                    job.last_hit_id,
                    job.error,
                    job.id,
                ],
            )
            .map_err(|e| Error::operation("mark_export_finished", e))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExportStatus;
    use chrono::SubsecRound;

    fn new_job(site_id: i64, created_at: DateTime<Utc>) -> ExportJob {
        ExportJob::new(site_id, 0, PathBuf::from("/tmp/x.csv.gz"), created_at)
    }

    #[test]
    fn test_create_and_get() {
        let store = SqliteExportStore::in_memory().unwrap();
        let job = store.create(new_job(1, Utc::now().trunc_subsecs(0))).unwrap();
        assert!(job.id > 0);

        assert_eq!(store.get(1, job.id).unwrap(), Some(job.clone()));
        assert_eq!(store.get(2, job.id).unwrap(), None);
    }

    #[test]
    fn test_mark_finished() {
        let store = SqliteExportStore::in_memory().unwrap();
        let mut job = store.create(new_job(1, Utc::now().trunc_subsecs(0))).unwrap();
        job.finished_at = Some(Utc::now().trunc_subsecs(0));
        job.num_rows = Some(3);
        job.last_hit_id = Some(3);
        job.size = Some("0.0".to_string());
        job.hash = Some("sha256-ab".to_string());
        store.mark_finished(&job).unwrap();

        let stored = store.get(1, job.id).unwrap().unwrap();
        assert_eq!(stored, job);
        assert_eq!(stored.status(), ExportStatus::Finished);
    }

    #[test]
    fn test_mark_failed() {
        let store = SqliteExportStore::in_memory().unwrap();
        let mut job = store.create(new_job(1, Utc::now().trunc_subsecs(0))).unwrap();
        job.error = Some("disk full".to_string());
        store.mark_failed(&job).unwrap();

        let stored = store.get(1, job.id).unwrap().unwrap();
        assert_eq!(stored.status(), ExportStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("disk full"));
    }

    #[test]
    fn test_list_recent_newest_first() {
        let store = SqliteExportStore::in_memory().unwrap();
        let now = Utc::now().trunc_subsecs(0);
        store.create(new_job(1, now - TimeDelta::days(2))).unwrap();
        let older = store.create(new_job(1, now - TimeDelta::hours(2))).unwrap();
        let newer = store.create(new_job(1, now)).unwrap();
        store.create(new_job(2, now)).unwrap();

        let ids: Vec<i64> = store.list(1).unwrap().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }
}
