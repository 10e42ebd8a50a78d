//! `SQLite`-based hit store.

use super::connection::{in_transaction, open_connection, open_in_memory};
use super::metrics::timed;
use crate::io::row::format_timestamp;
use crate::io::traits::{HitBatch, HitSink, HitSource};
use crate::models::{Hit, RefScheme, ScreenSize, SessionRef};
use crate::storage::acquire_lock;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Default number of ingested hits buffered before they are written.
pub const DEFAULT_INGEST_BUFFER: usize = 500;

const BACKEND: &str = "sqlite_hits";

const SELECT_COLUMNS: &str = "hit_id, site_id, path, title, event, bot, session, first_visit, \
                              ref, ref_scheme, browser, size, location, created_at";

/// `SQLite`-based hit store.
///
/// Ingested hits are buffered and written in one transaction when the buffer
/// is full or on [`HitSink::flush`]. Reads only see written hits.
///
/// # Schema
///
/// `hits(hit_id INTEGER PRIMARY KEY AUTOINCREMENT, site_id, path, title,
/// event, bot, session, first_visit, ref, ref_scheme, browser, size, location,
/// created_at)`. Sessions, sizes and timestamps are stored in their wire form.
pub struct SqliteHitStore {
    conn: Mutex<Connection>,
    pending: Mutex<Vec<Hit>>,
    buffer_size: usize,
    db_path: Option<PathBuf>,
}

impl SqliteHitStore {
    /// Opens (or creates) the store at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = open_connection(&db_path)?;
        Self::from_connection(conn, Some(db_path))
    }

    /// Creates a store backed by a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(open_in_memory()?, None)
    }

    fn from_connection(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            pending: Mutex::new(Vec::new()),
            buffer_size: DEFAULT_INGEST_BUFFER,
            db_path,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Sets how many hits are buffered before a write. Zero writes every hit
    /// immediately.
    #[must_use]
    pub const fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Returns the database path (`None` for in-memory stores).
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "CREATE TABLE IF NOT EXISTS hits (
                hit_id INTEGER PRIMARY KEY AUTOINCREMENT,
                site_id INTEGER NOT NULL,
                path TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                event INTEGER NOT NULL DEFAULT 0,
                bot INTEGER NOT NULL DEFAULT 0,
                session TEXT NOT NULL,
                first_visit INTEGER NOT NULL DEFAULT 0,
                ref TEXT NOT NULL DEFAULT '',
                ref_scheme TEXT,
                browser TEXT NOT NULL DEFAULT '',
                size TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| Error::operation("create_hits_table", e))?;

        // Index creation failures only cost read performance
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_hits_site ON hits(site_id, hit_id)",
            [],
        );
        Ok(())
    }

    /// Number of written hits of `site_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self, site_id: i64) -> Result<u64> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM hits WHERE site_id = ?1",
                params![site_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::operation("count_hits", e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Number of hits waiting in the ingest buffer.
    #[must_use]
    pub fn pending(&self) -> usize {
        acquire_lock(&self.pending).len()
    }

    fn write(&self, hits: &[Hit]) -> Result<()> {
        if hits.is_empty() {
            return Ok(());
        }
        timed(BACKEND, "write", || {
            let conn = acquire_lock(&self.conn);
            in_transaction(&conn, "write_hits", |conn| {
                let mut stmt = conn
                    .prepare_cached(
                        "INSERT INTO hits (site_id, path, title, event, bot, session, first_visit,
                            ref, ref_scheme, browser, size, location, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    )
                    .map_err(|e| Error::operation("write_hits", e))?;
                for hit in hits {
                    stmt.execute(params![
                        hit.site_id,
                        hit.path,
                        hit.title,
                        hit.event,
                        hit.bot,
                        hit.session.to_string(),
                        hit.first_visit,
                        hit.referrer,
                        hit.ref_scheme.map(|s| s.as_str()),
                        hit.browser,
                        hit.size.to_string(),
                        hit.location,
                        format_timestamp(&hit.created_at),
                    ])
                    .map_err(|e| Error::operation("write_hits", e))?;
                }
                Ok(())
            })
        })?;
        debug!(count = hits.len(), "hits written");
        Ok(())
    }

    /// Writes a batch taken from the buffer, putting it back in front of the
    /// buffer if the write fails.
    fn write_taken(&self, hits: Vec<Hit>) -> Result<()> {
        let Err(e) = self.write(&hits) else {
            return Ok(());
        };
        warn!(error = %e, count = hits.len(), "hit write failed; batch kept buffered");
        let mut pending = acquire_lock(&self.pending);
        let newer = std::mem::replace(&mut *pending, hits);
        pending.extend(newer);
        Err(e)
    }
}

/// Raw column values of one `hits` row.
struct HitRow {
    hit_id: i64,
    site_id: i64,
    path: String,
    title: String,
    event: bool,
    bot: i32,
    session: String,
    first_visit: bool,
    referrer: String,
    ref_scheme: Option<String>,
    browser: String,
    size: String,
    location: String,
    created_at: String,
}

impl HitRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            hit_id: row.get(0)?,
            site_id: row.get(1)?,
            path: row.get(2)?,
            title: row.get(3)?,
            event: row.get(4)?,
            bot: row.get(5)?,
            session: row.get(6)?,
            first_visit: row.get(7)?,
            referrer: row.get(8)?,
            ref_scheme: row.get(9)?,
            browser: row.get(10)?,
            size: row.get(11)?,
            location: row.get(12)?,
            created_at: row.get(13)?,
        })
    }

    fn into_hit(self) -> Result<Hit> {
        let corrupt = |field: &str, cause: String| {
            Error::operation("read_hits", format!("hit {}: {field}: {cause}", self.hit_id))
        };
        let session: SessionRef = self
            .session
            .parse()
            .map_err(|e: crate::models::ParseSessionError| corrupt("session", e.to_string()))?;
        let size: ScreenSize = self
            .size
            .parse()
            .map_err(|e: crate::models::ScreenSizeError| corrupt("size", e.to_string()))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| corrupt("created_at", e.to_string()))?
            .with_timezone(&Utc);

        Ok(Hit {
            site_id: self.site_id,
            path: self.path,
            title: self.title,
            event: self.event,
            bot: self.bot,
            session,
            first_visit: self.first_visit,
            referrer: self.referrer,
            ref_scheme: self.ref_scheme.as_deref().and_then(RefScheme::parse),
            browser: self.browser,
            size,
            location: self.location,
            created_at,
        })
    }
}

impl HitSource for SqliteHitStore {
    #[instrument(skip(self), fields(operation = "list_after", backend = BACKEND))]
    fn list_after(&self, site_id: i64, after_id: i64, limit: usize) -> Result<HitBatch> {
        timed(BACKEND, "list_after", || {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare_cached(&format!(
                    "SELECT {SELECT_COLUMNS} FROM hits
                     WHERE site_id = ?1 AND hit_id > ?2
                     ORDER BY hit_id ASC LIMIT ?3"
                ))
                .map_err(|e| Error::operation("list_hits", e))?;
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let rows = stmt
                .query_map(params![site_id, after_id, limit], HitRow::from_row)
                .map_err(|e| Error::operation("list_hits", e))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| Error::operation("list_hits", e))?;

            let last_id = rows.last().map_or(after_id, |r| r.hit_id);
            let hits = rows
                .into_iter()
                .map(HitRow::into_hit)
                .collect::<Result<Vec<_>>>()?;
            Ok(HitBatch { hits, last_id })
        })
    }
}

impl HitSink for SqliteHitStore {
    fn ingest(&self, hit: Hit) -> Result<()> {
        let full = {
            let mut pending = acquire_lock(&self.pending);
            pending.push(hit);
            if pending.len() >= self.buffer_size.max(1) {
                Some(std::mem::take(&mut *pending))
            } else {
                None
            }
        };
        match full {
            Some(hits) => self.write_taken(hits),
            None => Ok(()),
        }
    }

    #[instrument(skip(self), fields(operation = "wipe_all", backend = BACKEND))]
    fn wipe_all(&self, site_id: i64) -> Result<()> {
        acquire_lock(&self.pending).retain(|h| h.site_id != site_id);
        timed(BACKEND, "wipe_all", || {
            let conn = acquire_lock(&self.conn);
            in_transaction(&conn, "wipe_hits", |conn| {
                conn.execute("DELETE FROM hits WHERE site_id = ?1", params![site_id])
                    .map_err(|e| Error::operation("wipe_hits", e))
            })
        })
        .map(|deleted| debug!(deleted, "hits wiped"))
    }

    fn flush(&self) -> Result<()> {
        let hits = std::mem::take(&mut *acquire_lock(&self.pending));
        self.write_taken(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn hit(site_id: i64, path: &str) -> Hit {
        Hit::new(site_id, path, DateTime::from_timestamp(1_600_000_000, 0).unwrap())
    }

    #[test]
    fn test_ingest_buffers_until_flush() {
        let store = SqliteHitStore::in_memory().unwrap();
        store.ingest(hit(1, "/a")).unwrap();
        assert_eq!(store.pending(), 1);
        assert!(store.list_after(1, 0, 10).unwrap().is_empty());

        store.flush().unwrap();
        assert_eq!(store.pending(), 0);
        assert_eq!(store.count(1).unwrap(), 1);
    }

    #[test]
    fn test_full_buffer_is_written() {
        let store = SqliteHitStore::in_memory().unwrap().with_buffer_size(2);
        store.ingest(hit(1, "/a")).unwrap();
        store.ingest(hit(1, "/b")).unwrap();
        assert_eq!(store.pending(), 0);
        assert_eq!(store.count(1).unwrap(), 2);
    }

    #[test]
    fn test_failed_write_keeps_batch_buffered() {
        let store = SqliteHitStore::in_memory().unwrap().with_buffer_size(2);
        acquire_lock(&store.conn)
            .execute("DROP TABLE hits", [])
            .unwrap();

        store.ingest(hit(1, "/a")).unwrap();
        assert!(store.ingest(hit(1, "/b")).is_err());
        assert_eq!(store.pending(), 2);
        assert!(store.flush().is_err());
        assert_eq!(store.pending(), 2);

        store.initialize().unwrap();
        store.ingest(hit(1, "/c")).unwrap();
        assert_eq!(store.pending(), 0);
        let paths: Vec<String> = store
            .list_after(1, 0, 10)
            .unwrap()
            .hits
            .into_iter()
            .map(|h| h.path)
            .collect();
        assert_eq!(paths, ["/a", "/b", "/c"]);
    }

    #[test]
    fn test_list_after_pages_in_id_order() {
        let store = SqliteHitStore::in_memory().unwrap().with_buffer_size(0);
        for path in ["/a", "/b", "/c"] {
            store.ingest(hit(1, path)).unwrap();
        }
        store.ingest(hit(2, "/other")).unwrap();

        let first = store.list_after(1, 0, 2).unwrap();
        assert_eq!(first.hits.len(), 2);
        assert_eq!(first.last_id, 2);
        assert_eq!(first.hits[0].path, "/a");

        let second = store.list_after(1, first.last_id, 2).unwrap();
        assert_eq!(second.hits.len(), 1);
        assert_eq!(second.last_id, 3);

        let end = store.list_after(1, second.last_id, 2).unwrap();
        assert!(end.is_empty());
        assert_eq!(end.last_id, 3);
    }

    #[test]
    fn test_roundtrip_fields() {
        let store = SqliteHitStore::in_memory().unwrap();
        let original = hit(1, "/x")
            .with_title("T")
            .with_session(SessionRef::Canonical(Uuid::new_v4()))
            .with_referrer("r", Some(RefScheme::Campaign))
            .with_size(ScreenSize::new(vec![800.0, 600.0]).unwrap())
            .with_location("DE")
            .as_event();
        store.ingest(original.clone()).unwrap();
        store.ingest(hit(1, "/y").with_session(SessionRef::Legacy(77))).unwrap();
        store.flush().unwrap();

        let batch = store.list_after(1, 0, 10).unwrap();
        assert_eq!(batch.hits[0], original);
        assert_eq!(batch.hits[1].session, SessionRef::Legacy(77));
    }

    #[test]
    fn test_wipe_all_only_touches_site() {
        let store = SqliteHitStore::in_memory().unwrap();
        store.ingest(hit(1, "/a")).unwrap();
        store.ingest(hit(2, "/b")).unwrap();
        store.flush().unwrap();
        store.ingest(hit(1, "/pending")).unwrap();

        store.wipe_all(1).unwrap();
        store.flush().unwrap();
        assert_eq!(store.count(1).unwrap(), 0);
        assert_eq!(store.count(2).unwrap(), 1);
    }

    #[test]
    fn test_reopen_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("hits.db");
        {
            let store = SqliteHitStore::new(&path).unwrap();
            store.ingest(hit(1, "/a")).unwrap();
            store.flush().unwrap();
        }
        let store = SqliteHitStore::new(&path).unwrap();
        assert_eq!(store.db_path(), Some(path.as_path()));
        assert_eq!(store.count(1).unwrap(), 1);
    }
}
