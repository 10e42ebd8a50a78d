//! Connection handling for the `SQLite` stores.
//!
//! Each store owns one `Mutex<Connection>`, and every connection gets the
//! same pragmas.

use crate::{Error, Result};
use rusqlite::Connection;
use std::path::Path;

/// Busy timeout applied to every connection, in milliseconds.
pub const BUSY_TIMEOUT_MS: u32 = 5000;

/// Applies WAL journaling, NORMAL sync and a busy timeout.
///
/// Pragma failures are ignored: in-memory databases report `memory` for the
/// journal mode, which is fine.
pub fn configure_connection(conn: &Connection) {
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS.to_string());
}

/// Opens and configures a database file, creating its directory.
///
/// # Errors
///
/// Returns an error if the directory or database cannot be created.
pub fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::operation("create_data_dir", e))?;
    }
    let conn = Connection::open(path).map_err(|e| Error::operation("open_sqlite", e))?;
    configure_connection(&conn);
    Ok(conn)
}

/// Opens a private in-memory database.
///
/// # Errors
///
/// Returns an error if `SQLite` cannot allocate the database.
pub fn open_in_memory() -> Result<Connection> {
    let conn =
        Connection::open_in_memory().map_err(|e| Error::operation("open_sqlite_memory", e))?;
    configure_connection(&conn);
    Ok(conn)
}

/// Runs `f` inside `BEGIN IMMEDIATE` / `COMMIT`, rolling back on error.
///
/// # Errors
///
/// Returns the error of `f`, or an error named after `operation` if the
/// transaction cannot be started or committed.
pub fn in_transaction<T>(
    conn: &Connection,
    operation: &str,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    conn.execute("BEGIN IMMEDIATE", [])
        .map_err(|e| Error::operation(operation, e))?;

    match f(conn) {
        Ok(value) => {
            if let Err(e) = conn.execute("COMMIT", []) {
                let _ = conn.execute("ROLLBACK", []);
                return Err(Error::operation(operation, e));
            }
            Ok(value)
        },
        Err(e) => {
            let _ = conn.execute("ROLLBACK", []);
            Err(e)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_transaction_rolls_back() {
        let conn = open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (x INTEGER)", []).unwrap();

        let result: Result<()> = in_transaction(&conn, "test", |c| {
            c.execute("INSERT INTO t VALUES (1)", [])
                .map_err(|e| Error::operation("insert", e))?;
            Err(Error::InvalidInput("abort".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_open_connection_creates_parent() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("hitport.db");
        open_connection(&path).unwrap();
        assert!(path.exists());
    }
}
