//! Blocking SQLite layer
//!
//! Everything here runs on blocking threads (`spawn_blocking`); the async
//! engine in the parent module never touches rusqlite directly. Writes
//! favor throughput: WAL journal, NORMAL synchronous, one transaction per
//! batch.

use std::path::Path;

use rusqlite::{params, Connection, ErrorCode};
use tracing::warn;

use super::StorageConfig;
use crate::error::{CoreError, Result};
use crate::types::PointSample;

/// Open a connection, retrying a bounded number of times while another
/// process holds the file locked.
pub(super) fn open_with_retries(path: &Path, config: &StorageConfig) -> Result<Connection> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match open(path, config) {
            Ok(conn) => return Ok(conn),
            Err(e) if is_busy(&e) => {
                if attempt >= config.open_retries {
                    return Err(CoreError::StorageBusy { attempts: attempt });
                }
                warn!(attempt, "database busy on open, backing off");
                std::thread::sleep(config.busy_backoff * attempt);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn open(path: &Path, config: &StorageConfig) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -16384;
         PRAGMA busy_timeout = {};",
        config.busy_timeout.as_millis()
    ))?;
    Ok(conn)
}

/// True for SQLITE_BUSY / SQLITE_LOCKED style contention errors.
pub(super) fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

pub(super) fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS matrix_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            row INTEGER NOT NULL,
            col INTEGER NOT NULL,
            value INTEGER NOT NULL,
            raw_value INTEGER,
            frame_id INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_timestamp ON matrix_data(timestamp);
        CREATE INDEX IF NOT EXISTS idx_position ON matrix_data(row, col, timestamp);",
    )
}

/// Insert a batch inside one transaction. SQLITE_BUSY rolls the whole
/// transaction back, so a failed batch can go back on the queue without
/// duplicating rows.
pub(super) fn insert_batch(conn: &mut Connection, batch: &[PointSample]) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO matrix_data (timestamp, row, col, value, raw_value, frame_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for sample in batch {
            stmt.execute(params![
                sample.timestamp.to_rfc3339(),
                sample.row,
                sample.col,
                sample.value,
                sample.raw_value,
                sample.frame_id,
            ])?;
        }
    }
    tx.commit()
}

/// Values recorded for one cell, oldest first. `limit` keeps the newest N.
pub(super) fn point_history(
    conn: &Connection,
    row: u8,
    col: u8,
    limit: Option<usize>,
) -> rusqlite::Result<Vec<i64>> {
    match limit {
        None => {
            let mut stmt = conn.prepare_cached(
                "SELECT value FROM matrix_data
                 WHERE row = ?1 AND col = ?2
                 ORDER BY timestamp ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![row, col], |r| r.get(0))?;
            rows.collect()
        }
        Some(limit) => {
            let mut stmt = conn.prepare_cached(
                "SELECT value FROM matrix_data
                 WHERE row = ?1 AND col = ?2
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?3",
            )?;
            let mut values: Vec<i64> = stmt
                .query_map(params![row, col, limit as i64], |r| r.get(0))?
                .collect::<rusqlite::Result<_>>()?;
            values.reverse();
            Ok(values)
        }
    }
}

/// Total rows stored for one cell.
#[cfg(test)]
pub(super) fn point_count(conn: &Connection, row: u8, col: u8) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM matrix_data WHERE row = ?1 AND col = ?2",
        params![row, col],
        |r| r.get(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    fn test_config(dir: &tempfile::TempDir) -> StorageConfig {
        StorageConfig {
            db_path: dir.path().join("test.db"),
            ..StorageConfig::default()
        }
    }

    fn sample_at(offset_secs: i64, value: i64) -> PointSample {
        PointSample {
            timestamp: Utc::now() + ChronoDuration::seconds(offset_secs),
            row: 1,
            col: 2,
            value,
            raw_value: value * 10,
            frame_id: Some(7),
        }
    }

    #[test]
    fn test_schema_and_insert() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let mut conn = open_with_retries(&config.db_path, &config).unwrap();
        init_schema(&conn).unwrap();

        let batch: Vec<PointSample> = (0..5).map(|i| sample_at(i, i)).collect();
        insert_batch(&mut conn, &batch).unwrap();
        assert_eq!(point_count(&conn, 1, 2).unwrap(), 5);
    }

    #[test]
    fn test_history_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let mut conn = open_with_retries(&config.db_path, &config).unwrap();
        init_schema(&conn).unwrap();

        let batch: Vec<PointSample> = (0..10).map(|i| sample_at(i, i)).collect();
        insert_batch(&mut conn, &batch).unwrap();

        let all = point_history(&conn, 1, 2, None).unwrap();
        assert_eq!(all, (0..10).collect::<Vec<i64>>());

        // Limited query keeps the newest entries, still oldest first.
        let tail = point_history(&conn, 1, 2, Some(3)).unwrap();
        assert_eq!(tail, vec![7, 8, 9]);

        // Unknown cell reads empty.
        assert!(point_history(&conn, 9, 9, None).unwrap().is_empty());
    }

    #[test]
    fn test_busy_detection() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            db_path: dir.path().join("busy.db"),
            busy_timeout: std::time::Duration::from_millis(50),
            ..StorageConfig::default()
        };
        let mut conn = open_with_retries(&config.db_path, &config).unwrap();
        init_schema(&conn).unwrap();

        // Hold the write lock from a second connection.
        let blocker = open_with_retries(&config.db_path, &config).unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE;").unwrap();

        let err = insert_batch(&mut conn, &[sample_at(0, 1)]).unwrap_err();
        assert!(is_busy(&err));

        blocker.execute_batch("ROLLBACK;").unwrap();
        insert_batch(&mut conn, &[sample_at(0, 1)]).unwrap();
        assert_eq!(point_count(&conn, 1, 2).unwrap(), 1);
    }
}
