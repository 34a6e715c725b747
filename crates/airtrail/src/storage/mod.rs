//! Storage layer.
//!
//! Two independent `SQLite` databases: the append-only [`PositionStore`]
//! and the episode-based [`SightingStore`]. Each store owns its file and
//! guards its connection with a mutex, so a store can be shared across
//! threads behind an `Arc` and driven from `spawn_blocking`.

pub mod migrations;
mod positions;
pub mod schema;
mod sightings;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub use positions::{
    trail_since_default, PositionStats, PositionStore, DEFAULT_LATEST_MAX_AGE_SECS,
    DEFAULT_RETENTION_SECS, DEFAULT_TRAIL_WINDOW_SECS,
};
pub use sightings::{SightingStore, STATS_RECENT_WINDOW_SECS};

/// Path reported for in-memory databases.
const MEMORY_PATH: &str = ":memory:";

/// Current time as epoch seconds.
#[must_use]
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Open or create a database file and apply `statements`.
///
/// Creates the parent directories if they don't exist.
fn open_connection(path: &Path, statements: &[&str]) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    debug!("Opening database at {}", path.display());
    let conn = Connection::open(path).map_err(|source| Error::DatabaseOpen {
        path: path.to_path_buf(),
        source,
    })?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
    migrations::initialize_schema(&conn, statements)?;

    info!("Database opened at {}", path.display());
    Ok(conn)
}

fn open_memory_connection(statements: &[&str]) -> Result<Connection> {
    let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
        path: PathBuf::from(MEMORY_PATH),
        source,
    })?;
    migrations::initialize_schema(&conn, statements)?;
    Ok(conn)
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| Error::internal("database connection lock poisoned"))
}

/// Size of the database file; 0 for in-memory databases.
fn file_size(path: &Path) -> u64 {
    if path.as_os_str() == MEMORY_PATH {
        0
    } else {
        std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
    }
}

/// Convert a count or limit for binding.
fn to_sql_int(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Convert a row count read back from `SQLite`.
fn to_count(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::POSITION_SCHEMA;

    #[test]
    fn test_open_connection_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("positions.db");

        let conn = open_connection(&path, POSITION_SCHEMA).unwrap();
        drop(conn);

        assert!(path.exists());
        assert!(file_size(&path) > 0);
    }

    #[test]
    fn test_file_size_memory_is_zero() {
        assert_eq!(file_size(Path::new(MEMORY_PATH)), 0);
    }

    #[test]
    fn test_int_conversions() {
        assert_eq!(to_sql_int(5), 5);
        assert_eq!(to_sql_int(usize::MAX), i64::MAX);
        assert_eq!(to_count(7), 7);
        assert_eq!(to_count(-1), 0);
    }

    #[test]
    fn test_unix_now_is_recent() {
        // 2023-01-01
        assert!(unix_now() > 1_672_531_200);
    }
}
