//! Append-only position store.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{debug, info};

use super::schema::POSITION_SCHEMA;
use super::{file_size, lock, open_connection, open_memory_connection, to_count, unix_now};
use crate::error::Result;
use crate::position::{normalize_aircraft_id, Position};
use crate::tiles::BoundingBox;

/// How long positions are kept, in seconds.
pub const DEFAULT_RETENTION_SECS: i64 = 24 * 60 * 60;

/// How far back the latest-in-box query looks, in seconds.
pub const DEFAULT_LATEST_MAX_AGE_SECS: i64 = 180;

/// Default trail window, in seconds.
pub const DEFAULT_TRAIL_WINDOW_SECS: i64 = 24 * 60 * 60;

const POSITION_COLUMNS: &str = "aircraft_id, callsign, latitude, longitude, altitude, speed, \
                                heading, vertical_rate, squawk, on_ground, timestamp";

/// Start of the default trail window ending at `now`.
#[must_use]
pub fn trail_since_default(now: i64) -> i64 {
    now - DEFAULT_TRAIL_WINDOW_SECS
}

/// Time-series store of aircraft positions.
///
/// Rows are only ever inserted or deleted by retention; they are never
/// updated.
#[derive(Debug)]
pub struct PositionStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl PositionStore {
    /// Open or create the positions database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema
    /// initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = open_connection(&path, POSITION_SCHEMA)?;
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            path: PathBuf::from(super::MEMORY_PATH),
            conn: Mutex::new(open_memory_connection(POSITION_SCHEMA)?),
        })
    }

    /// Path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a batch of positions in one transaction.
    ///
    /// Either every record is written or none is.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; the batch is rolled back.
    pub fn insert_positions(&self, positions: &[Position]) -> Result<usize> {
        if positions.is_empty() {
            return Ok(0);
        }

        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                r"
                INSERT INTO positions (aircraft_id, callsign, latitude, longitude, altitude,
                    speed, heading, vertical_rate, squawk, on_ground, timestamp)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ",
            )?;
            for p in positions {
                stmt.execute(params![
                    p.aircraft_id,
                    p.callsign,
                    p.latitude,
                    p.longitude,
                    p.altitude,
                    p.speed,
                    p.heading,
                    p.vertical_rate,
                    p.squawk,
                    p.on_ground,
                    p.timestamp,
                ])?;
            }
        }
        tx.commit()?;

        debug!(count = positions.len(), "Inserted positions");
        Ok(positions.len())
    }

    /// Delete positions older than `max_age_secs`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_old_positions(&self, max_age_secs: i64) -> Result<usize> {
        self.prune_old_positions_at(max_age_secs, unix_now())
    }

    /// Delete positions with `timestamp < now - max_age_secs`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_old_positions_at(&self, max_age_secs: i64, now: i64) -> Result<usize> {
        let cutoff = now - max_age_secs;
        let conn = lock(&self.conn)?;
        let affected = conn.execute("DELETE FROM positions WHERE timestamp < ?1", [cutoff])?;

        if affected > 0 {
            info!("Pruned {} old positions", affected);
        }
        Ok(affected)
    }

    /// The latest position of every aircraft seen inside `bbox` recently.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn query_latest_in_bbox(&self, bbox: &BoundingBox, max_age_secs: i64) -> Result<Vec<Position>> {
        self.query_latest_in_bbox_at(bbox, max_age_secs, unix_now())
    }

    /// The latest position of every aircraft with a record inside `bbox`
    /// no older than `now - max_age_secs`.
    ///
    /// Only records inside the box and window are considered. When two
    /// records share a timestamp the later insert wins. Results are sorted by
    /// aircraft identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn query_latest_in_bbox_at(
        &self,
        bbox: &BoundingBox,
        max_age_secs: i64,
        now: i64,
    ) -> Result<Vec<Position>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            r"
            SELECT {POSITION_COLUMNS} FROM (
                SELECT *, ROW_NUMBER() OVER (
                    PARTITION BY aircraft_id ORDER BY timestamp DESC, id DESC
                ) AS rn
                FROM positions
                WHERE latitude BETWEEN ?1 AND ?2
                  AND longitude BETWEEN ?3 AND ?4
                  AND timestamp >= ?5
            )
            WHERE rn = 1
            ORDER BY aircraft_id
            "
        ))?;

        let positions = stmt
            .query_map(
                params![
                    bbox.lat_min,
                    bbox.lat_max,
                    bbox.lon_min,
                    bbox.lon_max,
                    now - max_age_secs
                ],
                Self::row_to_position,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(positions)
    }

    /// All positions of one aircraft since `since_ts`, oldest first.
    ///
    /// The identity is normalized before lookup, so `"ABC123 "` finds
    /// `abc123`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn query_trail(&self, aircraft_id: &str, since_ts: i64) -> Result<Vec<Position>> {
        let Some(aircraft_id) = normalize_aircraft_id(Some(aircraft_id)) else {
            return Ok(Vec::new());
        };

        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            r"
            SELECT {POSITION_COLUMNS} FROM positions
            WHERE aircraft_id = ?1 AND timestamp >= ?2
            ORDER BY timestamp ASC, id ASC
            "
        ))?;

        let positions = stmt
            .query_map(params![aircraft_id, since_ts], Self::row_to_position)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(positions)
    }

    /// Count stored positions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<usize> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM positions", [], |row| row.get(0))?;
        Ok(to_count(count))
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<PositionStats> {
        let conn = lock(&self.conn)?;
        let (total, aircraft, oldest, newest): (i64, i64, Option<i64>, Option<i64>) = conn
            .query_row(
                r"
                SELECT COUNT(*), COUNT(DISTINCT aircraft_id), MIN(timestamp), MAX(timestamp)
                FROM positions
                ",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        Ok(PositionStats {
            total_positions: to_count(total),
            distinct_aircraft: to_count(aircraft),
            oldest_timestamp: oldest,
            newest_timestamp: newest,
            db_size_bytes: file_size(&self.path),
        })
    }

    fn row_to_position(row: &rusqlite::Row) -> rusqlite::Result<Position> {
        Ok(Position {
            aircraft_id: row.get(0)?,
            callsign: row.get(1)?,
            latitude: row.get(2)?,
            longitude: row.get(3)?,
            altitude: row.get(4)?,
            speed: row.get(5)?,
            heading: row.get(6)?,
            vertical_rate: row.get(7)?,
            squawk: row.get(8)?,
            on_ground: row.get(9)?,
            timestamp: row.get(10)?,
        })
    }
}

/// Statistics about the positions database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionStats {
    /// Rows stored.
    pub total_positions: usize,
    /// Distinct aircraft with at least one row.
    pub distinct_aircraft: usize,
    /// Oldest row timestamp.
    pub oldest_timestamp: Option<i64>,
    /// Newest row timestamp.
    pub newest_timestamp: Option<i64>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> PositionStore {
        PositionStore::open_in_memory().expect("failed to create test store")
    }

    fn position(id: &str, lat: f64, lon: f64, timestamp: i64) -> Position {
        Position {
            aircraft_id: id.to_string(),
            callsign: Some("TEST1".to_string()),
            latitude: lat,
            longitude: lon,
            altitude: Some(10_000.0),
            speed: Some(250.0),
            heading: Some(90.0),
            vertical_rate: None,
            squawk: None,
            on_ground: false,
            timestamp,
        }
    }

    fn bay_area() -> BoundingBox {
        BoundingBox::new(37.0, 38.0, -123.0, -122.0)
    }

    #[test]
    fn test_open_in_memory() {
        let store = create_test_store();
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.path(), Path::new(":memory:"));
    }

    #[test]
    fn test_insert_empty_batch() {
        let store = create_test_store();
        assert_eq!(store.insert_positions(&[]).unwrap(), 0);
    }

    #[test]
    fn test_insert_batch_is_atomic() {
        let store = create_test_store();
        // SQLite binds NaN as NULL, which violates `latitude NOT NULL`
        let batch = [
            position("abc123", 37.5, -122.5, 1000),
            position("def456", f64::NAN, -122.5, 1000),
        ];

        assert!(store.insert_positions(&batch).is_err());
        assert_eq!(store.count().unwrap(), 0);

        // The connection is still usable after the rollback
        assert_eq!(store.insert_positions(&batch[..1]).unwrap(), 1);
    }

    #[test]
    fn test_insert_and_query_latest_round_trip() {
        let store = create_test_store();
        let p = position("abc123", 37.5, -122.5, 1000);
        store.insert_positions(std::slice::from_ref(&p)).unwrap();

        let latest = store.query_latest_in_bbox_at(&bay_area(), 180, 1000).unwrap();
        assert_eq!(latest, vec![p]);
    }

    #[test]
    fn test_latest_returns_newest_record_per_aircraft() {
        let store = create_test_store();
        store
            .insert_positions(&[
                position("abc123", 37.1, -122.1, 900),
                position("abc123", 37.3, -122.3, 980),
                position("abc123", 37.2, -122.2, 950),
                position("def456", 37.4, -122.4, 970),
            ])
            .unwrap();

        let latest = store.query_latest_in_bbox_at(&bay_area(), 180, 1000).unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].aircraft_id, "abc123");
        assert_eq!(latest[0].timestamp, 980);
        assert!((latest[0].latitude - 37.3).abs() < f64::EPSILON);
        assert_eq!(latest[1].aircraft_id, "def456");
    }

    #[test]
    fn test_latest_tie_goes_to_later_insert() {
        let store = create_test_store();
        store
            .insert_positions(&[
                position("abc123", 37.1, -122.1, 990),
                position("abc123", 37.9, -122.9, 990),
            ])
            .unwrap();

        let latest = store.query_latest_in_bbox_at(&bay_area(), 180, 1000).unwrap();
        assert_eq!(latest.len(), 1);
        assert!((latest[0].latitude - 37.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_latest_excludes_outside_box_and_stale() {
        let store = create_test_store();
        store
            .insert_positions(&[
                position("inside", 37.5, -122.5, 990),
                position("outside", 40.0, -122.5, 990),
                position("stale", 37.5, -122.5, 700),
            ])
            .unwrap();

        let latest = store.query_latest_in_bbox_at(&bay_area(), 180, 1000).unwrap();
        let ids: Vec<&str> = latest.iter().map(|p| p.aircraft_id.as_str()).collect();
        assert_eq!(ids, vec!["inside"]);
    }

    #[test]
    fn test_latest_uses_newest_record_inside_box() {
        // The aircraft has since left the box; its last in-box fix is reported
        let store = create_test_store();
        store
            .insert_positions(&[
                position("abc123", 37.5, -122.5, 950),
                position("abc123", 39.5, -122.5, 990),
            ])
            .unwrap();

        let latest = store.query_latest_in_bbox_at(&bay_area(), 180, 1000).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].timestamp, 950);
    }

    #[test]
    fn test_prune_retention() {
        let store = create_test_store();
        let now = 100_000;
        store
            .insert_positions(&[
                position("old", 37.5, -122.5, now - 90_000),
                position("new", 37.5, -122.5, now - 1_000),
            ])
            .unwrap();

        let pruned = store
            .prune_old_positions_at(DEFAULT_RETENTION_SECS, now)
            .unwrap();
        assert_eq!(pruned, 1);

        let trail = store.query_trail("new", 0).unwrap();
        assert_eq!(trail.len(), 1);
        assert!(store.query_trail("old", 0).unwrap().is_empty());
    }

    #[test]
    fn test_prune_nothing_to_delete() {
        let store = create_test_store();
        assert_eq!(store.prune_old_positions(DEFAULT_RETENTION_SECS).unwrap(), 0);
    }

    #[test]
    fn test_trail_sorted_oldest_first() {
        let store = create_test_store();
        store
            .insert_positions(&[
                position("abc123", 37.3, -122.3, 300),
                position("abc123", 37.1, -122.1, 100),
                position("abc123", 37.2, -122.2, 200),
                position("other1", 37.2, -122.2, 150),
            ])
            .unwrap();

        let timestamps: Vec<i64> = store
            .query_trail("abc123", 0)
            .unwrap()
            .iter()
            .map(|p| p.timestamp)
            .collect();
        assert_eq!(timestamps, vec![100, 200, 300]);
    }

    #[test]
    fn test_trail_since_and_normalized_lookup() {
        let store = create_test_store();
        store
            .insert_positions(&[
                position("abc123", 37.1, -122.1, 100),
                position("abc123", 37.2, -122.2, 200),
            ])
            .unwrap();

        let trail = store.query_trail("  ABC123 ", 150).unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].timestamp, 200);
        assert!(store.query_trail("   ", 0).unwrap().is_empty());
    }

    #[test]
    fn test_trail_since_default() {
        assert_eq!(trail_since_default(100_000), 100_000 - 86_400);
    }

    #[test]
    fn test_optional_fields_round_trip() {
        let store = create_test_store();
        let p = Position {
            aircraft_id: "abc123".to_string(),
            callsign: None,
            latitude: 37.5,
            longitude: -122.5,
            altitude: None,
            speed: Some(2.0),
            heading: None,
            vertical_rate: Some(-64.0),
            squawk: Some("7700".to_string()),
            on_ground: true,
            timestamp: 10,
        };
        store.insert_positions(std::slice::from_ref(&p)).unwrap();
        assert_eq!(store.query_trail("abc123", 0).unwrap(), vec![p]);
    }

    #[test]
    fn test_stats() {
        let store = create_test_store();
        let empty = store.stats().unwrap();
        assert_eq!(empty.total_positions, 0);
        assert!(empty.oldest_timestamp.is_none());

        store
            .insert_positions(&[
                position("abc123", 37.1, -122.1, 100),
                position("abc123", 37.2, -122.2, 300),
                position("def456", 37.2, -122.2, 200),
            ])
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_positions, 3);
        assert_eq!(stats.distinct_aircraft, 2);
        assert_eq!(stats.oldest_timestamp, Some(100));
        assert_eq!(stats.newest_timestamp, Some(300));
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.db");

        {
            let store = PositionStore::open(&path).unwrap();
            store
                .insert_positions(&[position("abc123", 37.1, -122.1, 100)])
                .unwrap();
        }

        let store = PositionStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert!(store.stats().unwrap().db_size_bytes > 0);
    }
}
