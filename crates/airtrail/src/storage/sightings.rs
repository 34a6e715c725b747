//! Sighting episode store.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, trace};

use super::schema::SIGHTING_SCHEMA;
use super::{
    file_size, lock, open_connection, open_memory_connection, to_count, to_sql_int, unix_now,
};
use crate::error::Result;
use crate::sighting::{
    CountryCount, Episode, SightingObservation, SightingStats, UpsertReport,
    DEFAULT_STALENESS_SECS,
};

/// Window for the "recently seen" statistic, in seconds.
pub const STATS_RECENT_WINDOW_SECS: i64 = 24 * 60 * 60;

/// Number of countries reported by [`SightingStore::get_stats`].
const TOP_COUNTRIES: i64 = 5;

const EPISODE_COLUMNS: &str = "id, aircraft_id, callsign, origin_country, first_seen, last_seen, \
                               min_altitude, max_altitude, max_speed, lat, lon";

/// Store of sighting episodes.
#[derive(Debug)]
pub struct SightingStore {
    path: PathBuf,
    conn: Mutex<Connection>,
    staleness_secs: i64,
}

impl SightingStore {
    /// Open or create the sightings database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema
    /// initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = open_connection(&path, SIGHTING_SCHEMA)?;
        Ok(Self {
            path,
            conn: Mutex::new(conn),
            staleness_secs: DEFAULT_STALENESS_SECS,
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
            conn: Mutex::new(open_memory_connection(SIGHTING_SCHEMA)?),
            staleness_secs: DEFAULT_STALENESS_SECS,
        })
    }

    /// Use a different staleness window.
    #[must_use]
    pub fn with_staleness(mut self, staleness_secs: i64) -> Self {
        self.staleness_secs = staleness_secs;
        self
    }

    /// The staleness window in seconds.
    #[must_use]
    pub fn staleness_secs(&self) -> i64 {
        self.staleness_secs
    }

    /// Path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fold observations into episodes, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if a database operation fails. Observations before
    /// the failing one stay committed.
    pub fn upsert_sightings(&self, observations: &[SightingObservation]) -> Result<UpsertReport> {
        self.upsert_sightings_at(observations, unix_now())
    }

    /// Fold observations into episodes as of `now`.
    ///
    /// Each observation extends the aircraft's active episode if one has
    /// `last_seen > now - staleness`, otherwise opens a new one. Each
    /// observation is its own read-modify-write transaction. Observations
    /// without an identity are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a database operation fails.
    pub fn upsert_sightings_at(
        &self,
        observations: &[SightingObservation],
        now: i64,
    ) -> Result<UpsertReport> {
        let mut report = UpsertReport::default();
        let mut conn = lock(&self.conn)?;

        for obs in observations {
            let Some(aircraft_id) = obs.identity() else {
                trace!("Skipping sighting without identity");
                report.skipped += 1;
                continue;
            };

            let tx = conn.transaction()?;
            let active = Self::find_latest(&tx, &aircraft_id)?
                .filter(|episode| episode.is_active(now, self.staleness_secs));
            match active {
                Some(mut episode) => {
                    episode.absorb(obs, now);
                    Self::update_episode(&tx, &episode)?;
                    report.updated += 1;
                }
                None => {
                    let episode = Episode::open(aircraft_id, obs, now);
                    Self::insert_episode(&tx, &episode)?;
                    report.created += 1;
                }
            }
            tx.commit()?;
        }

        debug!(
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            "Upserted sightings"
        );
        Ok(report)
    }

    /// Episodes ordered by most recently seen.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_history(&self, limit: usize, offset: usize) -> Result<Vec<Episode>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            r"
            SELECT {EPISODE_COLUMNS} FROM sightings
            ORDER BY last_seen DESC, id DESC
            LIMIT ?1 OFFSET ?2
            "
        ))?;

        let episodes = stmt
            .query_map(
                params![to_sql_int(limit), to_sql_int(offset)],
                Self::row_to_episode,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(episodes)
    }

    /// Aggregate statistics as of the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_stats(&self) -> Result<SightingStats> {
        self.get_stats_at(unix_now())
    }

    /// Aggregate statistics as of `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_stats_at(&self, now: i64) -> Result<SightingStats> {
        let conn = lock(&self.conn)?;

        let total_aircraft: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT aircraft_id) FROM sightings",
            [],
            |row| row.get(0),
        )?;

        let aircraft_last_24h: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT aircraft_id) FROM sightings WHERE last_seen >= ?1",
            [now - STATS_RECENT_WINDOW_SECS],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            r"
            SELECT origin_country, COUNT(DISTINCT aircraft_id) AS aircraft
            FROM sightings
            WHERE origin_country IS NOT NULL AND origin_country <> ''
            GROUP BY origin_country
            ORDER BY aircraft DESC, origin_country ASC
            LIMIT ?1
            ",
        )?;
        let top_countries = stmt
            .query_map([TOP_COUNTRIES], |row| {
                Ok(CountryCount {
                    country: row.get(0)?,
                    aircraft: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(SightingStats {
            total_aircraft,
            aircraft_last_24h,
            top_countries,
        })
    }

    /// Number of episodes stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn episode_count(&self) -> Result<usize> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sightings", [], |row| row.get(0))?;
        Ok(to_count(count))
    }

    /// Size of the database file in bytes.
    #[must_use]
    pub fn db_size_bytes(&self) -> u64 {
        file_size(&self.path)
    }

    /// The aircraft's most recently seen episode. Older episodes can never be
    /// active when this one is not.
    fn find_latest(tx: &Transaction<'_>, aircraft_id: &str) -> Result<Option<Episode>> {
        let episode = tx
            .query_row(
                &format!(
                    r"
                    SELECT {EPISODE_COLUMNS} FROM sightings
                    WHERE aircraft_id = ?1
                    ORDER BY last_seen DESC, id DESC
                    LIMIT 1
                    "
                ),
                params![aircraft_id],
                Self::row_to_episode,
            )
            .optional()?;
        Ok(episode)
    }

    fn insert_episode(tx: &Transaction<'_>, episode: &Episode) -> Result<i64> {
        tx.execute(
            r"
            INSERT INTO sightings (aircraft_id, callsign, origin_country, first_seen, last_seen,
                min_altitude, max_altitude, max_speed, lat, lon)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
            params![
                episode.aircraft_id,
                episode.callsign,
                episode.origin_country,
                episode.first_seen,
                episode.last_seen,
                episode.min_altitude,
                episode.max_altitude,
                episode.max_speed,
                episode.lat,
                episode.lon,
            ],
        )?;
        let id = tx.last_insert_rowid();
        trace!(id, aircraft_id = %episode.aircraft_id, "Opened episode");
        Ok(id)
    }

    fn update_episode(tx: &Transaction<'_>, episode: &Episode) -> Result<()> {
        tx.execute(
            r"
            UPDATE sightings SET callsign = ?1, last_seen = ?2, min_altitude = ?3,
                max_altitude = ?4, max_speed = ?5, lat = ?6, lon = ?7
            WHERE id = ?8
            ",
            params![
                episode.callsign,
                episode.last_seen,
                episode.min_altitude,
                episode.max_altitude,
                episode.max_speed,
                episode.lat,
                episode.lon,
                episode.id,
            ],
        )?;
        Ok(())
    }

    fn row_to_episode(row: &rusqlite::Row) -> rusqlite::Result<Episode> {
        Ok(Episode {
            id: Some(row.get(0)?),
            aircraft_id: row.get(1)?,
            callsign: row.get(2)?,
            origin_country: row.get(3)?,
            first_seen: row.get(4)?,
            last_seen: row.get(5)?,
            min_altitude: row.get(6)?,
            max_altitude: row.get(7)?,
            max_speed: row.get(8)?,
            lat: row.get(9)?,
            lon: row.get(10)?,
        })
    }
}
