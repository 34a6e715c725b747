//! `SQLite` schema definitions.
//!
//! Positions and sightings live in separate database files; each file gets
//! its own statement set plus the shared metadata table.

/// SQL statement to create the positions table.
pub const CREATE_POSITIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS positions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    aircraft_id TEXT NOT NULL,
    callsign TEXT,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    altitude REAL,
    speed REAL,
    heading REAL,
    vertical_rate REAL,
    squawk TEXT,
    on_ground INTEGER NOT NULL DEFAULT 0,
    timestamp INTEGER NOT NULL
)
";

/// Spatial index for bounding-box queries.
pub const CREATE_POSITIONS_SPATIAL_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_positions_lat_lon_ts ON positions(latitude, longitude, timestamp)
";

/// Per-aircraft index for trail queries.
pub const CREATE_POSITIONS_AIRCRAFT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_positions_aircraft_ts ON positions(aircraft_id, timestamp)
";

/// Time index for retention deletes.
pub const CREATE_POSITIONS_TIMESTAMP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_positions_timestamp ON positions(timestamp)
";

/// SQL statement to create the sightings table.
pub const CREATE_SIGHTINGS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS sightings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    aircraft_id TEXT NOT NULL,
    callsign TEXT,
    origin_country TEXT,
    first_seen INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,
    min_altitude REAL,
    max_altitude REAL,
    max_speed REAL,
    lat REAL,
    lon REAL
)
";

/// Lookup of the active episode for an aircraft.
pub const CREATE_SIGHTINGS_AIRCRAFT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_sightings_aircraft_last_seen ON sightings(aircraft_id, last_seen DESC)
";

/// History ordering.
pub const CREATE_SIGHTINGS_LAST_SEEN_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_sightings_last_seen ON sightings(last_seen DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// Schema statements for the positions database, in order.
pub const POSITION_SCHEMA: &[&str] = &[
    CREATE_POSITIONS_TABLE,
    CREATE_POSITIONS_SPATIAL_INDEX,
    CREATE_POSITIONS_AIRCRAFT_INDEX,
    CREATE_POSITIONS_TIMESTAMP_INDEX,
    CREATE_METADATA_TABLE,
];

/// Schema statements for the sightings database, in order.
pub const SIGHTING_SCHEMA: &[&str] = &[
    CREATE_SIGHTINGS_TABLE,
    CREATE_SIGHTINGS_AIRCRAFT_INDEX,
    CREATE_SIGHTINGS_LAST_SEEN_INDEX,
    CREATE_METADATA_TABLE,
];
