//! Configuration management for airtrail.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::source::{SourceKind, MAX_RADIUS_NM};
use crate::tiles::{cover_region, BoundingBox, Tile};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "airtrail";

/// Default positions database file name.
const POSITIONS_FILE_NAME: &str = "positions.db";

/// Default sightings database file name.
const SIGHTINGS_FILE_NAME: &str = "sightings.db";

/// Environment variable prefix.
const ENV_PREFIX: &str = "AIRTRAIL_";

/// Default point/radius feed.
pub const DEFAULT_POINT_BASE_URL: &str = "https://api.airplanes.live/v2";

/// Default bounding-box feed.
pub const DEFAULT_BBOX_BASE_URL: &str = "https://opensky-network.org/api";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `AIRTRAIL_`, sections split on `__`)
/// 2. TOML config file at `~/.config/airtrail/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Poller configuration.
    pub poller: PollerConfig,
    /// Region covered when no explicit tiles are listed.
    pub region: RegionConfig,
    /// Query defaults.
    pub query: QueryConfig,
    /// Sighting aggregation configuration.
    pub sightings: SightingsConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the positions database.
    /// Defaults to `~/.local/share/airtrail/positions.db`
    pub positions_path: Option<PathBuf>,
    /// Path to the sightings database.
    /// Defaults to `~/.local/share/airtrail/sightings.db`
    pub sightings_path: Option<PathBuf>,
    /// How long positions are kept, in hours.
    pub retention_hours: u32,
}

/// Poller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Seconds between poll cycles.
    pub interval_secs: u64,
    /// Per-tile request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Which feed to query.
    pub source: SourceKind,
    /// Feed base URL; defaults depend on `source`.
    pub base_url: Option<String>,
    /// Explicit tile list. When empty, tiles are generated from `region`.
    pub tiles: Vec<Tile>,
}

/// Region to cover with generated tiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Southern edge in degrees.
    pub lat_min: f64,
    /// Northern edge in degrees.
    pub lat_max: f64,
    /// Western edge in degrees.
    pub lon_min: f64,
    /// Eastern edge in degrees.
    pub lon_max: f64,
    /// Radius of each generated tile in nautical miles.
    pub tile_radius_nm: f64,
}

/// Query defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// How far back latest-position queries look, in seconds.
    pub latest_max_age_secs: i64,
    /// Default trail window in hours.
    pub trail_window_hours: u32,
}

/// Sighting aggregation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SightingsConfig {
    /// Gap after which an aircraft starts a new episode, in seconds.
    pub staleness_secs: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            positions_path: None, // Resolved at runtime
            sightings_path: None,
            retention_hours: 24,
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            request_timeout_secs: 15,
            source: SourceKind::default(),
            base_url: None,
            tiles: Vec::new(),
        }
    }
}

impl Default for RegionConfig {
    fn default() -> Self {
        // San Francisco Bay Area
        Self {
            lat_min: 36.5,
            lat_max: 39.0,
            lon_min: -123.5,
            lon_max: -121.0,
            tile_radius_nm: 40.0,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            latest_max_age_secs: 180,
            trail_window_hours: 24,
        }
    }
}

impl Default for SightingsConfig {
    fn default() -> Self {
        Self {
            staleness_secs: 600,
        }
    }
}

impl RegionConfig {
    /// The region as a bounding box.
    #[must_use]
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::new(self.lat_min, self.lat_max, self.lon_min, self.lon_max)
    }
}

impl Config {
    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation
    /// fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        let config: Config = Self::figment(&config_file).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// The layered provider stack for `config_file`.
    #[must_use]
    pub fn figment(config_file: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.poller.interval_secs == 0 {
            return Err(Error::config_validation(
                "poller.interval_secs must be greater than 0",
            ));
        }

        if self.poller.request_timeout_secs == 0 {
            return Err(Error::config_validation(
                "poller.request_timeout_secs must be greater than 0",
            ));
        }

        if self.storage.retention_hours == 0 {
            return Err(Error::config_validation(
                "storage.retention_hours must be greater than 0",
            ));
        }

        if self.query.latest_max_age_secs <= 0 {
            return Err(Error::config_validation(
                "query.latest_max_age_secs must be greater than 0",
            ));
        }

        if self.sightings.staleness_secs <= 0 {
            return Err(Error::config_validation(
                "sightings.staleness_secs must be greater than 0",
            ));
        }

        if self.poller.tiles.is_empty() {
            if !self.region.bounding_box().is_valid() {
                return Err(Error::ConfigValidation {
                    message: format!("invalid region: {}", self.region.bounding_box()),
                });
            }
            validate_radius(self.region.tile_radius_nm, "region.tile_radius_nm")?;
        } else {
            for tile in &self.poller.tiles {
                if !(-90.0..=90.0).contains(&tile.lat) || !(-180.0..=180.0).contains(&tile.lon) {
                    return Err(Error::ConfigValidation {
                        message: format!("tile center out of range: {tile}"),
                    });
                }
                validate_radius(tile.radius_nm, "poller.tiles.radius_nm")?;
            }
        }

        Ok(())
    }

    /// Get the positions database path, resolving defaults if not set.
    #[must_use]
    pub fn positions_path(&self) -> PathBuf {
        self.storage
            .positions_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(POSITIONS_FILE_NAME))
    }

    /// Get the sightings database path, resolving defaults if not set.
    #[must_use]
    pub fn sightings_path(&self) -> PathBuf {
        self.storage
            .sightings_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(SIGHTINGS_FILE_NAME))
    }

    /// The feed base URL, defaulting per source kind.
    #[must_use]
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.poller.base_url {
            return url.as_str();
        }
        match self.poller.source {
            SourceKind::PointRadius => DEFAULT_POINT_BASE_URL,
            SourceKind::BoundingBox => DEFAULT_BBOX_BASE_URL,
        }
    }

    /// The tiles to poll: the explicit list if given, otherwise a grid
    /// covering the region.
    #[must_use]
    pub fn tiles(&self) -> Vec<Tile> {
        if self.poller.tiles.is_empty() {
            cover_region(&self.region.bounding_box(), self.region.tile_radius_nm)
        } else {
            self.poller.tiles.clone()
        }
    }

    /// Get the poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poller.interval_secs)
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.poller.request_timeout_secs)
    }

    /// Position retention in seconds.
    #[must_use]
    pub fn retention_secs(&self) -> i64 {
        i64::from(self.storage.retention_hours) * 60 * 60
    }

    /// Default trail window in seconds.
    #[must_use]
    pub fn trail_window_secs(&self) -> i64 {
        i64::from(self.query.trail_window_hours) * 60 * 60
    }
}

fn validate_radius(radius_nm: f64, field: &str) -> Result<()> {
    if radius_nm.is_finite() && radius_nm > 0.0 && radius_nm <= MAX_RADIUS_NM {
        Ok(())
    } else {
        Err(Error::ConfigValidation {
            message: format!("{field} must be in (0, {MAX_RADIUS_NM}], got {radius_nm}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.poller.interval_secs, 60);
        assert_eq!(config.poller.request_timeout_secs, 15);
        assert_eq!(config.poller.source, SourceKind::PointRadius);
        assert!(config.poller.tiles.is_empty());
        assert_eq!(config.sightings.staleness_secs, 600);
    }

    #[test]
    fn test_default_storage_config() {
        let storage = StorageConfig::default();

        assert!(storage.positions_path.is_none());
        assert!(storage.sightings_path.is_none());
        assert_eq!(storage.retention_hours, 24);
    }

    #[test]
    fn test_default_query_config() {
        let query = QueryConfig::default();
        assert_eq!(query.latest_max_age_secs, 180);
        assert_eq!(query.trail_window_hours, 24);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_interval() {
        let mut config = Config::default();
        config.poller.interval_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("interval_secs"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.poller.request_timeout_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("request_timeout_secs"));
    }

    #[test]
    fn test_validate_zero_retention() {
        let mut config = Config::default();
        config.storage.retention_hours = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("retention_hours"));
    }

    #[test]
    fn test_validate_inverted_region() {
        let mut config = Config::default();
        config.region.lat_min = 40.0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("invalid region"));
    }

    #[test]
    fn test_validate_region_ignored_with_explicit_tiles() {
        let mut config = Config::default();
        config.region.lat_min = 40.0;
        config.poller.tiles = vec![Tile::new(37.6, -122.4, 50.0)];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_tile_radius() {
        let mut config = Config::default();
        config.poller.tiles = vec![Tile::new(37.6, -122.4, 0.0)];
        assert!(config.validate().is_err());

        config.poller.tiles = vec![Tile::new(37.6, -122.4, 900.0)];
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("radius_nm"));
    }

    #[test]
    fn test_validate_tile_center_out_of_range() {
        let mut config = Config::default();
        config.poller.tiles = vec![Tile::new(95.0, 0.0, 10.0)];
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("out of range"));
    }

    #[test]
    fn test_positions_path_default() {
        let config = Config::default();
        assert!(config.positions_path().to_string_lossy().contains("positions.db"));
        assert!(config.sightings_path().to_string_lossy().contains("sightings.db"));
    }

    #[test]
    fn test_positions_path_custom() {
        let mut config = Config::default();
        config.storage.positions_path = Some(PathBuf::from("/custom/path/pos.sqlite"));

        assert_eq!(
            config.positions_path(),
            PathBuf::from("/custom/path/pos.sqlite")
        );
    }

    #[test]
    fn test_base_url_defaults_per_source() {
        let mut config = Config::default();
        assert_eq!(config.base_url(), DEFAULT_POINT_BASE_URL);

        config.poller.source = SourceKind::BoundingBox;
        assert_eq!(config.base_url(), DEFAULT_BBOX_BASE_URL);

        config.poller.base_url = Some("http://localhost:8080".to_string());
        assert_eq!(config.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_tiles_generated_from_region() {
        let config = Config::default();
        let tiles = config.tiles();
        assert!(!tiles.is_empty());
        assert!(tiles.iter().all(|t| (t.radius_nm - 40.0).abs() < f64::EPSILON));
    }

    #[test]
    fn test_tiles_explicit_list_kept_in_order() {
        let mut config = Config::default();
        let explicit = vec![Tile::new(38.0, -122.0, 30.0), Tile::new(37.0, -122.0, 30.0)];
        config.poller.tiles.clone_from(&explicit);
        assert_eq!(config.tiles(), explicit);
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.retention_secs(), 86_400);
        assert_eq!(config.trail_window_secs(), 86_400);
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("airtrail"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        // Loading from a nonexistent path should work (uses defaults)
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[poller]
interval_secs = 30
source = "bounding_box"

[[poller.tiles]]
lat = 51.47
lon = -0.45
radius_nm = 25.0

[sightings]
staleness_secs = 300
"#,
        )
        .unwrap();

        let config = Config::figment(&path).extract::<Config>().unwrap();
        assert_eq!(config.poller.interval_secs, 30);
        assert_eq!(config.poller.source, SourceKind::BoundingBox);
        assert_eq!(config.poller.tiles, vec![Tile::new(51.47, -0.45, 25.0)]);
        assert_eq!(config.sightings.staleness_secs, 300);
        // Untouched sections keep their defaults
        assert_eq!(config.storage.retention_hours, 24);
    }

    #[test]
    fn test_load_from_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[poller]\ninterval_secs = 0\n").unwrap();

        let err = Config::load_from(Some(path)).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));
    }

    #[test]
    fn test_storage_config_deserialize() {
        let json = r#"{"retention_hours": 6}"#;
        let storage: StorageConfig = serde_json::from_str(json).unwrap();
        assert_eq!(storage.retention_hours, 6);
        assert!(storage.positions_path.is_none());
    }

    #[test]
    fn test_config_serialize_round_trip() {
        let config = Config::default();
        let toml_like = serde_json::to_string(&config).unwrap();
        assert!(toml_like.contains("tile_radius_nm"));
        let back: Config = serde_json::from_str(&toml_like).unwrap();
        assert_eq!(config, back);
    }
}
