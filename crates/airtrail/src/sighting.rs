//! Sighting episode types.
//!
//! An [`Episode`] is one continuous stretch of observations of an aircraft.
//! It stays open while new observations keep arriving within the staleness
//! window; after a longer gap the next observation opens a new episode.
//!
//! Episodes aggregate differently from the poller's merge step: position and
//! callsign follow the latest observation while altitude and speed bounds
//! are running min/max values that absent inputs never touch.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::position::{normalize_aircraft_id, normalize_text};
use crate::source::{decode_states, SourceError};
use crate::statevector::StateVector;

/// Gap after which a new observation starts a new episode, in seconds.
pub const DEFAULT_STALENESS_SECS: i64 = 600;

/// One sighting episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Identifier assigned by the storage layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Normalized aircraft identity.
    pub aircraft_id: String,
    /// Last non-empty callsign seen.
    pub callsign: Option<String>,
    /// Country of registration, as given when the episode opened.
    pub origin_country: Option<String>,
    /// First observation time, epoch seconds.
    pub first_seen: i64,
    /// Latest observation time, epoch seconds.
    pub last_seen: i64,
    /// Lowest altitude observed.
    pub min_altitude: Option<f64>,
    /// Highest altitude observed.
    pub max_altitude: Option<f64>,
    /// Highest speed observed.
    pub max_speed: Option<f64>,
    /// Latitude of the latest observation.
    pub lat: Option<f64>,
    /// Longitude of the latest observation.
    pub lon: Option<f64>,
}

/// Input to the sighting upsert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SightingObservation {
    /// Aircraft identity; records without one are skipped.
    pub aircraft_id: Option<String>,
    /// Callsign.
    pub callsign: Option<String>,
    /// Country of registration.
    pub origin_country: Option<String>,
    /// Altitude in feet.
    pub altitude: Option<f64>,
    /// Speed in knots.
    pub speed: Option<f64>,
    /// Latitude in degrees.
    pub lat: Option<f64>,
    /// Longitude in degrees.
    pub lon: Option<f64>,
}

impl SightingObservation {
    /// Normalized identity, if present.
    #[must_use]
    pub fn identity(&self) -> Option<String> {
        normalize_aircraft_id(self.aircraft_id.as_deref())
    }
}

impl From<&StateVector> for SightingObservation {
    fn from(sv: &StateVector) -> Self {
        let obs = sv.to_observation();
        Self {
            aircraft_id: obs.aircraft_id,
            callsign: obs.callsign,
            origin_country: normalize_text(Some(sv.origin_country.as_str())),
            altitude: obs.altitude,
            speed: obs.speed,
            lat: obs.latitude,
            lon: obs.longitude,
        }
    }
}

/// Parse an externally supplied sighting batch.
///
/// Accepts either a JSON array of [`SightingObservation`] objects or a
/// bounding-box feed states response.
///
/// # Errors
///
/// Returns an error if the body is neither form, including an object
/// without a `states` field.
pub fn parse_batch(body: &[u8]) -> Result<Vec<SightingObservation>> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    if value.is_array() {
        return Ok(serde_json::from_value(value)?);
    }
    if value.get("states").is_none() {
        return Err(SourceError::Malformed(
            "expected an array of sightings or an object with `states`".to_string(),
        )
        .into());
    }
    Ok(decode_states(body)?
        .iter()
        .map(SightingObservation::from)
        .collect())
}

impl Episode {
    /// Open a new episode from its first observation.
    #[must_use]
    pub fn open(aircraft_id: String, obs: &SightingObservation, now: i64) -> Self {
        Self {
            id: None,
            aircraft_id,
            callsign: normalize_text(obs.callsign.as_deref()),
            origin_country: normalize_text(obs.origin_country.as_deref()),
            first_seen: now,
            last_seen: now,
            min_altitude: obs.altitude,
            max_altitude: obs.altitude,
            max_speed: obs.speed,
            lat: obs.lat,
            lon: obs.lon,
        }
    }

    /// Fold a new observation into this episode.
    ///
    /// Altitude and speed bounds only move when the observation carries a
    /// value. Position is replaced even by an absent value. The callsign is
    /// replaced only by a non-empty one.
    pub fn absorb(&mut self, obs: &SightingObservation, now: i64) {
        self.last_seen = now;

        if let Some(altitude) = obs.altitude {
            self.min_altitude = Some(self.min_altitude.map_or(altitude, |m| m.min(altitude)));
            self.max_altitude = Some(self.max_altitude.map_or(altitude, |m| m.max(altitude)));
        }
        if let Some(speed) = obs.speed {
            self.max_speed = Some(self.max_speed.map_or(speed, |m| m.max(speed)));
        }

        self.lat = obs.lat;
        self.lon = obs.lon;

        if let Some(callsign) = normalize_text(obs.callsign.as_deref()) {
            self.callsign = Some(callsign);
        }
    }

    /// Whether the episode is still open at `now`.
    #[must_use]
    pub fn is_active(&self, now: i64, staleness_secs: i64) -> bool {
        self.last_seen > now - staleness_secs
    }

    /// Length of the episode in seconds.
    #[must_use]
    pub fn duration_secs(&self) -> i64 {
        self.last_seen - self.first_seen
    }
}

/// A country and how many distinct aircraft were seen from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryCount {
    /// Country name.
    pub country: String,
    /// Distinct aircraft.
    pub aircraft: i64,
}

/// Aggregate sighting statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SightingStats {
    /// Distinct aircraft ever seen.
    pub total_aircraft: i64,
    /// Distinct aircraft seen in the last 24 hours.
    pub aircraft_last_24h: i64,
    /// Up to five countries with the most distinct aircraft.
    pub top_countries: Vec<CountryCount>,
}

/// Result of one upsert batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertReport {
    /// Episodes opened.
    pub created: usize,
    /// Existing episodes extended.
    pub updated: usize,
    /// Records skipped for lack of identity.
    pub skipped: usize,
}
