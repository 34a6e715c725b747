//! Core position types for airtrail.
//!
//! An [`Observation`] is one aircraft as reported by a feed, with every field
//! optional. A [`Position`] is what the store keeps: an observation that has
//! an identity and a location, stamped with the ingest time.

use serde::{Deserialize, Serialize};

/// Speeds below this many knots are treated as taxiing or parked.
pub const ON_GROUND_SPEED_KNOTS: f64 = 5.0;

/// One stored aircraft position.
///
/// Records are immutable once written. The same `aircraft_id` appears many
/// times across time; that sequence is the aircraft's trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Normalized lowercase hex identity.
    pub aircraft_id: String,
    /// Trimmed callsign, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callsign: Option<String>,
    /// Latitude in WGS84 degrees.
    pub latitude: f64,
    /// Longitude in WGS84 degrees.
    pub longitude: f64,
    /// Altitude in feet.
    pub altitude: Option<f64>,
    /// Speed in knots.
    pub speed: Option<f64>,
    /// Track over ground in degrees.
    pub heading: Option<f64>,
    /// Vertical rate in feet per minute.
    pub vertical_rate: Option<f64>,
    /// Transponder code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub squawk: Option<String>,
    /// Derived from `speed`, see [`is_on_ground`].
    pub on_ground: bool,
    /// Ingest time in epoch seconds.
    pub timestamp: i64,
}

/// A raw aircraft record from a feed, before validation.
///
/// Feed adapters resolve their own fallback fields (barometric before
/// geometric altitude and so on) before building one of these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Identity as reported, not yet normalized.
    pub aircraft_id: Option<String>,
    /// Callsign as reported.
    pub callsign: Option<String>,
    /// Latitude in degrees.
    pub latitude: Option<f64>,
    /// Longitude in degrees.
    pub longitude: Option<f64>,
    /// Altitude in feet.
    pub altitude: Option<f64>,
    /// Speed in knots.
    pub speed: Option<f64>,
    /// Track in degrees.
    pub heading: Option<f64>,
    /// Vertical rate in feet per minute.
    pub vertical_rate: Option<f64>,
    /// Transponder code.
    pub squawk: Option<String>,
}

impl Observation {
    /// Normalized identity of this observation, if it has one.
    #[must_use]
    pub fn identity(&self) -> Option<String> {
        normalize_aircraft_id(self.aircraft_id.as_deref())
    }

    /// Convert into a storable position stamped with `timestamp`.
    ///
    /// Returns `None` when the identity or either coordinate is missing.
    #[must_use]
    pub fn into_position(self, timestamp: i64) -> Option<Position> {
        let aircraft_id = self.identity()?;
        let latitude = self.latitude.filter(|v| v.is_finite())?;
        let longitude = self.longitude.filter(|v| v.is_finite())?;

        Some(Position {
            aircraft_id,
            callsign: normalize_text(self.callsign.as_deref()),
            latitude,
            longitude,
            altitude: self.altitude,
            speed: self.speed,
            heading: self.heading,
            vertical_rate: self.vertical_rate,
            squawk: normalize_text(self.squawk.as_deref()),
            on_ground: is_on_ground(self.speed),
            timestamp,
        })
    }
}

/// Trim and lowercase an aircraft identity; blank becomes `None`.
#[must_use]
pub fn normalize_aircraft_id(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_ascii_lowercase())
    }
}

/// Trim a free-text field such as a callsign; blank becomes `None`.
#[must_use]
pub fn normalize_text(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// An aircraft is on the ground when it reports a speed below 5 knots.
///
/// No speed means unknown, which is reported as airborne.
#[must_use]
pub fn is_on_ground(speed: Option<f64>) -> bool {
    speed.is_some_and(|s| s < ON_GROUND_SPEED_KNOTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(id: &str) -> Observation {
        Observation {
            aircraft_id: Some(id.to_string()),
            latitude: Some(37.5),
            longitude: Some(-122.3),
            ..Observation::default()
        }
    }

    #[test]
    fn test_normalize_aircraft_id() {
        assert_eq!(
            normalize_aircraft_id(Some("  A1B2C3 ")),
            Some("a1b2c3".to_string())
        );
        assert_eq!(normalize_aircraft_id(Some("   ")), None);
        assert_eq!(normalize_aircraft_id(None), None);
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(
            normalize_text(Some("UAL123  ")),
            Some("UAL123".to_string())
        );
        assert_eq!(normalize_text(Some("")), None);
    }

    #[test]
    fn test_is_on_ground() {
        assert!(is_on_ground(Some(0.0)));
        assert!(is_on_ground(Some(4.9)));
        assert!(!is_on_ground(Some(5.0)));
        assert!(!is_on_ground(Some(250.0)));
        assert!(!is_on_ground(None));
    }

    #[test]
    fn test_into_position_normalizes_fields() {
        let mut obs = observation("ABC123");
        obs.callsign = Some(" SWA42 ".to_string());
        obs.speed = Some(3.0);
        obs.squawk = Some(String::new());

        let pos = obs.into_position(1_700_000_000).unwrap();
        assert_eq!(pos.aircraft_id, "abc123");
        assert_eq!(pos.callsign.as_deref(), Some("SWA42"));
        assert!(pos.on_ground);
        assert!(pos.squawk.is_none());
        assert_eq!(pos.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_into_position_requires_identity() {
        let mut obs = observation("abc123");
        obs.aircraft_id = None;
        assert!(obs.into_position(0).is_none());

        let mut obs = observation("abc123");
        obs.aircraft_id = Some("  ".to_string());
        assert!(obs.into_position(0).is_none());
    }

    #[test]
    fn test_into_position_requires_coordinates() {
        let mut obs = observation("abc123");
        obs.latitude = None;
        assert!(obs.into_position(0).is_none());

        let mut obs = observation("abc123");
        obs.longitude = Some(f64::NAN);
        assert!(obs.into_position(0).is_none());
    }

    #[test]
    fn test_position_serialization_skips_empty_callsign() {
        let pos = observation("abc123").into_position(10).unwrap();
        let json = serde_json::to_string(&pos).unwrap();
        assert!(!json.contains("callsign"));
        assert!(json.contains("\"aircraft_id\":\"abc123\""));
    }
}
