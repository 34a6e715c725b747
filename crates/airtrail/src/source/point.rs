//! Center-and-radius aircraft feed.
//!
//! Queries `GET {base}/point/{lat}/{lon}/{radius}` and decodes the `ac`
//! array of loosely typed aircraft objects.

use std::time::Duration;

use serde::Deserialize;
use tracing::trace;

use super::{get_bytes, http_client, AircraftSource, SourceError};
use crate::position::Observation;
use crate::tiles::Tile;

/// Largest radius the feed accepts, in nautical miles.
pub const MAX_RADIUS_NM: f64 = 250.0;

#[derive(Debug, Deserialize)]
struct PointResponse {
    #[serde(default, alias = "aircraft")]
    ac: Option<Vec<RawAircraft>>,
}

/// Barometric altitude is either a number of feet or the string `"ground"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BaroAltitude {
    Feet(f64),
    Label(String),
}

impl BaroAltitude {
    fn feet(&self) -> Option<f64> {
        match self {
            Self::Feet(ft) => Some(*ft),
            Self::Label(label) if label.eq_ignore_ascii_case("ground") => Some(0.0),
            Self::Label(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAircraft {
    hex: Option<String>,
    flight: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    alt_baro: Option<BaroAltitude>,
    alt_geom: Option<f64>,
    gs: Option<f64>,
    tas: Option<f64>,
    track: Option<f64>,
    baro_rate: Option<f64>,
    geom_rate: Option<f64>,
    squawk: Option<String>,
}

impl From<RawAircraft> for Observation {
    fn from(raw: RawAircraft) -> Self {
        Self {
            aircraft_id: raw.hex,
            callsign: raw.flight,
            latitude: raw.lat,
            longitude: raw.lon,
            altitude: raw.alt_baro.as_ref().and_then(BaroAltitude::feet).or(raw.alt_geom),
            speed: raw.gs.or(raw.tas),
            heading: raw.track,
            vertical_rate: raw.baro_rate.or(raw.geom_rate),
            squawk: raw.squawk,
        }
    }
}

/// Client for the center-and-radius feed.
#[derive(Debug, Clone)]
pub struct PointRadiusSource {
    http: reqwest::Client,
    base_url: String,
}

impl PointRadiusSource {
    /// Create a client for the feed rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The request URL for `tile`. The radius is rounded up to whole
    /// nautical miles and clamped to the feed's maximum.
    #[must_use]
    pub fn url_for(&self, tile: &Tile) -> String {
        let radius = tile.radius_nm.ceil().clamp(1.0, MAX_RADIUS_NM);
        format!(
            "{}/point/{:.4}/{:.4}/{radius}",
            self.base_url, tile.lat, tile.lon
        )
    }
}

/// Decode a feed response body into observations.
fn decode(body: &[u8]) -> Result<Vec<Observation>, SourceError> {
    let response: PointResponse =
        serde_json::from_slice(body).map_err(|e| SourceError::Malformed(e.to_string()))?;
    Ok(response
        .ac
        .unwrap_or_default()
        .into_iter()
        .map(Observation::from)
        .collect())
}

#[async_trait::async_trait]
impl AircraftSource for PointRadiusSource {
    fn name(&self) -> &'static str {
        "point_radius"
    }

    async fn fetch(&self, tile: &Tile) -> Result<Vec<Observation>, SourceError> {
        let url = self.url_for(tile);
        trace!(url = %url, "Requesting point feed");
        let body = get_bytes(&self.http, &url).await?;
        decode(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> PointRadiusSource {
        PointRadiusSource::new("https://feed.test/v2/", Duration::from_secs(15)).unwrap()
    }

    #[test]
    fn test_url_for_tile() {
        let url = source().url_for(&Tile::new(37.621_31, -122.378_96, 39.2));
        assert_eq!(url, "https://feed.test/v2/point/37.6213/-122.3790/40");
    }

    #[test]
    fn test_url_clamps_radius() {
        let url = source().url_for(&Tile::new(0.0, 0.0, 900.0));
        assert!(url.ends_with("/250"), "{url}");
    }

    #[test]
    fn test_decode_prefers_barometric_and_ground_speed() {
        let body = br#"{"ac": [{
            "hex": "A1B2C3", "flight": "UAL123  ", "lat": 37.5, "lon": -122.3,
            "alt_baro": 12000, "alt_geom": 12350, "gs": 310.5, "tas": 330,
            "track": 88.1, "baro_rate": -640, "geom_rate": -600, "squawk": "4512"
        }], "now": 1700000000000}"#;

        let obs = decode(body).unwrap();
        assert_eq!(obs.len(), 1);
        let o = &obs[0];
        assert_eq!(o.aircraft_id.as_deref(), Some("A1B2C3"));
        assert_eq!(o.altitude, Some(12_000.0));
        assert_eq!(o.speed, Some(310.5));
        assert_eq!(o.vertical_rate, Some(-640.0));
        assert_eq!(o.heading, Some(88.1));
        assert_eq!(o.squawk.as_deref(), Some("4512"));
    }

    #[test]
    fn test_decode_falls_back_to_geometric_fields() {
        let body = br#"{"ac": [{"hex": "abc123", "lat": 1.0, "lon": 2.0,
            "alt_geom": 5000, "tas": 120, "geom_rate": 64}]}"#;
        let o = &decode(body).unwrap()[0];
        assert_eq!(o.altitude, Some(5000.0));
        assert_eq!(o.speed, Some(120.0));
        assert_eq!(o.vertical_rate, Some(64.0));
    }

    #[test]
    fn test_decode_ground_altitude() {
        let body = br#"{"ac": [{"hex": "abc123", "lat": 1.0, "lon": 2.0,
            "alt_baro": "ground", "gs": 2.1}]}"#;
        let o = decode(body).unwrap().remove(0);
        assert_eq!(o.altitude, Some(0.0));
        let position = o.into_position(100).unwrap();
        assert!(position.on_ground);
    }

    #[test]
    fn test_decode_keeps_records_without_position() {
        // Filtering happens in the poller, not in the feed adapter
        let body = br#"{"ac": [{"hex": "abc123"}, {"flight": "N1"}]}"#;
        assert_eq!(decode(body).unwrap().len(), 2);
    }

    #[test]
    fn test_decode_empty_and_null_lists() {
        assert!(decode(br#"{"ac": []}"#).unwrap().is_empty());
        assert!(decode(br#"{"ac": null}"#).unwrap().is_empty());
        assert!(decode(br#"{"msg": "No error"}"#).unwrap().is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode(b"<html>rate limited</html>"),
            Err(SourceError::Malformed(_))
        ));
    }
}
