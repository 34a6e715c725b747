//! The bounding-box feed's state-vector format.
//!
//! Each aircraft is a JSON array whose meaning is fixed by position, not by
//! name. Consumers index into these arrays directly, so the field order must
//! never drift; every index is a named constant below and [`StateVector`]
//! is the only place that reads or writes them.
//!
//! The format reports metric units (metres, metres per second). Positions
//! in this crate are in feet and knots; the conversions live here too.

use serde_json::Value;

use crate::position::{Observation, Position};
use crate::source::SourceError;

/// ICAO 24-bit address as lowercase hex.
pub const IDX_ICAO24: usize = 0;
/// Callsign, may be padded with spaces.
pub const IDX_CALLSIGN: usize = 1;
/// Country inferred from the ICAO address.
pub const IDX_ORIGIN_COUNTRY: usize = 2;
/// Epoch seconds of the last position update.
pub const IDX_TIME_POSITION: usize = 3;
/// Epoch seconds of the last message of any kind.
pub const IDX_LAST_CONTACT: usize = 4;
/// Longitude in degrees.
pub const IDX_LONGITUDE: usize = 5;
/// Latitude in degrees.
pub const IDX_LATITUDE: usize = 6;
/// Barometric altitude in metres.
pub const IDX_BARO_ALTITUDE: usize = 7;
/// Ground flag.
pub const IDX_ON_GROUND: usize = 8;
/// Ground speed in metres per second.
pub const IDX_VELOCITY: usize = 9;
/// Track in degrees clockwise from north.
pub const IDX_TRUE_TRACK: usize = 10;
/// Vertical rate in metres per second.
pub const IDX_VERTICAL_RATE: usize = 11;
/// Receiver ids that contributed to this vector.
pub const IDX_SENSORS: usize = 12;
/// Geometric altitude in metres.
pub const IDX_GEO_ALTITUDE: usize = 13;
/// Transponder code.
pub const IDX_SQUAWK: usize = 14;
/// Special purpose indicator.
pub const IDX_SPI: usize = 15;
/// Origin of the position (0 = ADS-B).
pub const IDX_POSITION_SOURCE: usize = 16;

/// Number of fields in an encoded state vector.
pub const STATE_VECTOR_LEN: usize = 17;

const FEET_PER_METER: f64 = 3.280_84;
const KNOTS_PER_MPS: f64 = 1.943_844;
const FPM_PER_MPS: f64 = 196.850_394;

/// One decoded state vector.
#[derive(Debug, Clone, PartialEq)]
pub struct StateVector {
    /// ICAO 24-bit address.
    pub icao24: String,
    /// Callsign.
    pub callsign: Option<String>,
    /// Country of registration.
    pub origin_country: String,
    /// Time of last position report.
    pub time_position: Option<i64>,
    /// Time of last contact.
    pub last_contact: i64,
    /// Longitude in degrees.
    pub longitude: Option<f64>,
    /// Latitude in degrees.
    pub latitude: Option<f64>,
    /// Barometric altitude in metres.
    pub baro_altitude: Option<f64>,
    /// Whether the aircraft reports being on the ground.
    pub on_ground: bool,
    /// Ground speed in m/s.
    pub velocity: Option<f64>,
    /// Track in degrees.
    pub true_track: Option<f64>,
    /// Vertical rate in m/s.
    pub vertical_rate: Option<f64>,
    /// Contributing receivers.
    pub sensors: Option<Vec<i64>>,
    /// Geometric altitude in metres.
    pub geo_altitude: Option<f64>,
    /// Transponder code.
    pub squawk: Option<String>,
    /// Special purpose indicator.
    pub spi: bool,
    /// Position source code.
    pub position_source: i64,
}

impl StateVector {
    /// Decode one state-vector array.
    ///
    /// Arrays longer than [`STATE_VECTOR_LEN`] are accepted and the extra
    /// trailing fields ignored; newer feed revisions append fields.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Malformed`] if the array is too short or the
    /// identity is not a string.
    pub fn from_array(fields: &[Value]) -> Result<Self, SourceError> {
        if fields.len() < STATE_VECTOR_LEN {
            return Err(SourceError::Malformed(format!(
                "state vector has {} fields, expected {STATE_VECTOR_LEN}",
                fields.len()
            )));
        }

        let icao24 = fields[IDX_ICAO24]
            .as_str()
            .ok_or_else(|| SourceError::Malformed("state vector without icao24".to_string()))?
            .to_string();

        let sensors = fields[IDX_SENSORS]
            .as_array()
            .map(|ids| ids.iter().filter_map(Value::as_i64).collect());

        Ok(Self {
            icao24,
            callsign: fields[IDX_CALLSIGN].as_str().map(str::to_string),
            origin_country: fields[IDX_ORIGIN_COUNTRY]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            time_position: fields[IDX_TIME_POSITION].as_i64(),
            last_contact: fields[IDX_LAST_CONTACT].as_i64().unwrap_or_default(),
            longitude: fields[IDX_LONGITUDE].as_f64(),
            latitude: fields[IDX_LATITUDE].as_f64(),
            baro_altitude: fields[IDX_BARO_ALTITUDE].as_f64(),
            on_ground: fields[IDX_ON_GROUND].as_bool().unwrap_or(false),
            velocity: fields[IDX_VELOCITY].as_f64(),
            true_track: fields[IDX_TRUE_TRACK].as_f64(),
            vertical_rate: fields[IDX_VERTICAL_RATE].as_f64(),
            sensors,
            geo_altitude: fields[IDX_GEO_ALTITUDE].as_f64(),
            squawk: fields[IDX_SQUAWK].as_str().map(str::to_string),
            spi: fields[IDX_SPI].as_bool().unwrap_or(false),
            position_source: fields[IDX_POSITION_SOURCE].as_i64().unwrap_or_default(),
        })
    }

    /// Decode a JSON value holding one state-vector array.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Malformed`] if the value is not a valid array.
    pub fn from_value(value: &Value) -> Result<Self, SourceError> {
        let fields = value
            .as_array()
            .ok_or_else(|| SourceError::Malformed("state vector is not an array".to_string()))?;
        Self::from_array(fields)
    }

    /// Encode into the fixed-index array form.
    #[must_use]
    pub fn to_array(&self) -> Vec<Value> {
        let mut fields = vec![Value::Null; STATE_VECTOR_LEN];
        fields[IDX_ICAO24] = Value::from(self.icao24.clone());
        fields[IDX_CALLSIGN] = Value::from(self.callsign.clone());
        fields[IDX_ORIGIN_COUNTRY] = Value::from(self.origin_country.clone());
        fields[IDX_TIME_POSITION] = Value::from(self.time_position);
        fields[IDX_LAST_CONTACT] = Value::from(self.last_contact);
        fields[IDX_LONGITUDE] = Value::from(self.longitude);
        fields[IDX_LATITUDE] = Value::from(self.latitude);
        fields[IDX_BARO_ALTITUDE] = Value::from(self.baro_altitude);
        fields[IDX_ON_GROUND] = Value::from(self.on_ground);
        fields[IDX_VELOCITY] = Value::from(self.velocity);
        fields[IDX_TRUE_TRACK] = Value::from(self.true_track);
        fields[IDX_VERTICAL_RATE] = Value::from(self.vertical_rate);
        fields[IDX_SENSORS] = Value::from(self.sensors.clone());
        fields[IDX_GEO_ALTITUDE] = Value::from(self.geo_altitude);
        fields[IDX_SQUAWK] = Value::from(self.squawk.clone());
        fields[IDX_SPI] = Value::from(self.spi);
        fields[IDX_POSITION_SOURCE] = Value::from(self.position_source);
        fields
    }

    /// Translate a stored position into a state vector.
    ///
    /// Altitude, speed and vertical rate are converted to metric. The
    /// position's own timestamp becomes both time fields.
    #[must_use]
    pub fn from_position(position: &Position, origin_country: Option<&str>) -> Self {
        Self {
            icao24: position.aircraft_id.clone(),
            callsign: position.callsign.clone(),
            origin_country: origin_country.unwrap_or_default().to_string(),
            time_position: Some(position.timestamp),
            last_contact: position.timestamp,
            longitude: Some(position.longitude),
            latitude: Some(position.latitude),
            baro_altitude: position.altitude.map(|ft| ft / FEET_PER_METER),
            on_ground: position.on_ground,
            velocity: position.speed.map(|kt| kt / KNOTS_PER_MPS),
            true_track: position.heading,
            vertical_rate: position.vertical_rate.map(|fpm| fpm / FPM_PER_MPS),
            sensors: None,
            geo_altitude: None,
            squawk: position.squawk.clone(),
            spi: false,
            position_source: 0,
        }
    }

    /// Convert into a raw observation in feet, knots and feet per minute.
    ///
    /// Barometric altitude is preferred over geometric altitude.
    #[must_use]
    pub fn to_observation(&self) -> Observation {
        Observation {
            aircraft_id: Some(self.icao24.clone()),
            callsign: self.callsign.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self
                .baro_altitude
                .or(self.geo_altitude)
                .map(|m| m * FEET_PER_METER),
            speed: self.velocity.map(|v| v * KNOTS_PER_MPS),
            heading: self.true_track,
            vertical_rate: self.vertical_rate.map(|v| v * FPM_PER_MPS),
            squawk: self.squawk.clone(),
        }
    }
}

/// Encode positions as a bounding-box feed states response.
///
/// The result has the `{"time": .., "states": [[..], ..]}` shape the
/// bounding-box feed returns, so it can be fed back into a sighting import.
#[must_use]
pub fn states_response(time: i64, positions: &[Position]) -> Value {
    let states: Vec<Value> = positions
        .iter()
        .map(|p| Value::Array(StateVector::from_position(p, None).to_array()))
        .collect();
    serde_json::json!({ "time": time, "states": states })
}
