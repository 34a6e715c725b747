//! Bounding-box state-vector feed.
//!
//! Queries `GET {base}/states/all?lamin=..&lomin=..&lamax=..&lomax=..` with
//! the tile's enclosing box. The response carries positional arrays decoded
//! by [`StateVector`].

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use super::{get_bytes, http_client, AircraftSource, SourceError};
use crate::position::Observation;
use crate::statevector::StateVector;
use crate::tiles::Tile;

#[derive(Debug, Deserialize)]
struct StatesResponse {
    #[serde(default)]
    time: i64,
    #[serde(default)]
    states: Option<Vec<Value>>,
}

/// Client for the bounding-box feed.
#[derive(Debug, Clone)]
pub struct BoundingBoxSource {
    http: reqwest::Client,
    base_url: String,
}

impl BoundingBoxSource {
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

    /// The request URL for `tile`'s enclosing bounding box.
    #[must_use]
    pub fn url_for(&self, tile: &Tile) -> String {
        let bbox = tile.bounding_box();
        format!(
            "{}/states/all?lamin={:.4}&lomin={:.4}&lamax={:.4}&lomax={:.4}",
            self.base_url, bbox.lat_min, bbox.lon_min, bbox.lat_max, bbox.lon_max
        )
    }
}

/// Decode a states response body into state vectors.
///
/// Individual malformed vectors are skipped; an undecodable body fails the
/// whole response.
///
/// # Errors
///
/// Returns [`SourceError::Malformed`] if the body is not a states response.
pub fn decode_states(body: &[u8]) -> Result<Vec<StateVector>, SourceError> {
    let response: StatesResponse =
        serde_json::from_slice(body).map_err(|e| SourceError::Malformed(e.to_string()))?;

    let states = response.states.unwrap_or_default();
    let total = states.len();
    let vectors: Vec<StateVector> = states
        .iter()
        .filter_map(|value| match StateVector::from_value(value) {
            Ok(sv) => Some(sv),
            Err(e) => {
                debug!(error = %e, "Skipping malformed state vector");
                None
            }
        })
        .collect();

    trace!(time = response.time, total, decoded = vectors.len(), "Decoded states");
    Ok(vectors)
}

#[async_trait::async_trait]
impl AircraftSource for BoundingBoxSource {
    fn name(&self) -> &'static str {
        "bounding_box"
    }

    async fn fetch(&self, tile: &Tile) -> Result<Vec<Observation>, SourceError> {
        let url = self.url_for(tile);
        trace!(url = %url, "Requesting state vectors");
        let body = get_bytes(&self.http, &url).await?;
        Ok(decode_states(&body)?
            .iter()
            .map(StateVector::to_observation)
            .collect())
    }
}
