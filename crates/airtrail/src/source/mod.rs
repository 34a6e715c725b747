//! Aircraft feed clients.
//!
//! An [`AircraftSource`] fetches the aircraft currently inside one tile.
//! Sources report failures as [`SourceError`]; the poller goes through
//! [`fetch_tile`], which bounds each fetch with a timeout and turns every
//! failure into an empty, logged [`TileFetch::Failed`] so one bad tile never
//! aborts a cycle.

mod bbox;
mod point;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::Result;
use crate::position::Observation;
use crate::tiles::Tile;

pub use bbox::{decode_states, BoundingBoxSource};
pub use point::{PointRadiusSource, MAX_RADIUS_NM};

/// User-Agent sent to the feeds.
const USER_AGENT: &str = concat!("airtrail/", env!("CARGO_PKG_VERSION"));

/// Errors from a single feed request.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The request could not be sent or the body could not be read.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The feed answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Status code returned.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// The payload could not be decoded.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The request did not complete within the timeout.
    #[error("request timed out after {secs}s")]
    Timeout {
        /// Timeout that elapsed, in seconds.
        secs: u64,
    },
}

/// Which feed the poller talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Center-and-radius JSON feed.
    #[default]
    PointRadius,
    /// Bounding-box state-vector feed.
    BoundingBox,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PointRadius => write!(f, "point_radius"),
            Self::BoundingBox => write!(f, "bounding_box"),
        }
    }
}

/// A feed that can be queried one tile at a time.
#[async_trait::async_trait]
pub trait AircraftSource: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Fetch the aircraft currently inside `tile`.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] on transport failure, non-success status or
    /// an undecodable payload.
    async fn fetch(&self, tile: &Tile) -> std::result::Result<Vec<Observation>, SourceError>;
}

/// Outcome of fetching one tile.
#[derive(Debug)]
pub enum TileFetch {
    /// The tile answered; possibly with zero aircraft.
    Fetched(Vec<Observation>),
    /// The tile failed this cycle and contributes nothing.
    Failed(SourceError),
}

impl TileFetch {
    /// Whether this tile failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The fetched observations; empty for a failed tile.
    #[must_use]
    pub fn into_observations(self) -> Vec<Observation> {
        match self {
            Self::Fetched(observations) => observations,
            Self::Failed(_) => Vec::new(),
        }
    }
}

/// Fetch one tile, bounded by `timeout`.
///
/// Never fails: errors and timeouts are logged and reported as
/// [`TileFetch::Failed`]. A timed-out request is dropped, which cancels it.
pub async fn fetch_tile(source: &dyn AircraftSource, tile: &Tile, timeout: Duration) -> TileFetch {
    match tokio::time::timeout(timeout, source.fetch(tile)).await {
        Ok(Ok(observations)) => {
            debug!(
                source = source.name(),
                tile = %tile,
                count = observations.len(),
                "Tile fetched"
            );
            TileFetch::Fetched(observations)
        }
        Ok(Err(error)) => {
            warn!(source = source.name(), tile = %tile, error = %error, "Tile fetch failed");
            TileFetch::Failed(error)
        }
        Err(_) => {
            let error = SourceError::Timeout {
                secs: timeout.as_secs(),
            };
            warn!(source = source.name(), tile = %tile, error = %error, "Tile fetch timed out");
            TileFetch::Failed(error)
        }
    }
}

/// Build the configured feed client.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be constructed.
pub fn build_source(
    kind: SourceKind,
    base_url: &str,
    timeout: Duration,
) -> Result<Arc<dyn AircraftSource>> {
    let source: Arc<dyn AircraftSource> = match kind {
        SourceKind::PointRadius => Arc::new(PointRadiusSource::new(base_url, timeout)?),
        SourceKind::BoundingBox => Arc::new(BoundingBoxSource::new(base_url, timeout)?),
    };
    Ok(source)
}

/// Shared reqwest client setup for both feeds.
fn http_client(timeout: Duration) -> std::result::Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| SourceError::Http(format!("failed to create HTTP client: {e}")))
}

/// GET `url` and return the body of a successful response.
async fn get_bytes(
    client: &reqwest::Client,
    url: &str,
) -> std::result::Result<Vec<u8>, SourceError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SourceError::Http(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| SourceError::Http(format!("failed to read response: {e}")))
}
