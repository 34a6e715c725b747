//! Tile polling.
//!
//! One poll cycle fans out a request per tile, waits for all of them to
//! settle, merges the results in configured tile order and hands the batch
//! to the [`PositionStore`], then applies retention.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::position::Position;
use crate::source::{fetch_tile, AircraftSource, TileFetch};
use crate::storage::{unix_now, PositionStore, DEFAULT_RETENTION_SECS};
use crate::tiles::Tile;

/// Default per-tile request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Result of a [`TilePoller::poll_once`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollOutcome {
    /// Another cycle was already running; nothing was fetched or written.
    Skipped,
    /// The cycle ran to completion.
    Completed(PollReport),
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    /// Tiles queried.
    pub tiles_total: usize,
    /// Tiles that failed or timed out.
    pub tiles_failed: usize,
    /// Raw observations received across all tiles.
    pub observations: usize,
    /// Positions written.
    pub ingested: usize,
    /// Positions removed by retention.
    pub pruned: usize,
    /// Cycle duration in milliseconds.
    pub elapsed_ms: u64,
}

/// Merge per-tile results into one batch of positions.
///
/// `results` must be in configured tile order. The first occurrence of each
/// aircraft wins; later duplicates are discarded even when their fields
/// differ. Records without identity or coordinates are then dropped. Every
/// kept record is stamped with `now`.
#[must_use]
pub fn merge_tile_results(results: Vec<TileFetch>, now: i64) -> Vec<Position> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .flat_map(TileFetch::into_observations)
        .filter(|obs| match obs.identity() {
            Some(id) => seen.insert(id),
            None => true,
        })
        .filter_map(|obs| obs.into_position(now))
        .collect()
}

/// Polls a fixed set of tiles and ingests the merged result.
pub struct TilePoller {
    source: Arc<dyn AircraftSource>,
    tiles: Vec<Tile>,
    store: Arc<PositionStore>,
    request_timeout: Duration,
    retention_secs: i64,
    in_flight: AtomicBool,
}

impl fmt::Debug for TilePoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TilePoller")
            .field("source", &self.source.name())
            .field("tiles", &self.tiles.len())
            .field("request_timeout", &self.request_timeout)
            .field("retention_secs", &self.retention_secs)
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Clears the in-flight flag when a cycle ends, including on error.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl TilePoller {
    /// Create a poller over `tiles`, in the order given.
    #[must_use]
    pub fn new(source: Arc<dyn AircraftSource>, tiles: Vec<Tile>, store: Arc<PositionStore>) -> Self {
        Self {
            source,
            tiles,
            store,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retention_secs: DEFAULT_RETENTION_SECS,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Set the per-tile request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set how long positions are retained, in seconds.
    #[must_use]
    pub fn with_retention_secs(mut self, retention_secs: i64) -> Self {
        self.retention_secs = retention_secs;
        self
    }

    /// The configured tiles.
    #[must_use]
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// The store this poller writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<PositionStore> {
        &self.store
    }

    /// Whether a cycle is currently running.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one poll cycle.
    ///
    /// Returns [`PollOutcome::Skipped`] without doing anything if another
    /// cycle is in flight. Tile failures are absorbed; a cycle where every
    /// tile fails completes with nothing ingested.
    ///
    /// # Errors
    ///
    /// Returns an error if inserting or pruning positions fails.
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("Poll already in flight, skipping");
            return Ok(PollOutcome::Skipped);
        };

        let started = Instant::now();
        let timeout = self.request_timeout;
        let source = self.source.as_ref();

        // join_all yields results in input order regardless of completion order
        let fetches = join_all(
            self.tiles
                .iter()
                .map(|tile| fetch_tile(source, tile, timeout)),
        )
        .await;

        let tiles_total = fetches.len();
        let tiles_failed = fetches.iter().filter(|f| f.is_failed()).count();
        let observations = fetches
            .iter()
            .map(|f| match f {
                TileFetch::Fetched(obs) => obs.len(),
                TileFetch::Failed(_) => 0,
            })
            .sum();

        if tiles_total > 0 && tiles_failed == tiles_total {
            warn!(tiles = tiles_total, "All tiles failed this cycle");
        }

        let now = unix_now();
        let positions = merge_tile_results(fetches, now);

        let store = Arc::clone(&self.store);
        let retention_secs = self.retention_secs;
        let (ingested, pruned) = tokio::task::spawn_blocking(move || -> Result<(usize, usize)> {
            let ingested = store.insert_positions(&positions)?;
            let pruned = store.prune_old_positions_at(retention_secs, now)?;
            Ok((ingested, pruned))
        })
        .await
        .map_err(|e| Error::internal(format!("store task failed: {e}")))??;

        let report = PollReport {
            tiles_total,
            tiles_failed,
            observations,
            ingested,
            pruned,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        info!(
            tiles = report.tiles_total,
            failed = report.tiles_failed,
            observations = report.observations,
            ingested = report.ingested,
            pruned = report.pruned,
            elapsed_ms = report.elapsed_ms,
            "Poll cycle complete"
        );

        Ok(PollOutcome::Completed(report))
    }
}
