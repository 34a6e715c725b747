//! `airtrail` - live aircraft position recorder
//!
//! This library polls aircraft feeds over a fixed set of overlapping
//! geographic tiles, deduplicates the results and keeps them as an
//! append-only time-series in `SQLite`. It answers latest-in-area and
//! per-aircraft trail queries and maintains a separate history of sighting
//! episodes with running aggregates.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod poller;
pub mod position;
pub mod scheduler;
pub mod sighting;
pub mod source;
pub mod statevector;
pub mod storage;
pub mod tiles;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use poller::{PollOutcome, PollReport, TilePoller};
pub use position::{Observation, Position};
pub use scheduler::Scheduler;
pub use sighting::{Episode, SightingObservation, SightingStats, UpsertReport};
pub use source::{AircraftSource, SourceError, SourceKind};
pub use statevector::StateVector;
pub use storage::{PositionStats, PositionStore, SightingStore};
pub use tiles::{BoundingBox, Tile};
