//! Command-line interface for airtrail.
//!
//! This module provides the CLI structure for the `airtrail` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, LatestCommand, OutputFormat, PollCommand, PruneCommand, RunCommand,
    SightingsCommand, StatsCommand, TilesCommand, TrailCommand,
};

/// airtrail - Record live aircraft positions
///
/// Polls aircraft feeds over a fixed set of geographic tiles, keeps a
/// time-series of positions and answers latest-position and trail queries.
#[derive(Debug, Parser)]
#[command(name = "airtrail")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll on an interval until Ctrl-C
    Run(RunCommand),

    /// Run one poll cycle
    Poll(PollCommand),

    /// Show the latest position of each aircraft in an area
    Latest(LatestCommand),

    /// Show the trail of one aircraft
    Trail(TrailCommand),

    /// Show position store statistics
    Stats(StatsCommand),

    /// Delete positions past retention
    Prune(PruneCommand),

    /// Manage sighting episodes
    #[command(subcommand)]
    Sightings(SightingsCommand),

    /// List the tiles that will be polled
    Tiles(TilesCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
