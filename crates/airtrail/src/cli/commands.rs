//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::tiles::BoundingBox;

/// Run the poll scheduler until interrupted.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Override the poll interval in seconds
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,
}

/// Run a single poll cycle.
#[derive(Debug, Args)]
pub struct PollCommand {
    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Latest positions inside a bounding box.
#[derive(Debug, Args)]
pub struct LatestCommand {
    /// Box as `lat_min,lat_max,lon_min,lon_max`; defaults to the configured region
    #[arg(short, long, value_parser = parse_bbox, allow_hyphen_values = true)]
    pub bbox: Option<BoundingBox>,

    /// Only consider positions newer than this many seconds
    #[arg(short, long)]
    pub max_age: Option<i64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Print a bounding-box feed states response instead
    #[arg(long, conflicts_with = "format")]
    pub states: bool,
}

/// Trail of one aircraft.
#[derive(Debug, Args)]
pub struct TrailCommand {
    /// Aircraft identity (hex)
    pub aircraft_id: String,

    /// Start of the trail as epoch seconds; defaults to the configured window
    #[arg(short, long)]
    pub since: Option<i64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Position store statistics.
#[derive(Debug, Args)]
pub struct StatsCommand {
    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Apply retention to the position store.
#[derive(Debug, Args)]
pub struct PruneCommand {
    /// Override the retention in hours
    #[arg(long)]
    pub max_age_hours: Option<u32>,
}

/// List the tiles the poller would query.
#[derive(Debug, Args)]
pub struct TilesCommand {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Sighting episode commands.
#[derive(Debug, Subcommand)]
pub enum SightingsCommand {
    /// Fold a batch of observations into sighting episodes
    Import {
        /// JSON file: a states response or an array of sighting objects (`-` for stdin)
        file: PathBuf,

        /// Observation time as epoch seconds; defaults to now
        #[arg(long)]
        at: Option<i64>,
    },

    /// List episodes, most recently seen first
    History {
        /// Maximum number of episodes
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Episodes to skip
        #[arg(short, long, default_value = "0")]
        offset: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Aggregate sighting statistics
    Stats {
        /// Output format
        #[arg(short, long, value_enum, default_value = "plain")]
        format: OutputFormat,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}

/// Parse `lat_min,lat_max,lon_min,lon_max`.
fn parse_bbox(s: &str) -> Result<BoundingBox, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid coordinate: {e}"))?;

    let [lat_min, lat_max, lon_min, lon_max] = parts[..] else {
        return Err(format!("expected 4 values, got {}", parts.len()));
    };

    let bbox = BoundingBox::new(lat_min, lat_max, lon_min, lon_max);
    if bbox.is_valid() {
        Ok(bbox)
    } else {
        Err(format!("invalid bounding box: {bbox}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox() {
        let bbox = parse_bbox("36.5, 39.0, -123.5, -121").unwrap();
        assert_eq!(bbox, BoundingBox::new(36.5, 39.0, -123.5, -121.0));
    }

    #[test]
    fn test_parse_bbox_wrong_arity() {
        let err = parse_bbox("1,2,3").unwrap_err();
        assert!(err.contains("expected 4 values"));
    }

    #[test]
    fn test_parse_bbox_not_a_number() {
        assert!(parse_bbox("a,b,c,d").unwrap_err().contains("invalid coordinate"));
    }

    #[test]
    fn test_parse_bbox_inverted() {
        assert!(parse_bbox("39,36,-123,-121")
            .unwrap_err()
            .contains("invalid bounding box"));
    }

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Plain);
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }

    #[test]
    fn test_sightings_command_debug() {
        let cmd = SightingsCommand::History {
            limit: 5,
            offset: 0,
            format: OutputFormat::Json,
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("History"));
        assert!(debug_str.contains("Json"));
    }
}
