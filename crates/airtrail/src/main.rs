//! `airtrail` - CLI for the aircraft position recorder
//!
//! This binary runs the poll scheduler and queries the position and
//! sighting stores.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::DateTime;
use clap::Parser;
use serde::Serialize;
use tracing::info;

use airtrail::cli::{
    Cli, Command, ConfigCommand, LatestCommand, OutputFormat, PollCommand, PruneCommand,
    RunCommand, SightingsCommand, TrailCommand,
};
use airtrail::sighting::parse_batch;
use airtrail::source::build_source;
use airtrail::statevector::states_response;
use airtrail::storage::unix_now;
use airtrail::{
    init_logging, Config, Episode, PollOutcome, Position, PositionStore, Scheduler,
    SightingStore, Tile, TilePoller,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // `config validate` reports problems instead of failing on them
    if let Command::Config(ConfigCommand::Validate { file }) = &cli.command {
        handle_validate(file.clone().or_else(|| cli.config.clone()));
        return Ok(());
    }

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Run(cmd) => handle_run(&config, &cmd).await,
        Command::Poll(cmd) => handle_poll(&config, &cmd).await,
        Command::Latest(cmd) => handle_latest(&config, &cmd),
        Command::Trail(cmd) => handle_trail(&config, &cmd),
        Command::Stats(cmd) => handle_stats(&config, cmd.format),
        Command::Prune(cmd) => handle_prune(&config, &cmd),
        Command::Sightings(cmd) => handle_sightings(&config, cmd),
        Command::Tiles(cmd) => handle_tiles(&config, cmd.format),
        Command::Config(cmd) => handle_config(&config, &cmd),
    }
}

fn open_positions(config: &Config) -> Result<PositionStore> {
    let path = config.positions_path();
    PositionStore::open(&path)
        .with_context(|| format!("failed to open positions database {}", path.display()))
}

fn open_sightings(config: &Config) -> Result<SightingStore> {
    let path = config.sightings_path();
    Ok(SightingStore::open(&path)
        .with_context(|| format!("failed to open sightings database {}", path.display()))?
        .with_staleness(config.sightings.staleness_secs))
}

fn build_poller(config: &Config) -> Result<TilePoller> {
    let store = Arc::new(open_positions(config)?);
    let source = build_source(
        config.poller.source,
        config.base_url(),
        config.request_timeout(),
    )?;
    Ok(TilePoller::new(source, config.tiles(), store)
        .with_request_timeout(config.request_timeout())
        .with_retention_secs(config.retention_secs()))
}

async fn handle_run(config: &Config, cmd: &RunCommand) -> Result<()> {
    let interval = cmd
        .interval
        .map_or_else(|| config.poll_interval(), Duration::from_secs);
    let poller = Arc::new(build_poller(config)?);

    info!(
        source = %config.poller.source,
        base_url = config.base_url(),
        tiles = poller.tiles().len(),
        "Polling until Ctrl-C"
    );

    let scheduler = Scheduler::new(poller, interval);
    scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
        })
        .await?;
    Ok(())
}

async fn handle_poll(config: &Config, cmd: &PollCommand) -> Result<()> {
    let poller = build_poller(config)?;
    let outcome = poller.poll_once().await?;

    match (cmd.format, outcome) {
        (OutputFormat::Json, _) => print_json(&outcome)?,
        (_, PollOutcome::Skipped) => println!("Poll skipped: another cycle is running"),
        (_, PollOutcome::Completed(report)) => {
            println!("Tiles:        {} ({} failed)", report.tiles_total, report.tiles_failed);
            println!("Observations: {}", report.observations);
            println!("Ingested:     {}", report.ingested);
            println!("Pruned:       {}", report.pruned);
            println!("Elapsed:      {} ms", report.elapsed_ms);
        }
    }
    Ok(())
}

fn handle_latest(config: &Config, cmd: &LatestCommand) -> Result<()> {
    let store = open_positions(config)?;
    let bbox = cmd.bbox.unwrap_or_else(|| config.region.bounding_box());
    let max_age = cmd.max_age.unwrap_or(config.query.latest_max_age_secs);

    let positions = store.query_latest_in_bbox(&bbox, max_age)?;
    if cmd.states {
        return print_json(&states_response(unix_now(), &positions));
    }
    print_positions(&positions, cmd.format)
}

fn handle_trail(config: &Config, cmd: &TrailCommand) -> Result<()> {
    let store = open_positions(config)?;
    let since = cmd
        .since
        .unwrap_or_else(|| unix_now() - config.trail_window_secs());

    let positions = store.query_trail(&cmd.aircraft_id, since)?;
    print_positions(&positions, cmd.format)
}

fn handle_stats(config: &Config, format: OutputFormat) -> Result<()> {
    let store = open_positions(config)?;
    let stats = store.stats()?;

    if format == OutputFormat::Json {
        return print_json(&stats);
    }

    println!("Database:  {}", store.path().display());
    println!("Positions: {}", stats.total_positions);
    println!("Aircraft:  {}", stats.distinct_aircraft);
    println!("Oldest:    {}", fmt_opt_ts(stats.oldest_timestamp));
    println!("Newest:    {}", fmt_opt_ts(stats.newest_timestamp));
    println!("Size:      {} bytes", stats.db_size_bytes);
    Ok(())
}

fn handle_prune(config: &Config, cmd: &PruneCommand) -> Result<()> {
    let store = open_positions(config)?;
    let max_age = cmd
        .max_age_hours
        .map_or_else(|| config.retention_secs(), |h| i64::from(h) * 60 * 60);

    let pruned = store.prune_old_positions(max_age)?;
    println!("Pruned {pruned} positions");
    Ok(())
}

fn handle_sightings(config: &Config, cmd: SightingsCommand) -> Result<()> {
    let store = open_sightings(config)?;

    match cmd {
        SightingsCommand::Import { file, at } => {
            let body = read_input(&file)?;
            let batch = parse_batch(&body)
                .with_context(|| format!("failed to parse sightings from {}", file.display()))?;
            let report = store.upsert_sightings_at(&batch, at.unwrap_or_else(unix_now))?;
            println!(
                "Created {}, updated {}, skipped {}",
                report.created, report.updated, report.skipped
            );
        }
        SightingsCommand::History {
            limit,
            offset,
            format,
        } => {
            let episodes = store.get_history(limit, offset)?;
            print_episodes(&episodes, format)?;
        }
        SightingsCommand::Stats { format } => {
            let stats = store.get_stats()?;
            if format == OutputFormat::Json {
                return print_json(&stats);
            }
            println!("Aircraft seen:        {}", stats.total_aircraft);
            println!("Seen in last 24h:     {}", stats.aircraft_last_24h);
            println!("Episodes:             {}", store.episode_count()?);
            println!("Top countries:");
            for entry in &stats.top_countries {
                println!("  {:<24} {}", entry.country, entry.aircraft);
            }
        }
    }
    Ok(())
}

fn handle_tiles(config: &Config, format: OutputFormat) -> Result<()> {
    let tiles: Vec<Tile> = config.tiles();
    match format {
        OutputFormat::Json => print_json(&tiles)?,
        OutputFormat::Plain => {
            for tile in &tiles {
                println!("{tile}");
            }
        }
        OutputFormat::Table => {
            println!("{:>4}  {:>10}  {:>11}  {:>9}", "#", "LAT", "LON", "RADIUS_NM");
            for (i, tile) in tiles.iter().enumerate() {
                println!(
                    "{:>4}  {:>10.4}  {:>11.4}  {:>9.1}",
                    i + 1,
                    tile.lat,
                    tile.lon,
                    tile.radius_nm
                );
            }
            println!("{} tiles", tiles.len());
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: &ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if *json {
                print_json(config)?;
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Positions database: {}", config.positions_path().display());
                println!("  Sightings database: {}", config.sightings_path().display());
                println!("  Retention (hours):  {}", config.storage.retention_hours);
                println!();
                println!("[Poller]");
                println!("  Source:             {}", config.poller.source);
                println!("  Base URL:           {}", config.base_url());
                println!("  Interval (s):       {}", config.poller.interval_secs);
                println!("  Timeout (s):        {}", config.poller.request_timeout_secs);
                println!("  Tiles:              {}", config.tiles().len());
                println!();
                println!("[Region]");
                println!("  Bounds:             {}", config.region.bounding_box());
                println!("  Tile radius (nm):   {}", config.region.tile_radius_nm);
                println!();
                println!("[Sightings]");
                println!("  Staleness (s):      {}", config.sightings.staleness_secs);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            handle_validate(file.clone());
        }
    }
    Ok(())
}

fn handle_validate(file: Option<std::path::PathBuf>) {
    let path = file.unwrap_or_else(Config::default_config_path);
    println!("Validating configuration: {}", path.display());
    match Config::load_from(Some(path)) {
        Ok(_) => println!("Configuration is valid."),
        Err(e) => println!("Configuration error: {e}"),
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut body = Vec::new();
        std::io::stdin()
            .read_to_end(&mut body)
            .context("failed to read stdin")?;
        Ok(body)
    } else {
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_positions(positions: &[Position], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(positions)?,
        OutputFormat::Plain => {
            for p in positions {
                println!(
                    "{} {} {:.4},{:.4} alt={} spd={} {}",
                    fmt_ts(p.timestamp),
                    p.aircraft_id,
                    p.latitude,
                    p.longitude,
                    fmt_opt(p.altitude),
                    fmt_opt(p.speed),
                    p.callsign.as_deref().unwrap_or("-"),
                );
            }
        }
        OutputFormat::Table => {
            println!(
                "{:<8} {:<9} {:>9} {:>10} {:>7} {:>6} {:>5} {:<20}",
                "HEX", "CALLSIGN", "LAT", "LON", "ALT", "SPD", "HDG", "TIME"
            );
            for p in positions {
                println!(
                    "{:<8} {:<9} {:>9.4} {:>10.4} {:>7} {:>6} {:>5} {:<20}",
                    p.aircraft_id,
                    p.callsign.as_deref().unwrap_or("-"),
                    p.latitude,
                    p.longitude,
                    fmt_opt(p.altitude),
                    fmt_opt(p.speed),
                    fmt_opt(p.heading),
                    fmt_ts(p.timestamp),
                );
            }
            println!("{} positions", positions.len());
        }
    }
    Ok(())
}

fn print_episodes(episodes: &[Episode], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(episodes)?,
        OutputFormat::Plain => {
            for e in episodes {
                println!(
                    "{} {} {} -> {} ({}s)",
                    e.aircraft_id,
                    e.callsign.as_deref().unwrap_or("-"),
                    fmt_ts(e.first_seen),
                    fmt_ts(e.last_seen),
                    e.duration_secs()
                );
            }
        }
        OutputFormat::Table => {
            println!(
                "{:<8} {:<9} {:<16} {:<20} {:<20} {:>7} {:>7} {:>6}",
                "HEX", "CALLSIGN", "COUNTRY", "FIRST SEEN", "LAST SEEN", "MIN ALT", "MAX ALT",
                "MAX SPD"
            );
            for e in episodes {
                println!(
                    "{:<8} {:<9} {:<16} {:<20} {:<20} {:>7} {:>7} {:>6}",
                    e.aircraft_id,
                    e.callsign.as_deref().unwrap_or("-"),
                    e.origin_country.as_deref().unwrap_or("-"),
                    fmt_ts(e.first_seen),
                    fmt_ts(e.last_seen),
                    fmt_opt(e.min_altitude),
                    fmt_opt(e.max_altitude),
                    fmt_opt(e.max_speed),
                );
            }
        }
    }
    Ok(())
}

fn fmt_ts(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0).map_or_else(
        || ts.to_string(),
        |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

fn fmt_opt_ts(ts: Option<i64>) -> String {
    ts.map_or_else(|| "-".to_string(), fmt_ts)
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.0}"))
}
