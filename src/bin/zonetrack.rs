//! zonetrack CLI — operator interface to the collection tracker.

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::collections::HashMap;

use zonetrack::config::Config;
use zonetrack::engine::Engine;
use zonetrack::error::Error;
use zonetrack::model::{Ping, WorkerId};
use zonetrack::telemetry::init_logging;

#[derive(Parser)]
#[command(name = "zonetrack", about = "Geofence dwell tracking for collection zones")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Zone operations
    Zone {
        #[command(subcommand)]
        action: ZoneAction,
    },
    /// Process a single GPS ping
    Ping {
        worker_id: i64,
        latitude: f64,
        longitude: f64,
        /// Observation time (RFC 3339); defaults to receipt time
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Daily servicing report
    Report {
        /// UTC day (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show transition events
    Events {
        /// Only events after this sequence number
        #[arg(long, default_value_t = 0)]
        since: u64,
    },
    /// Register the demo zones and replay the demo worker path
    Simulate {
        #[arg(long, default_value_t = 1)]
        worker_id: i64,
        /// Seconds between pings
        #[arg(long, default_value_t = 5)]
        interval_secs: u64,
    },
}

#[derive(Subcommand)]
enum ZoneAction {
    /// Register a zone from a JSON array of [latitude, longitude] pairs
    Add {
        name: String,
        /// e.g. '[[12.914, 74.856], [12.915, 74.856], [12.915, 74.857]]'
        #[arg(long)]
        coords: String,
    },
    /// List registered zones
    List,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    init_logging(&config.log_level)?;

    let mut engine = Engine::open(&config.database_path, config.engine_config())?;

    match cli.command {
        Command::Zone { action } => match action {
            ZoneAction::Add { name, coords } => cmd_zone_add(&mut engine, &name, &coords),
            ZoneAction::List => cmd_zone_list(&engine),
        },
        Command::Ping {
            worker_id,
            latitude,
            longitude,
            at,
        } => cmd_ping(&mut engine, worker_id, latitude, longitude, at),
        Command::Report { date } => {
            cmd_report(&engine, date.unwrap_or_else(|| Utc::now().date_naive()))
        }
        Command::Events { since } => cmd_events(&engine, since),
        Command::Simulate {
            worker_id,
            interval_secs,
        } => cmd_simulate(&mut engine, worker_id, interval_secs),
    }
}

fn cmd_zone_add(engine: &mut Engine, name: &str, coords: &str) -> anyhow::Result<()> {
    let vertices: Vec<[f64; 2]> = serde_json::from_str(coords)
        .map_err(|e| anyhow::anyhow!("--coords must be a JSON array of [lat, lon] pairs: {e}"))?;

    let zone = engine.register_zone(name, &vertices)?;
    println!("Created zone {} (id: {})", zone.name, zone.id);
    Ok(())
}

fn cmd_zone_list(engine: &Engine) -> anyhow::Result<()> {
    let zones = engine.zones()?;
    if zones.is_empty() {
        println!("No zones registered.");
        return Ok(());
    }

    println!("{:<6}  {:<20}  VERTICES", "ID", "NAME");
    println!("{}", "-".repeat(40));
    for zone in &zones {
        println!(
            "{:<6}  {:<20}  {}",
            zone.id,
            zone.name,
            zone.boundary().len()
        );
    }
    println!("\n{} zone(s)", zones.len());
    Ok(())
}

fn cmd_ping(
    engine: &mut Engine,
    worker_id: i64,
    latitude: f64,
    longitude: f64,
    at: Option<DateTime<Utc>>,
) -> anyhow::Result<()> {
    let recorded_at = at.unwrap_or_else(Utc::now);
    let ping = Ping::at_latlon(WorkerId(worker_id), latitude, longitude, recorded_at);

    let events = engine.process_ping(&ping)?;
    if events.is_empty() {
        println!("Ping processed, no collection event.");
    } else {
        for event in events {
            let zone = engine.zone(event.zone_id)?;
            println!(
                "Collection logged: {} at {} ({})",
                zone.name,
                event.serviced_at.format("%Y-%m-%d %H:%M:%S UTC"),
                event.status
            );
        }
    }
    Ok(())
}

fn cmd_report(engine: &Engine, day: NaiveDate) -> anyhow::Result<()> {
    let zones = engine.zones()?;
    let serviced = engine.serviced_zone_ids(day)?;
    let logs = engine.collections_on(day)?;

    println!("Report for {day}\n");

    if zones.is_empty() {
        println!("No zones registered.");
        return Ok(());
    }

    println!("{:<6}  {:<20}  STATUS", "ID", "NAME");
    println!("{}", "-".repeat(40));
    for zone in &zones {
        let status = if serviced.contains(&zone.id) {
            "serviced"
        } else {
            "pending"
        };
        println!("{:<6}  {:<20}  {}", zone.id, zone.name, status);
    }
    println!("\n{} / {} zones serviced", serviced.len(), zones.len());

    if !logs.is_empty() {
        let names: HashMap<_, _> = zones.iter().map(|z| (z.id, z.name.as_str())).collect();
        println!("\n{:<22}  {:<20}  STATUS", "SERVICED AT", "ZONE");
        println!("{}", "-".repeat(56));
        for log in &logs {
            println!(
                "{:<22}  {:<20}  {}",
                log.serviced_at.format("%Y-%m-%d %H:%M:%S"),
                names.get(&log.zone_id).copied().unwrap_or("?"),
                log.status
            );
        }
    }
    Ok(())
}

fn cmd_events(engine: &Engine, since: u64) -> anyhow::Result<()> {
    let events = engine.events_since(since)?;
    if events.is_empty() {
        println!("No events.");
        return Ok(());
    }

    for event in &events {
        println!(
            "{:>6}  {}  {}",
            event.seq,
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            serde_json::to_string(&event.kind)?
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// The demo zones: three adjacent squares.
const DEMO_ZONES: &[(&str, &[[f64; 2]])] = &[
    (
        "Zone-A1",
        &[
            [12.914, 74.856],
            [12.915, 74.856],
            [12.915, 74.857],
            [12.914, 74.857],
        ],
    ),
    (
        "Zone-A2",
        &[
            [12.915, 74.857],
            [12.916, 74.857],
            [12.916, 74.858],
            [12.915, 74.858],
        ],
    ),
    (
        "Zone-B1",
        &[
            [12.914, 74.858],
            [12.915, 74.858],
            [12.915, 74.859],
            [12.914, 74.859],
        ],
    ),
];

/// The demo path: dwell in A1 (3 pings), dwell in A2 (3 pings), pass
/// through B1 (1 ping), exit to open space. With the default 10 s dwell
/// threshold and 5 s ping interval, A1 and A2 get logged and B1 does not.
const DEMO_PATH: &[[f64; 2]] = &[
    [12.9145, 74.8565],
    [12.9146, 74.8566],
    [12.9147, 74.8567],
    [12.9155, 74.8575],
    [12.9156, 74.8576],
    [12.9157, 74.8577],
    [12.9145, 74.8585],
    [12.9130, 74.8600],
];

fn cmd_simulate(engine: &mut Engine, worker_id: i64, interval_secs: u64) -> anyhow::Result<()> {
    println!("Setting up demo zones...");
    for &(name, coords) in DEMO_ZONES {
        match engine.register_zone(name, coords) {
            Ok(zone) => println!("  created {}", zone.name),
            Err(Error::DuplicateZoneName(_)) => println!("  {name} already exists"),
            Err(e) => return Err(e.into()),
        }
    }

    println!("\nReplaying path for worker {worker_id} ({interval_secs}s between pings)...");
    let worker = WorkerId(worker_id);
    let mut total = 0;

    for (i, &[lat, lon]) in DEMO_PATH.iter().enumerate() {
        if i > 0 {
            std::thread::sleep(std::time::Duration::from_secs(interval_secs));
        }
        let ping = Ping::at_latlon(worker, lat, lon, Utc::now());
        let events = engine.process_ping(&ping)?;

        println!("  ping {} at ({lat:.4}, {lon:.4})", i + 1);
        for event in events {
            let zone = engine.zone(event.zone_id)?;
            println!("    >> collection logged for {}", zone.name);
            total += 1;
        }
    }

    println!("\nSimulation complete: {total} collection event(s).");
    print_expectation(engine)?;
    Ok(())
}

fn print_expectation(engine: &Engine) -> anyhow::Result<()> {
    let day = Utc::now().date_naive();
    let serviced = engine.serviced_zone_ids(day)?;
    let zones = engine.zones()?;
    let names: Vec<&str> = zones
        .iter()
        .filter(|z| serviced.contains(&z.id))
        .map(|z| z.name.as_str())
        .collect();
    println!("Serviced today: {}", names.join(", "));
    Ok(())
}
