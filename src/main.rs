// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/atticguard

//! AtticGuard - structural-health telemetry ingestion
//!
//! Replays captured StructureNode advertisements through the ingestion
//! pipeline into storage, and offers payload diagnostics.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use atticguard::codec;
use atticguard::core::{capture, run_session};
use atticguard::sensors::{Location, SensorId, Site};
use atticguard::sink::JsonLinesSink;
use atticguard::{
    AnalysisEngine, Config, Database, IngestPipeline, SensorRegistry, SinkWriter, StorageSink, NAME,
    VERSION,
};

/// AtticGuard - structural-health telemetry ingestion
#[derive(Parser, Debug)]
#[command(name = "atticguard")]
#[command(author = "AtticGuard Project")]
#[command(version = VERSION)]
#[command(about = "Decode, sequence and analyze StructureNode BLE telemetry")]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Feed a capture file through the pipeline into storage
    Replay {
        /// Capture file, one JSON advertisement per line
        #[arg(short, long)]
        input: PathBuf,

        /// Where undelivered records go on shutdown
        #[arg(long)]
        spill: Option<PathBuf>,
    },

    /// Decode base64 manufacturer data and print the fields
    Decode {
        /// Manufacturer data, standard base64
        data: String,

        /// Data is a bare payload without the company id
        #[arg(long)]
        raw: bool,
    },

    /// Record where a sensor is installed
    SetLocation {
        /// Sensor hardware address, e.g. C0:FF:EE:00:00:01
        sensor: SensorId,

        /// attic, crawlspace, basement or other
        site: Site,

        /// Free-form placement note
        label: String,
    },

    /// Write an example configuration file
    InitConfig {
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Replay { input, spill } => {
            let config_path = args.config.unwrap_or_else(Config::default_path);
            let config = Config::load(&config_path)
                .with_context(|| format!("Failed to load configuration from {:?}", config_path))?;

            let configured = config.log_level.parse::<Level>().unwrap_or(Level::INFO);
            init_logging(flag_level(args.debug, args.trace).unwrap_or(configured), args.debug)?;

            info!("{} v{}", NAME, VERSION);
            info!("Configuration loaded from {:?}", config_path);

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_replay(config, input, spill))
        }
        Command::Decode { data, raw } => {
            init_logging(flag_level(args.debug, args.trace).unwrap_or(Level::WARN), args.debug)?;
            run_decode(&data, raw, args.config)
        }
        Command::SetLocation { sensor, site, label } => {
            init_logging(flag_level(args.debug, args.trace).unwrap_or(Level::INFO), args.debug)?;
            let config_path = args.config.unwrap_or_else(Config::default_path);
            let config = Config::load(&config_path)
                .with_context(|| format!("Failed to load configuration from {:?}", config_path))?;
            run_set_location(&config, sensor, Location::new(site, label))
        }
        Command::InitConfig { path } => {
            init_logging(flag_level(args.debug, args.trace).unwrap_or(Level::INFO), args.debug)?;
            Config::example().save(&path)?;
            println!("Wrote example configuration to {}", path.display());
            println!("Review the [ingest] and [analysis] thresholds before deploying.");
            Ok(())
        }
    }
}

fn flag_level(debug: bool, trace: bool) -> Option<Level> {
    if trace {
        Some(Level::TRACE)
    } else if debug {
        Some(Level::DEBUG)
    } else {
        None
    }
}

fn init_logging(level: Level, verbose: bool) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(verbose)
        .with_file(verbose)
        .with_line_number(verbose)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Replay a capture file, then report what the pipeline saw
async fn run_replay(config: Config, input: PathBuf, spill: Option<PathBuf>) -> Result<()> {
    let registry = Arc::new(SensorRegistry::new());

    let sink: Arc<dyn StorageSink> = if config.database.enabled {
        let db = Database::open(&config.database)?;
        for (sensor_id, location) in db.locations()? {
            registry.assign_location(sensor_id, location);
        }
        db.cleanup(config.database.retention_days)?;
        Arc::new(db)
    } else {
        Arc::new(JsonLinesSink::open(&config.data_dir.join("records.jsonl"))?)
    };
    info!("Storing to {} sink", sink.name());

    let analysis = Arc::new(AnalysisEngine::new(config.analysis.clone()));
    let (outbox, queue) = mpsc::unbounded_channel();
    let pipeline = IngestPipeline::new(config.ingest.clone(), registry.clone(), analysis.clone(), outbox);
    let writer = SinkWriter::new(sink, config.sink.clone());

    info!("Replaying captures, press Ctrl+C to stop");
    let run = run_session(
        pipeline,
        writer,
        queue,
        move |tx| async move { capture::replay(&input, tx).await },
        || async {
            let _ = tokio::signal::ctrl_c().await;
        },
    )
    .await;
    let stats = run.stats;
    let report = &run.sink;

    if !report.undelivered.is_empty() {
        let path = spill.unwrap_or_else(|| config.data_dir.join("spill.jsonl"));
        let spilled = JsonLinesSink::open(&path)?.append(&report.undelivered)?;
        warn!("Spilled {} undelivered records to {:?}", spilled, path);
    }

    info!(
        "Ingest: {} received, {} accepted, {} duplicates, {} rejected, {} events",
        stats.received, stats.accepted, stats.duplicates, stats.rejected, stats.events
    );
    info!(
        "Sink: {} delivered, {} failed attempts, {} undelivered",
        report.delivered,
        report.failed_attempts,
        report.undelivered.len()
    );

    let summary = registry.summary();
    info!("{} sensors ({} located)", summary.sensors, summary.located);
    for record in registry.snapshot() {
        let risk = analysis
            .risk_level(&record.sensor_id)
            .map(|l| l.to_string())
            .unwrap_or_else(|| "-".to_string());
        info!(
            "  {} [{}]: {} accepted, {} duplicates, risk {}",
            record.sensor_id,
            record.location_label(),
            record.accepted,
            record.duplicates,
            risk
        );
    }

    let reference = summary.last_update.unwrap_or_else(Utc::now);
    for sensor_id in registry.stale_sensors(reference, config.ingest.stale_after()) {
        warn!("{} has not reported for over {:?}", sensor_id, config.ingest.stale_after());
    }

    run.into_result()
}

/// Store a sensor's location; replays pick it up at startup
fn run_set_location(config: &Config, sensor: SensorId, location: Location) -> Result<()> {
    if !config.database.enabled {
        anyhow::bail!("Locations are kept in the database, which is disabled in this configuration");
    }
    let db = Database::open(&config.database)?;
    db.set_location(sensor, &location)?;
    info!("{} is now at {} ({})", sensor, location.site, location.label);
    println!("{} -> {}: {}", sensor, location.site, location.label);
    Ok(())
}

/// Decode one advertisement payload and print it as JSON
fn run_decode(data: &str, raw: bool, config_path: Option<PathBuf>) -> Result<()> {
    let bytes = STANDARD
        .decode(data.trim())
        .context("Manufacturer data is not valid base64")?;

    let decoded = if raw {
        codec::decode(&bytes)?
    } else {
        let company_id = match config_path {
            Some(path) => Config::load(&path)?.ingest.company_id,
            None => codec::DEFAULT_COMPANY_ID,
        };
        codec::decode_manufacturer_data(&bytes, company_id)?
    };

    let measurement = decoded.measurement();
    let output = serde_json::json!({
        "format": decoded.format().to_string(),
        "sequence": decoded.sequence(),
        "measurement": measurement,
        "dew_point_c": measurement.dew_point_c(),
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
