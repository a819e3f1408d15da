//! Crossroad BEV collection CLI
//!
//! Runs the seeded intersection and records pedestrian BEV frames.

use bev_core::{save_png, BevConfig};
use bev_sim::{Collector, SimConfig, SimError};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Crossroad BEV data collection
#[derive(Parser, Debug)]
#[command(name = "bev-sim")]
#[command(about = "Collect hero-centric BEV records from a simulated crossroad", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of ticks to run (0.05 s each)
    #[arg(short, long, default_value = "400")]
    ticks: u64,

    /// Vehicles per round
    #[arg(long, default_value = "30")]
    vehicles: usize,

    /// Pedestrians per round
    #[arg(short, long, default_value = "30")]
    pedestrians: usize,

    /// BEV engine config (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Export run summary to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Save the first pedestrian's last frame as PNG
    #[arg(long)]
    png: Option<PathBuf>,

    /// Worker threads for surface sampling
    #[arg(short, long)]
    workers: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

fn run(args: &Args, seed: u64) -> Result<(), SimError> {
    let mut bev = match &args.config {
        Some(path) => BevConfig::load(path)?,
        None => BevConfig::default(),
    };
    if let Some(workers) = args.workers {
        bev.raster_workers = workers;
    }

    let sim = SimConfig {
        seed,
        vehicles: args.vehicles,
        pedestrians: args.pedestrians,
        ..SimConfig::default()
    };

    let mut collector = Collector::new(sim, &bev)?;
    let export = collector.run(args.ticks)?;
    let stats = collector.stats();

    if args.json {
        let summary = serde_json::json!({
            "seed": seed,
            "ticks": stats.ticks,
            "frames_captured": stats.frames_captured,
            "frames_skipped": stats.frames_skipped,
            "records_completed": stats.records_completed,
            "records_dropped": stats.records_dropped,
            "refreshes": stats.refreshes,
            "time_secs": export.duration_sec,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to encode summary: {}", e),
        }
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!(
            "✓ seed={} ticks={} records={} skipped={} refreshes={}",
            seed, stats.ticks, stats.records_completed, stats.frames_skipped, stats.refreshes
        );
    }

    if let Some(path) = &args.export {
        export.write_to_file(path)?;
        info!("Exported {} records to {}", export.records.len(), path.display());
    }

    if let Some(path) = &args.png {
        match collector.last_frame() {
            Some(frame) => {
                save_png(frame, path)?;
                info!("Saved frame of {} at tick {} to {}", frame.hero_id, frame.tick, path.display());
            }
            None => error!("No pedestrian frame captured, nothing to save"),
        }
    }

    Ok(())
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("Crossroad BEV collector v{}", env!("CARGO_PKG_VERSION"));
    }

    // Determine seed
    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    if let Err(e) = run(&args, seed) {
        error!("✗ run failed (seed={}): {}", seed, e);
        std::process::exit(1);
    }
}
