//! Server Capacity Sweep
//!
//! Runs the same seeded workload across several server queue capacities
//! and compares offload share, rejections, and energy.

use offload_sim::{SimConfig, SimReport, Simulation};
use serde::Serialize;
use std::env;
use std::error::Error;
use std::fs::File;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const CAPACITIES: [usize; 5] = [1, 2, 3, 4, 8];
const SWEEP_SEED: u64 = 42;

#[derive(Debug, Serialize)]
struct SweepRow {
    capacity: usize,
    generated: u64,
    offloaded: u64,
    rejected: u64,
    local: u64,
    offload_ratio: f64,
    device_energy_wh: f64,
    server_energy_wh: f64,
    total_energy_wh: f64,
}

impl SweepRow {
    fn new(capacity: usize, report: &SimReport) -> Self {
        Self {
            capacity,
            generated: report.generated(),
            offloaded: report.offloaded(),
            rejected: report.rejected(),
            local: report.local(),
            offload_ratio: report.offload_ratio(),
            device_energy_wh: report.device_energy_wh(),
            server_energy_wh: report.server_energy_wh(),
            total_energy_wh: report.total_energy_wh(),
        }
    }
}

fn run_simulation(capacity: usize, duration_s: f64, time_scale: f64) -> Result<SweepRow, Box<dyn Error>> {
    let config = SimConfig {
        server_capacity: capacity,
        run_duration_s: duration_s,
        time_scale,
        seed: Some(SWEEP_SEED),
        ..SimConfig::default()
    };
    let sim = Simulation::new(config)?;
    let report = sim.run_for(Duration::from_secs_f64(duration_s * time_scale))?;
    Ok(SweepRow::new(capacity, &report))
}

fn parse_args(args: &[String]) -> Result<(f64, f64, Option<String>), String> {
    let mut positional = Vec::new();
    let mut csv_path = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--csv" {
            csv_path = Some(iter.next().ok_or("--csv needs a path")?.clone());
        } else {
            positional.push(arg);
        }
    }

    let duration_s: f64 = positional
        .first()
        .ok_or("missing duration")?
        .parse()
        .map_err(|_| "duration_secs must be a number")?;
    let time_scale: f64 = match positional.get(1) {
        Some(value) => value.parse().map_err(|_| "time_scale must be a number")?,
        None => 1.0,
    };
    if !(duration_s > 0.0) || !(time_scale > 0.0) {
        return Err("duration_secs and time_scale must be positive".to_string());
    }
    Ok((duration_s, time_scale, csv_path))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let (duration_s, time_scale, csv_path) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("Usage: offload-sweep <duration_secs> [time_scale] [--csv PATH]");
            eprintln!("Example: offload-sweep 30 0.05");
            std::process::exit(1);
        }
    };

    println!("=== Server Capacity Sweep ===");
    println!(
        "Workload: default config, seed {}, {} s modeled at time scale {}\n",
        SWEEP_SEED, duration_s, time_scale
    );
    println!(
        "{:<10} {:>10} {:>10} {:>10} {:>10} {:>12} {:>14}",
        "Capacity", "Generated", "Offloaded", "Rejected", "Local", "Offload %", "Energy (Wh)"
    );
    println!("{:-<82}", "");

    let mut rows = Vec::with_capacity(CAPACITIES.len());
    for capacity in CAPACITIES {
        let row = match run_simulation(capacity, duration_s, time_scale) {
            Ok(row) => row,
            Err(err) => {
                eprintln!("error: capacity {capacity}: {err}");
                std::process::exit(1);
            }
        };
        println!(
            "{:<10} {:>10} {:>10} {:>10} {:>10} {:>12.1} {:>14.5}",
            row.capacity,
            row.generated,
            row.offloaded,
            row.rejected,
            row.local,
            row.offload_ratio * 100.0,
            row.total_energy_wh
        );
        rows.push(row);
    }

    let best = rows
        .iter()
        .min_by(|a, b| a.total_energy_wh.total_cmp(&b.total_energy_wh));
    if let Some(best) = best {
        println!("\n=== Lowest Energy ===");
        println!(
            "Capacity {} ({:.5} Wh, {:.1}% offloaded)",
            best.capacity,
            best.total_energy_wh,
            best.offload_ratio * 100.0
        );
    }

    if let Some(path) = csv_path {
        if let Err(err) = write_csv(&path, &rows) {
            eprintln!("error: writing {path}: {err}");
            std::process::exit(1);
        }
        println!("Sweep written to {path}");
    }
}

fn write_csv(path: &str, rows: &[SweepRow]) -> Result<(), Box<dyn Error>> {
    let mut writer = csv::Writer::from_writer(File::create(path)?);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
