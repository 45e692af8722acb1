//! Edge offloading simulation runner
//!
//! Usage: offload-sim [config.json] [--seed N] [--csv PATH]

use offload_sim::{EventLog, SimConfig, SimContext, SimReport, Simulation};
use std::error::Error;
use std::fs::File;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

struct Options {
    config_path: Option<String>,
    seed: Option<u64>,
    csv_path: Option<String>,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut options = Options {
        config_path: None,
        seed: None,
        csv_path: None,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--seed" => {
                let value = iter.next().ok_or("--seed needs a value")?;
                let seed = value
                    .parse::<u64>()
                    .map_err(|_| format!("invalid seed: {value}"))?;
                options.seed = Some(seed);
            }
            "--csv" => {
                let value = iter.next().ok_or("--csv needs a path")?;
                options.csv_path = Some(value.clone());
            }
            other if other.starts_with("--") => return Err(format!("unknown flag: {other}")),
            path => {
                if options.config_path.is_some() {
                    return Err(format!("unexpected argument: {path}"));
                }
                options.config_path = Some(path.to_string());
            }
        }
    }
    Ok(options)
}

fn print_report(config: &SimConfig, report: &SimReport) {
    println!("\n=== Results ===");
    println!(
        "Devices: {}  Servers: {}  Capacity: {}  Mode: {:?}",
        config.num_devices, config.num_servers, config.server_capacity, config.drain_mode
    );
    println!("Elapsed: {:.2} s", report.elapsed.as_secs_f64());
    println!("Tasks generated: {}", report.generated());
    println!(
        "Offloaded: {} ({:.1}%)",
        report.offloaded(),
        report.offload_ratio() * 100.0
    );
    println!(
        "Rejected then local: {} ({:.1}% of attempts)",
        report.rejected(),
        report.rejection_ratio() * 100.0
    );
    println!("Completed locally: {}", report.local());

    println!("\n{:<10} {:>10} {:>10} {:>10} {:>14}", "Device", "Generated", "Offloaded", "Local", "Energy (Wh)");
    for device in report.devices.iter() {
        println!(
            "{:<10} {:>10} {:>10} {:>10} {:>14.5}",
            device.id, device.generated, device.offloaded, device.local, device.energy_wh
        );
    }

    println!("\n{:<10} {:>10} {:>10} {:>10} {:>14}", "Server", "Completed", "Rejected", "Peak queue", "Energy (Wh)");
    for server in report.servers.iter() {
        println!(
            "{:<10} {:>10} {:>10} {:>10} {:>14.5}",
            server.id, server.completed, server.rejected, server.peak_queue_len, server.energy_wh
        );
    }

    println!(
        "\nEnergy: devices {:.5} Wh, servers {:.5} Wh, total {:.5} Wh",
        report.device_energy_wh(),
        report.server_energy_wh(),
        report.total_energy_wh()
    );
    if report.unfinished_devices > 0 {
        println!("Devices still running at exit: {}", report.unfinished_devices);
    }
}

fn run(options: Options) -> Result<(), Box<dyn Error>> {
    let mut config = match options.config_path.as_deref() {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    if options.seed.is_some() {
        config.seed = options.seed;
    }

    let events = if options.csv_path.is_some() {
        Arc::new(EventLog::retaining())
    } else {
        Arc::new(EventLog::new())
    };
    let ctx = SimContext::from_config(&config).with_events(Arc::clone(&events));
    let sim = Simulation::with_context(config, ctx)?;

    println!("=== Edge Offloading Simulator ===");
    println!("Running for {:.1} s\n", sim.config().run_duration_s);

    let report = sim.run()?;
    print_report(sim.config(), &report);

    if let Some(path) = options.csv_path {
        events.write_csv(File::create(&path)?)?;
        println!("Event trace written to {path}");
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_names(true)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("Usage: offload-sim [config.json] [--seed N] [--csv PATH]");
            std::process::exit(2);
        }
    };

    if let Err(err) = run(options) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
