//! Simulation driver
//!
//! Starts one thread per device, runs for a bounded window, raises the stop
//! signal, and gives devices a grace period to exit at their next loop
//! boundary before closing the server pool.

use offload_model::SimConfig;
use offload_telemetry::EventLog;
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::context::SimContext;
use crate::device::{Device, DeviceReport};
use crate::error::SimError;
use crate::pool::ServerPool;
use crate::server::{Server, ServerReport};
use crate::signal::StopSignal;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Outcome of a run
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub elapsed: Duration,
    pub devices: Vec<DeviceReport>,
    pub servers: Vec<ServerReport>,
    /// Devices that had not exited when the grace period ran out
    pub unfinished_devices: usize,
}

impl SimReport {
    pub fn generated(&self) -> u64 {
        self.devices.iter().map(|d| d.generated).sum()
    }

    pub fn offloaded(&self) -> u64 {
        self.devices.iter().map(|d| d.offloaded).sum()
    }

    pub fn rejected(&self) -> u64 {
        self.devices.iter().map(|d| d.rejected).sum()
    }

    pub fn local(&self) -> u64 {
        self.devices.iter().map(|d| d.local).sum()
    }

    pub fn completed_on_servers(&self) -> u64 {
        self.servers.iter().map(|s| s.completed).sum()
    }

    pub fn device_energy_wh(&self) -> f64 {
        self.devices.iter().map(|d| d.energy_wh).sum()
    }

    pub fn server_energy_wh(&self) -> f64 {
        self.servers.iter().map(|s| s.energy_wh).sum()
    }

    pub fn total_energy_wh(&self) -> f64 {
        self.device_energy_wh() + self.server_energy_wh()
    }

    /// Share of generated tasks that ran on a server
    pub fn offload_ratio(&self) -> f64 {
        ratio(self.offloaded(), self.generated())
    }

    /// Share of offload attempts that were turned away
    pub fn rejection_ratio(&self) -> f64 {
        ratio(self.rejected(), self.offloaded() + self.rejected())
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn before(deadline: Option<Instant>) -> bool {
    match deadline {
        Some(deadline) => Instant::now() < deadline,
        None => true,
    }
}

/// Wires devices to a server pool and runs them
pub struct Simulation {
    config: SimConfig,
    ctx: SimContext,
    pool: Arc<ServerPool>,
    stop: StopSignal,
}

impl Simulation {
    /// Validate `config` and build the server pool. Fails before any
    /// device starts.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let ctx = SimContext::from_config(&config);
        Self::with_context(config, ctx)
    }

    pub fn with_context(config: SimConfig, ctx: SimContext) -> Result<Self, SimError> {
        config.validate()?;

        let servers = (0..config.num_servers)
            .map(|id| Arc::new(Server::new(id, &config, &ctx)))
            .collect();
        let pool = Arc::new(ServerPool::start(servers)?);

        Ok(Self {
            config,
            ctx,
            pool,
            stop: StopSignal::new(),
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ServerPool> {
        &self.pool
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.ctx.events
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Run for the configured duration.
    pub fn run(&self) -> Result<SimReport, SimError> {
        self.run_for(self.config.run_duration())
    }

    /// Run for `window`, or until every device has hit its task limit.
    pub fn run_for(&self, window: Duration) -> Result<SimReport, SimError> {
        info!(
            devices = self.config.num_devices,
            servers = self.config.num_servers,
            capacity = self.config.server_capacity,
            mode = ?self.config.drain_mode,
            "starting simulation"
        );
        let start = Instant::now();

        let mut handles: Vec<(u32, JoinHandle<DeviceReport>)> = Vec::new();
        for id in 0..self.config.num_devices {
            let device = Device::from_config(
                id,
                &self.config,
                Arc::clone(&self.pool),
                &self.ctx,
                self.stop.clone(),
            );
            let spawned = thread::Builder::new()
                .name(format!("device-{id}"))
                .spawn(move || device.run());
            match spawned {
                Ok(handle) => handles.push((id, handle)),
                Err(err) => {
                    // Let the devices already running wind down before bailing out.
                    self.stop.raise();
                    for (_, handle) in handles {
                        let _ = handle.join();
                    }
                    self.pool.shutdown();
                    return Err(err.into());
                }
            }
        }

        // A window too long to add to `start` means no deadline.
        let deadline = start.checked_add(window);
        while !handles.iter().all(|(_, h)| h.is_finished()) {
            let nap = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    POLL_INTERVAL.min(deadline - now)
                }
                None => POLL_INTERVAL,
            };
            thread::sleep(nap);
        }

        info!("terminating all devices");
        self.stop.raise();

        let grace_deadline = Instant::now().checked_add(self.config.shutdown_grace());
        let mut devices = Vec::with_capacity(handles.len());
        let mut unfinished_devices = 0;
        for (id, handle) in handles {
            while !handle.is_finished() && before(grace_deadline) {
                thread::sleep(POLL_INTERVAL);
            }
            if !handle.is_finished() {
                warn!(device = id, "device did not stop within the grace period");
                unfinished_devices += 1;
                continue;
            }
            match handle.join() {
                Ok(report) => devices.push(report),
                Err(_) => {
                    warn!(device = id, "device thread panicked");
                    unfinished_devices += 1;
                }
            }
        }

        self.pool.shutdown();
        let report = SimReport {
            elapsed: start.elapsed(),
            devices,
            servers: self.pool.reports(),
            unfinished_devices,
        };
        info!(
            generated = report.generated(),
            offloaded = report.offloaded(),
            rejected = report.rejected(),
            energy_wh = report.total_energy_wh(),
            "simulation finished"
        );
        Ok(report)
    }
}
