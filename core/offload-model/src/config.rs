//! Simulation configuration
//!
//! Every field has a default; a JSON file only needs the keys it changes.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::DeviceId;

/// Errors raised while loading or validating a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Who runs a server's drain loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainMode {
    /// The device whose enqueue made the queue non-empty drains the whole backlog.
    Inline,
    /// Each server owns one consumer thread.
    #[default]
    Dedicated,
}

/// Closed integer range used for randomized task attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRange {
    pub min: u32,
    pub max: u32,
}

impl UnitRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn to_inclusive(self) -> RangeInclusive<u32> {
        self.min..=self.max
    }

    fn check(self, name: &str) -> Result<(), ConfigError> {
        if self.min == 0 {
            return Err(ConfigError::Invalid(format!("{name}.min must be > 0")));
        }
        if self.min > self.max {
            return Err(ConfigError::Invalid(format!(
                "{name}.min ({}) exceeds {name}.max ({})",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

fn check_duration(name: &str, secs: f64) -> Result<(), ConfigError> {
    match Duration::try_from_secs_f64(secs) {
        Ok(_) => Ok(()),
        Err(_) => Err(ConfigError::Invalid(format!(
            "{name} is out of range for a duration (got {secs} s)"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub num_devices: u32,
    pub num_servers: u32,
    /// Maximum queue depth per server (queued plus in service)
    pub server_capacity: usize,
    /// Tasks with complexity strictly above this are offload candidates
    pub complexity_threshold: u32,
    pub arrival_interval_s: f64,
    pub server_power_w: f64,
    pub device_power_w: f64,
    pub run_duration_s: f64,

    /// Fixed latency added to every task, local or remote
    pub base_latency_s: f64,
    pub server_secs_per_unit: f64,
    pub device_secs_per_unit: f64,
    pub complexity: UnitRange,
    pub resources: UnitRange,
    /// Resource budget of each server
    pub server_resources: u32,
    pub drain_mode: DrainMode,
    /// Wall-clock seconds slept per modeled second (0 disables sleeping)
    pub time_scale: f64,
    pub seed: Option<u64>,
    pub max_tasks_per_device: Option<u64>,
    /// How long the driver waits for devices after raising the stop signal
    pub shutdown_grace_s: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            num_devices: 5,
            num_servers: 2,
            server_capacity: 3,
            complexity_threshold: 5,
            arrival_interval_s: 2.0,
            server_power_w: 150.0,
            device_power_w: 10.0,
            run_duration_s: 30.0,
            base_latency_s: 1.0,
            server_secs_per_unit: 0.5,
            device_secs_per_unit: 0.2,
            complexity: UnitRange::new(1, 10),
            resources: UnitRange::new(1, 3),
            server_resources: 10,
            drain_mode: DrainMode::default(),
            time_scale: 1.0,
            seed: None,
            max_tasks_per_device: None,
            shutdown_grace_s: 1.0,
        }
    }
}

impl SimConfig {
    /// Load from a JSON file and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse from a JSON string and validate.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_devices == 0 {
            return Err(ConfigError::Invalid("num_devices must be > 0".into()));
        }
        if self.num_servers == 0 {
            return Err(ConfigError::Invalid("num_servers must be > 0".into()));
        }
        if self.server_capacity == 0 {
            return Err(ConfigError::Invalid("server_capacity must be > 0".into()));
        }
        if self.server_resources == 0 {
            return Err(ConfigError::Invalid("server_resources must be > 0".into()));
        }
        self.complexity.check("complexity")?;
        self.resources.check("resources")?;

        let non_negative = [
            ("arrival_interval_s", self.arrival_interval_s),
            ("server_power_w", self.server_power_w),
            ("device_power_w", self.device_power_w),
            ("run_duration_s", self.run_duration_s),
            ("base_latency_s", self.base_latency_s),
            ("server_secs_per_unit", self.server_secs_per_unit),
            ("device_secs_per_unit", self.device_secs_per_unit),
            ("time_scale", self.time_scale),
            ("shutdown_grace_s", self.shutdown_grace_s),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a finite value >= 0 (got {value})"
                )));
            }
        }

        // Every modeled duration, and its paced real-time counterpart, must
        // fit in a `Duration`.
        let longest = f64::from(self.complexity.max);
        let server_task_s = self.base_latency_s + self.server_secs_per_unit * longest;
        let device_task_s = self.base_latency_s + self.device_secs_per_unit * longest;
        let durations = [
            ("run_duration_s", self.run_duration_s),
            ("arrival_interval_s", self.arrival_interval_s),
            ("shutdown_grace_s", self.shutdown_grace_s),
            ("longest server task", server_task_s),
            ("longest device task", device_task_s),
            ("paced arrival interval", self.arrival_interval_s * self.time_scale),
            ("paced server task", server_task_s * self.time_scale),
            ("paced device task", device_task_s * self.time_scale),
        ];
        for (name, secs) in durations {
            check_duration(name, secs)?;
        }
        Ok(())
    }

    pub fn run_duration(&self) -> Duration {
        Duration::from_secs_f64(self.run_duration_s)
    }

    pub fn arrival_interval(&self) -> Duration {
        Duration::from_secs_f64(self.arrival_interval_s)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs_f64(self.shutdown_grace_s)
    }

    /// Per-device seed derived from the run seed, if one is set.
    pub fn device_seed(&self, device: DeviceId) -> Option<u64> {
        self.seed
            .map(|seed| seed ^ (u64::from(device) + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }
}
