//! Offload Model
//!
//! Task records, identifiers, and energy accounting shared by the
//! offloading engine and its telemetry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

mod config;

pub use config::{ConfigError, DrainMode, SimConfig, UnitRange};

/// Device identifier (index into the device population)
pub type DeviceId = u32;

/// Server identifier (index into the server pool)
pub type ServerId = u32;

pub const SECONDS_PER_HOUR: f64 = 3600.0;

/// Energy in watt-hours drawn by `power_w` over `elapsed`.
pub fn energy_wh(power_w: f64, elapsed: Duration) -> f64 {
    power_w * elapsed.as_secs_f64() / SECONDS_PER_HOUR
}

/// Task identifier: originating device plus its per-device sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId {
    pub device: DeviceId,
    pub seq: u64,
}

impl TaskId {
    pub fn new(device: DeviceId, seq: u64) -> Self {
        Self { device, seq }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}-t{}", self.device, self.seq)
    }
}

/// Task lifecycle. Variants are ordered; a task only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Enqueued,
    Processing,
    Completed,
}

/// Unit of computational work generated by a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub complexity: u32,
    pub resources_needed: u32,
    state: TaskState,
}

impl Task {
    pub fn new(id: TaskId, complexity: u32, resources_needed: u32) -> Self {
        Self {
            id,
            complexity,
            resources_needed,
            state: TaskState::Pending,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.state == TaskState::Completed
    }

    /// Move to `next`. Backward or repeated transitions are ignored
    /// (and trip a debug assertion).
    pub fn advance(&mut self, next: TaskState) {
        debug_assert!(
            next > self.state,
            "task {} cannot move from {:?} to {:?}",
            self.id,
            self.state,
            next
        );
        if next > self.state {
            self.state = next;
        }
    }
}

/// Why an admission attempt was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    QueueFull,
    InsufficientResources,
    ShuttingDown,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::QueueFull => write!(f, "queue full"),
            RejectReason::InsufficientResources => write!(f, "insufficient resources"),
            RejectReason::ShuttingDown => write!(f, "shutting down"),
        }
    }
}

/// Why a task ended up on the device itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalReason {
    BelowThreshold,
    NoEligibleServer,
    Rejected,
}

impl fmt::Display for LocalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalReason::BelowThreshold => write!(f, "below threshold"),
            LocalReason::NoEligibleServer => write!(f, "no available servers"),
            LocalReason::Rejected => write!(f, "server busy"),
        }
    }
}
