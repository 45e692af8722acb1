//! Edge Offloading Simulator
//!
//! Mobile devices generate tasks and either run them locally or offload
//! them to a pool of capacity-bounded servers. Each server guards its FIFO
//! admission queue with one mutex; a rejected task falls back to local
//! processing immediately.

pub mod context;
pub mod cost;
pub mod device;
pub mod driver;
pub mod error;
pub mod generator;
pub mod pool;
pub mod server;
pub mod signal;

pub use context::SimContext;
pub use cost::{CostModel, LinearCost, NoDelay, Pacer, ScaledSleep};
pub use device::{Device, DeviceReport, OffloadPolicy, Placement, ThresholdPolicy};
pub use driver::{SimReport, Simulation};
pub use error::{AdmissionRejected, SimError};
pub use generator::TaskGenerator;
pub use pool::ServerPool;
pub use server::{Server, ServerReport};
pub use signal::StopSignal;

pub use offload_model::{
    energy_wh, ConfigError, DeviceId, DrainMode, LocalReason, RejectReason, ServerId, SimConfig,
    Task, TaskId, TaskState, UnitRange,
};
pub use offload_telemetry::{EventLog, LoggedEvent, OffloadEvent};
