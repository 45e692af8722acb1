use offload_model::SimConfig;
use offload_telemetry::EventLog;
use std::sync::Arc;

use crate::cost::{CostModel, LinearCost, Pacer, ScaledSleep};

/// Collaborators shared by every server and device in a run
#[derive(Clone)]
pub struct SimContext {
    pub server_cost: Arc<dyn CostModel>,
    pub device_cost: Arc<dyn CostModel>,
    pub server_pacer: Arc<dyn Pacer>,
    pub device_pacer: Arc<dyn Pacer>,
    pub events: Arc<EventLog>,
}

impl SimContext {
    /// Linear costs and scaled sleeps as configured, trace-only event log.
    pub fn from_config(config: &SimConfig) -> Self {
        let pacer: Arc<dyn Pacer> = Arc::new(ScaledSleep::new(config.time_scale));
        Self {
            server_cost: Arc::new(LinearCost::new(
                config.base_latency_s,
                config.server_secs_per_unit,
            )),
            device_cost: Arc::new(LinearCost::new(
                config.base_latency_s,
                config.device_secs_per_unit,
            )),
            server_pacer: Arc::clone(&pacer),
            device_pacer: pacer,
            events: Arc::new(EventLog::new()),
        }
    }

    pub fn with_events(mut self, events: Arc<EventLog>) -> Self {
        self.events = events;
        self
    }

    /// Same pacer for servers and devices
    pub fn with_pacer(self, pacer: Arc<dyn Pacer>) -> Self {
        self.with_server_pacer(Arc::clone(&pacer))
            .with_device_pacer(pacer)
    }

    pub fn with_server_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.server_pacer = pacer;
        self
    }

    pub fn with_device_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.device_pacer = pacer;
        self
    }
}
