//! Processing cost and pacing
//!
//! A `CostModel` turns complexity into a modeled duration (which drives
//! energy accounting). A `Pacer` decides how much real time that duration
//! occupies.

use std::thread;
use std::time::Duration;

/// Modeled processing time for a task of a given complexity
pub trait CostModel: Send + Sync {
    fn duration(&self, complexity: u32) -> Duration;
}

/// `base_latency + secs_per_unit * complexity`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearCost {
    pub base_latency: Duration,
    pub secs_per_unit: f64,
}

impl LinearCost {
    pub fn new(base_latency_s: f64, secs_per_unit: f64) -> Self {
        Self {
            base_latency: Duration::from_secs_f64(base_latency_s),
            secs_per_unit,
        }
    }
}

impl CostModel for LinearCost {
    fn duration(&self, complexity: u32) -> Duration {
        self.base_latency + Duration::from_secs_f64(self.secs_per_unit * f64::from(complexity))
    }
}

/// Blocks the calling thread for a modeled duration
pub trait Pacer: Send + Sync {
    fn pause(&self, modeled: Duration);
}

/// Sleeps `modeled * scale`; a scale of 0 never sleeps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledSleep {
    scale: f64,
}

impl ScaledSleep {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }

    pub fn real_time() -> Self {
        Self::new(1.0)
    }

    pub fn scale(&self, modeled: Duration) -> Duration {
        if self.scale > 0.0 {
            modeled.mul_f64(self.scale)
        } else {
            Duration::ZERO
        }
    }
}

impl Pacer for ScaledSleep {
    fn pause(&self, modeled: Duration) {
        let real = self.scale(modeled);
        if !real.is_zero() {
            thread::sleep(real);
        }
    }
}

/// Returns immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl Pacer for NoDelay {
    fn pause(&self, _modeled: Duration) {}
}
