//! Task generation

use offload_model::{DeviceId, SimConfig, Task, TaskId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;

/// Produces a device's task stream from an injected random source.
pub struct TaskGenerator<R: Rng> {
    device: DeviceId,
    next_seq: u64,
    complexity: RangeInclusive<u32>,
    resources: RangeInclusive<u32>,
    rng: R,
}

impl TaskGenerator<StdRng> {
    /// Seeded from the run seed when one is configured, from OS entropy otherwise.
    pub fn from_config(device: DeviceId, config: &SimConfig) -> Self {
        let rng = match config.device_seed(device) {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(
            device,
            config.complexity.to_inclusive(),
            config.resources.to_inclusive(),
            rng,
        )
    }
}

impl<R: Rng> TaskGenerator<R> {
    pub fn new(
        device: DeviceId,
        complexity: RangeInclusive<u32>,
        resources: RangeInclusive<u32>,
        rng: R,
    ) -> Self {
        Self {
            device,
            next_seq: 0,
            complexity,
            resources,
            rng,
        }
    }

    pub fn next_task(&mut self) -> Task {
        let id = TaskId::new(self.device, self.next_seq);
        self.next_seq += 1;

        let complexity = self.rng.gen_range(self.complexity.clone());
        let resources_needed = self.rng.gen_range(self.resources.clone());
        Task::new(id, complexity, resources_needed)
    }

    /// Tasks produced so far
    pub fn generated(&self) -> u64 {
        self.next_seq
    }
}
