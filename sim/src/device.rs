//! Mobile device actor
//!
//! Generates tasks, decides per task whether to offload, and falls back to
//! local processing when no server takes the task.

use offload_model::{
    energy_wh, DeviceId, LocalReason, ServerId, SimConfig, Task, TaskState,
};
use offload_telemetry::{EventLog, OffloadEvent};
use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::context::SimContext;
use crate::cost::{CostModel, Pacer};
use crate::generator::TaskGenerator;
use crate::pool::ServerPool;
use crate::signal::StopSignal;

/// Offload decision trait
pub trait OffloadPolicy: Send {
    fn should_offload(&self, task: &Task) -> bool;
}

/// Offload anything strictly more complex than `threshold`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    threshold: u32,
}

impl ThresholdPolicy {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }
}

impl OffloadPolicy for ThresholdPolicy {
    fn should_offload(&self, task: &Task) -> bool {
        task.complexity > self.threshold
    }
}

/// Where a task ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Server(ServerId),
    Local(LocalReason),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceReport {
    pub id: DeviceId,
    pub generated: u64,
    pub offloaded: u64,
    pub rejected: u64,
    /// Tasks completed locally, including rejected ones
    pub local: u64,
    pub energy_wh: f64,
}

pub struct Device<R: Rng, P: OffloadPolicy = ThresholdPolicy> {
    id: DeviceId,
    generator: TaskGenerator<R>,
    policy: P,
    pool: Arc<ServerPool>,
    cost: Arc<dyn CostModel>,
    pacer: Arc<dyn Pacer>,
    events: Arc<EventLog>,
    stop: StopSignal,
    power_w: f64,
    arrival_interval: Duration,
    max_tasks: Option<u64>,
    report: DeviceReport,
}

impl Device<StdRng, ThresholdPolicy> {
    pub fn from_config(
        id: DeviceId,
        config: &SimConfig,
        pool: Arc<ServerPool>,
        ctx: &SimContext,
        stop: StopSignal,
    ) -> Self {
        Device::new(
            id,
            TaskGenerator::from_config(id, config),
            ThresholdPolicy::new(config.complexity_threshold),
            pool,
            config,
            ctx,
            stop,
        )
    }
}

impl<R: Rng, P: OffloadPolicy> Device<R, P> {
    pub fn new(
        id: DeviceId,
        generator: TaskGenerator<R>,
        policy: P,
        pool: Arc<ServerPool>,
        config: &SimConfig,
        ctx: &SimContext,
        stop: StopSignal,
    ) -> Self {
        Self {
            id,
            generator,
            policy,
            pool,
            cost: Arc::clone(&ctx.device_cost),
            pacer: Arc::clone(&ctx.device_pacer),
            events: Arc::clone(&ctx.events),
            stop,
            power_w: config.device_power_w,
            arrival_interval: config.arrival_interval().mul_f64(config.time_scale),
            max_tasks: config.max_tasks_per_device,
            report: DeviceReport {
                id,
                ..DeviceReport::default()
            },
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn energy_wh(&self) -> f64 {
        self.report.energy_wh
    }

    pub fn report(&self) -> &DeviceReport {
        &self.report
    }

    /// Generate one task and place it.
    pub fn step(&mut self) -> Placement {
        let task = self.generator.next_task();
        self.report.generated += 1;
        self.events.record(OffloadEvent::Generated {
            task: task.id,
            complexity: task.complexity,
            resources: task.resources_needed,
            device_energy_wh: self.report.energy_wh,
        });
        self.dispatch(task)
    }

    /// Offload `task` if the policy and the pool allow it, otherwise run it here.
    pub fn dispatch(&mut self, task: Task) -> Placement {
        if !self.policy.should_offload(&task) {
            return self.run_locally(task, LocalReason::BelowThreshold);
        }

        let pool = Arc::clone(&self.pool);
        let Some(server) = pool.select(&task) else {
            return self.run_locally(task, LocalReason::NoEligibleServer);
        };

        match server.offload(task) {
            Ok(()) => {
                self.report.offloaded += 1;
                Placement::Server(server.id())
            }
            Err(rejected) => {
                debug!(device = self.id, %rejected, "falling back to local processing");
                self.report.rejected += 1;
                self.run_locally(rejected.task, LocalReason::Rejected)
            }
        }
    }

    fn run_locally(&mut self, task: Task, reason: LocalReason) -> Placement {
        self.process_locally(task, reason);
        Placement::Local(reason)
    }

    /// Simulate local execution and charge its energy to this device.
    pub fn process_locally(&mut self, mut task: Task, reason: LocalReason) {
        self.events.record(OffloadEvent::Local {
            task: task.id,
            reason,
            device_energy_wh: self.report.energy_wh,
        });
        task.advance(TaskState::Processing);

        let duration = self.cost.duration(task.complexity);
        self.pacer.pause(duration);
        let energy = energy_wh(self.power_w, duration);

        self.report.energy_wh += energy;
        self.report.local += 1;
        task.advance(TaskState::Completed);
        self.events.record(OffloadEvent::CompletedLocally {
            task: task.id,
            duration,
            energy_wh: energy,
            device_energy_wh: self.report.energy_wh,
        });
    }

    fn reached_limit(&self) -> bool {
        self.max_tasks
            .is_some_and(|max| self.generator.generated() >= max)
    }

    /// Loop until the stop signal is raised or the task limit is reached.
    /// The signal is checked only between iterations.
    pub fn run(mut self) -> DeviceReport {
        debug!(device = self.id, "device started");
        while !self.stop.is_raised() && !self.reached_limit() {
            self.step();
            if self.stop.wait_timeout(self.arrival_interval) {
                break;
            }
        }
        debug!(device = self.id, generated = self.report.generated, "device stopped");
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::NoDelay;
    use crate::server::Server;
    use offload_model::{DrainMode, RejectReason, TaskId};
    use rand::SeedableRng;

    fn setup(config: &SimConfig) -> (Arc<ServerPool>, SimContext) {
        let ctx = SimContext::from_config(config)
            .with_pacer(Arc::new(NoDelay))
            .with_events(Arc::new(EventLog::retaining()));
        let servers = (0..config.num_servers)
            .map(|id| Arc::new(Server::new(id, config, &ctx)))
            .collect();
        (Arc::new(ServerPool::start(servers).unwrap()), ctx)
    }

    fn inline_config() -> SimConfig {
        SimConfig {
            num_servers: 1,
            drain_mode: DrainMode::Inline,
            ..SimConfig::default()
        }
    }

    fn device(
        id: DeviceId,
        config: &SimConfig,
        pool: &Arc<ServerPool>,
        ctx: &SimContext,
    ) -> Device<StdRng> {
        Device::from_config(id, config, Arc::clone(pool), ctx, StopSignal::new())
    }

    fn task(seq: u64, complexity: u32) -> Task {
        Task::new(TaskId::new(0, seq), complexity, 1)
    }

    #[test]
    fn test_threshold_boundary() {
        let policy = ThresholdPolicy::new(5);
        assert!(!policy.should_offload(&task(0, 5)));
        assert!(policy.should_offload(&task(1, 6)));
    }

    #[test]
    fn test_placement_by_complexity() {
        let config = inline_config();
        let (pool, ctx) = setup(&config);
        let mut dev = device(0, &config, &pool, &ctx);

        assert_eq!(dev.dispatch(task(0, 5)), Placement::Local(LocalReason::BelowThreshold));
        assert_eq!(dev.dispatch(task(1, 6)), Placement::Server(0));
        assert_eq!(dev.dispatch(task(2, 3)), Placement::Local(LocalReason::BelowThreshold));

        let report = dev.report();
        assert_eq!((report.offloaded, report.local, report.rejected), (1, 2, 0));
    }

    #[test]
    fn test_low_complexity_stays_local_with_idle_server() {
        let config = SimConfig {
            drain_mode: DrainMode::Dedicated,
            ..inline_config()
        };
        let (pool, ctx) = setup(&config);
        let mut dev = device(0, &config, &pool, &ctx);

        assert_eq!(pool.servers()[0].queue_len(), 0);
        assert_eq!(dev.dispatch(task(0, 3)), Placement::Local(LocalReason::BelowThreshold));
        pool.shutdown();
        assert_eq!(pool.reports()[0].admitted, 0);
    }

    #[test]
    fn test_no_eligible_server() {
        let config = SimConfig {
            server_resources: 2,
            ..inline_config()
        };
        let (pool, ctx) = setup(&config);
        let mut dev = device(0, &config, &pool, &ctx);

        let heavy = Task::new(TaskId::new(0, 0), 9, 3);
        assert_eq!(dev.dispatch(heavy), Placement::Local(LocalReason::NoEligibleServer));
    }

    #[test]
    fn test_rejected_task_runs_locally_once() {
        // Dedicated mode without a consumer draining: fill the queue by hand.
        let config = SimConfig {
            server_capacity: 1,
            drain_mode: DrainMode::Dedicated,
            ..inline_config()
        };
        let ctx = SimContext::from_config(&config)
            .with_pacer(Arc::new(NoDelay))
            .with_events(Arc::new(EventLog::retaining()));
        let server = Arc::new(Server::new(0, &config, &ctx));
        let pool = Arc::new(ServerPool::without_consumers(vec![Arc::clone(&server)]));
        server.offload(Task::new(TaskId::new(9, 0), 10, 1)).unwrap();

        let mut dev = device(0, &config, &pool, &ctx);
        assert_eq!(dev.dispatch(task(0, 10)), Placement::Local(LocalReason::Rejected));

        let events = ctx.events.events();
        assert!(events.iter().any(|e| matches!(
            e,
            OffloadEvent::Rejected { task, server: 0, reason: RejectReason::QueueFull, .. }
                if *task == TaskId::new(0, 0)
        )));
        let local_completions = events
            .iter()
            .filter(|e| matches!(e, OffloadEvent::CompletedLocally { task, .. } if *task == TaskId::new(0, 0)))
            .count();
        assert_eq!(local_completions, 1);
        assert_eq!(dev.report().rejected, 1);
    }

    #[test]
    fn test_local_energy() {
        let config = SimConfig {
            device_power_w: 10.0,
            ..inline_config()
        };
        let (pool, ctx) = setup(&config);
        let mut dev = device(0, &config, &pool, &ctx);

        // 1 s + 0.2 s * 4 = 1.8 s at 10 W
        dev.process_locally(task(0, 4), LocalReason::BelowThreshold);
        let expected = 10.0 * 1.8 / 3600.0;
        assert!((dev.energy_wh() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_run_stops_at_task_limit() {
        let config = SimConfig {
            max_tasks_per_device: Some(12),
            seed: Some(3),
            time_scale: 0.0,
            ..inline_config()
        };
        let (pool, ctx) = setup(&config);
        let report = device(4, &config, &pool, &ctx).run();

        assert_eq!(report.id, 4);
        assert_eq!(report.generated, 12);
        assert_eq!(report.offloaded + report.local, 12);
    }

    #[test]
    fn test_run_exits_when_stopped() {
        let config = inline_config();
        let (pool, ctx) = setup(&config);
        let stop = StopSignal::new();
        stop.raise();

        let dev = Device::new(
            0,
            TaskGenerator::new(0, 1..=10, 1..=3, StdRng::seed_from_u64(0)),
            ThresholdPolicy::new(5),
            pool,
            &config,
            &ctx,
            stop,
        );
        assert_eq!(dev.run().generated, 0);
    }
}
