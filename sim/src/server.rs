//! Server admission queue and FIFO drain.
//!
//! Admission and every queue mutation happen under the server's one mutex.
//! The task being processed stays at the head of the queue until it
//! completes, so queue length counts in-service work and never exceeds
//! `capacity`. A drain loop runs only while the queue is non-empty, and it
//! is the only code that pops the head, which gives strict FIFO completion.
//! Events are stamped under the mutex, so their sequence numbers follow
//! that order, and published once it is released.

use offload_model::{
    energy_wh, DrainMode, RejectReason, ServerId, SimConfig, Task, TaskState,
};
use offload_telemetry::{EventLog, OffloadEvent};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use crate::context::SimContext;
use crate::cost::{CostModel, Pacer};
use crate::error::AdmissionRejected;

/// Snapshot of a server's counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerReport {
    pub id: ServerId,
    pub admitted: u64,
    pub completed: u64,
    pub rejected: u64,
    pub energy_wh: f64,
    pub peak_queue_len: usize,
}

struct ServerState {
    queue: VecDeque<Task>,
    available_resources: u32,
    energy_wh: f64,
    admitted: u64,
    completed: u64,
    rejected: u64,
    peak_queue_len: usize,
    closed: bool,
}

pub struct Server {
    id: ServerId,
    capacity: usize,
    mode: DrainMode,
    power_w: f64,
    cost: Arc<dyn CostModel>,
    pacer: Arc<dyn Pacer>,
    events: Arc<EventLog>,
    state: Mutex<ServerState>,
    work_ready: Condvar,
}

impl Server {
    pub fn new(id: ServerId, config: &SimConfig, ctx: &SimContext) -> Self {
        Self {
            id,
            capacity: config.server_capacity,
            mode: config.drain_mode,
            power_w: config.server_power_w,
            cost: Arc::clone(&ctx.server_cost),
            pacer: Arc::clone(&ctx.server_pacer),
            events: Arc::clone(&ctx.events),
            state: Mutex::new(ServerState {
                queue: VecDeque::with_capacity(config.server_capacity),
                available_resources: config.server_resources,
                energy_wh: 0.0,
                admitted: 0,
                completed: 0,
                rejected: 0,
                peak_queue_len: 0,
                closed: false,
            }),
            work_ready: Condvar::new(),
        }
    }

    pub fn id(&self) -> ServerId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mode(&self) -> DrainMode {
        self.mode
    }

    pub fn available_resources(&self) -> u32 {
        self.state.lock().available_resources
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn energy_wh(&self) -> f64 {
        self.state.lock().energy_wh
    }

    /// Admit `task` or hand it back.
    ///
    /// In inline mode, the call that moves the queue from empty to
    /// non-empty drains the whole backlog before returning.
    pub fn offload(&self, mut task: Task) -> Result<(), AdmissionRejected> {
        let admission = {
            let mut state = self.state.lock();

            let refusal = if state.closed {
                Some(RejectReason::ShuttingDown)
            } else if state.queue.len() >= self.capacity {
                Some(RejectReason::QueueFull)
            } else if state.available_resources < task.resources_needed {
                Some(RejectReason::InsufficientResources)
            } else {
                None
            };
            match refusal {
                Some(reason) => {
                    state.rejected += 1;
                    let logged = self.events.stamp(OffloadEvent::Rejected {
                        task: task.id,
                        server: self.id,
                        reason,
                        server_energy_wh: state.energy_wh,
                    });
                    Err((reason, task, logged))
                }
                None => {
                    state.available_resources -= task.resources_needed;
                    task.advance(TaskState::Enqueued);
                    let task_id = task.id;
                    state.queue.push_back(task);
                    state.admitted += 1;
                    let queue_len = state.queue.len();
                    state.peak_queue_len = state.peak_queue_len.max(queue_len);
                    let logged = self.events.stamp(OffloadEvent::Offloaded {
                        task: task_id,
                        server: self.id,
                        queue_len,
                        server_energy_wh: state.energy_wh,
                    });
                    Ok((queue_len == 1, logged))
                }
            }
        };

        let starts_drain = match admission {
            Ok((starts_drain, logged)) => {
                self.events.publish(logged);
                starts_drain
            }
            Err((reason, task, logged)) => {
                self.events.publish(logged);
                return Err(AdmissionRejected {
                    server: self.id,
                    reason,
                    task,
                });
            }
        };

        match self.mode {
            DrainMode::Inline => {
                if starts_drain {
                    self.drain();
                }
            }
            DrainMode::Dedicated => {
                self.work_ready.notify_one();
            }
        }
        Ok(())
    }

    /// Process queued tasks until the queue is empty. Returns how many
    /// tasks completed.
    fn drain(&self) -> usize {
        debug!(server = self.id, "drain started");
        let mut processed = 0usize;
        loop {
            let (completed, more) = self.process_head();
            if completed {
                processed += 1;
            }
            if !more {
                break;
            }
        }
        debug!(server = self.id, processed, "drain finished");
        processed
    }

    /// Process the task at the head of the queue. Returns whether a task
    /// completed and whether work remains.
    fn process_head(&self) -> (bool, bool) {
        let (task_id, complexity) = {
            let mut state = self.state.lock();
            let Some(head) = state.queue.front_mut() else {
                return (false, false);
            };
            head.advance(TaskState::Processing);
            (head.id, head.complexity)
        };

        let duration = self.cost.duration(complexity);
        self.pacer.pause(duration);
        let energy = energy_wh(self.power_w, duration);

        let (logged, more) = {
            let mut state = self.state.lock();
            let Some(mut task) = state.queue.pop_front() else {
                return (false, false);
            };
            debug_assert_eq!(task.id, task_id, "head changed while processing");
            task.advance(TaskState::Completed);
            state.available_resources += task.resources_needed;
            state.energy_wh += energy;
            state.completed += 1;
            let logged = self.events.stamp(OffloadEvent::CompletedOnServer {
                task: task.id,
                server: self.id,
                duration,
                energy_wh: energy,
                server_energy_wh: state.energy_wh,
            });
            (logged, !state.queue.is_empty())
        };
        self.events.publish(logged);
        (true, more)
    }

    /// Consumer loop for dedicated mode. Returns once the server is shut
    /// down and everything already admitted has completed.
    pub fn run_consumer(&self) {
        debug!(server = self.id, "consumer started");
        loop {
            if !self.wait_for_work() {
                break;
            }
            self.process_head();
        }
        debug!(server = self.id, "consumer stopped");
    }

    fn wait_for_work(&self) -> bool {
        let mut state = self.state.lock();
        while state.queue.is_empty() {
            if state.closed {
                return false;
            }
            self.work_ready.wait(&mut state);
        }
        true
    }

    /// Refuse new work and wake the consumer so it can finish the backlog.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.work_ready.notify_all();
    }

    pub fn report(&self) -> ServerReport {
        let state = self.state.lock();
        ServerReport {
            id: self.id,
            admitted: state.admitted,
            completed: state.completed,
            rejected: state.rejected,
            energy_wh: state.energy_wh,
            peak_queue_len: state.peak_queue_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::NoDelay;
    use offload_model::TaskId;

    fn config(mode: DrainMode, capacity: usize) -> SimConfig {
        SimConfig {
            drain_mode: mode,
            server_capacity: capacity,
            ..SimConfig::default()
        }
    }

    fn context() -> SimContext {
        SimContext::from_config(&SimConfig::default())
            .with_pacer(Arc::new(NoDelay))
            .with_events(Arc::new(EventLog::retaining()))
    }

    fn task(seq: u64, complexity: u32, resources: u32) -> Task {
        Task::new(TaskId::new(0, seq), complexity, resources)
    }

    fn completion_order(events: &EventLog) -> Vec<TaskId> {
        events
            .events()
            .iter()
            .filter_map(|event| match event {
                OffloadEvent::CompletedOnServer { task, .. } => Some(*task),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_rejects_when_full() {
        // No consumer running: admitted tasks stay queued.
        let ctx = context();
        let server = Server::new(0, &config(DrainMode::Dedicated, 3), &ctx);

        for seq in 0..3 {
            assert!(server.offload(task(seq, 8, 1)).is_ok());
        }
        assert_eq!(server.queue_len(), 3);

        let rejected = server.offload(task(3, 8, 1)).unwrap_err();
        assert_eq!(rejected.reason, RejectReason::QueueFull);
        assert_eq!(rejected.server, 0);
        assert_eq!(rejected.task.id, TaskId::new(0, 3));
        assert_eq!(rejected.task.state(), TaskState::Pending);
        assert_eq!(server.queue_len(), 3);

        let report = server.report();
        assert_eq!((report.admitted, report.rejected), (3, 1));
        assert_eq!(report.peak_queue_len, 3);
    }

    #[test]
    fn test_consumer_drains_backlog_in_order_after_shutdown() {
        let ctx = context();
        let server = Server::new(1, &config(DrainMode::Dedicated, 4), &ctx);
        for seq in 0..4 {
            server.offload(task(seq, 6 + seq as u32, 1)).unwrap();
        }

        server.shutdown();
        server.run_consumer();

        assert_eq!(server.queue_len(), 0);
        assert_eq!(
            completion_order(&ctx.events),
            (0..4).map(|seq| TaskId::new(0, seq)).collect::<Vec<_>>()
        );

        let rejected = server.offload(task(9, 8, 1)).unwrap_err();
        assert_eq!(rejected.reason, RejectReason::ShuttingDown);
    }

    #[test]
    fn test_resources_reserved_and_restored() {
        let ctx = context();
        let cfg = SimConfig {
            server_resources: 4,
            ..config(DrainMode::Dedicated, 3)
        };
        let server = Server::new(0, &cfg, &ctx);

        server.offload(task(0, 9, 3)).unwrap();
        assert_eq!(server.available_resources(), 1);

        let rejected = server.offload(task(1, 9, 2)).unwrap_err();
        assert_eq!(rejected.reason, RejectReason::InsufficientResources);

        server.shutdown();
        server.run_consumer();
        assert_eq!(server.available_resources(), 4);
    }

    #[test]
    fn test_inline_offload_drains_before_returning() {
        let ctx = context();
        let server = Server::new(0, &config(DrainMode::Inline, 1), &ctx);

        server.offload(task(0, 10, 1)).unwrap();
        assert_eq!(server.queue_len(), 0);
        server.offload(task(1, 4, 1)).unwrap();

        let report = server.report();
        assert_eq!(report.completed, 2);
        assert_eq!(report.peak_queue_len, 1);

        // 150 W for (1 + 0.5 * 10) s plus 150 W for (1 + 0.5 * 4) s
        let expected = 150.0 * 6.0 / 3600.0 + 150.0 * 3.0 / 3600.0;
        assert!((report.energy_wh - expected).abs() < 1e-9);
        assert_eq!(completion_order(&ctx.events).len(), 2);
    }

    #[test]
    fn test_drain_counts_completed_tasks() {
        let ctx = context();
        let server = Server::new(0, &config(DrainMode::Dedicated, 4), &ctx);
        for seq in 0..3 {
            server.offload(task(seq, 6, 1)).unwrap();
        }

        assert_eq!(server.drain(), 3);
        assert_eq!(server.drain(), 0);
        assert_eq!(server.report().completed, 3);
    }

    #[test]
    fn test_dedicated_offload_wakes_consumer() {
        let ctx = context();
        let server = Arc::new(Server::new(0, &config(DrainMode::Dedicated, 4), &ctx));
        let consumer = {
            let server = Arc::clone(&server);
            std::thread::spawn(move || server.run_consumer())
        };

        for seq in 0..3 {
            server.offload(task(seq, 7, 1)).unwrap();
        }
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while server.report().completed < 3 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(server.report().completed, 3);

        server.shutdown();
        consumer.join().unwrap();
    }

    #[test]
    fn test_admission_events_carry_server_total() {
        let ctx = context();
        let server = Server::new(0, &config(DrainMode::Inline, 2), &ctx);
        server.offload(task(0, 10, 1)).unwrap();
        server.offload(task(1, 10, 1)).unwrap();

        let totals: Vec<f64> = ctx
            .events
            .events()
            .iter()
            .filter(|event| matches!(event, OffloadEvent::Offloaded { .. }))
            .map(|event| event.total_energy_wh())
            .collect();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0], 0.0);
        assert!((totals[1] - 150.0 * 6.0 / 3600.0).abs() < 1e-9);
    }

    #[test]
    fn test_events_pair_admission_with_completion() {
        let ctx = context();
        let server = Server::new(2, &config(DrainMode::Inline, 2), &ctx);
        server.offload(task(0, 7, 1)).unwrap();

        let events = ctx.events.events();
        assert_eq!(
            events[0],
            OffloadEvent::Offloaded {
                task: TaskId::new(0, 0),
                server: 2,
                queue_len: 1,
                server_energy_wh: 0.0,
            }
        );
        assert!(matches!(
            events[1],
            OffloadEvent::CompletedOnServer { server: 2, .. }
        ));
    }
}
