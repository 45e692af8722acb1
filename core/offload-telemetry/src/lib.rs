//! Offload Telemetry
//!
//! Lifecycle events emitted by devices and servers, a shared event log,
//! and CSV export of the recorded trace.

use offload_model::{DeviceId, LocalReason, RejectReason, ServerId, TaskId};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// One lifecycle event
#[derive(Debug, Clone, PartialEq)]
pub enum OffloadEvent {
    Generated {
        task: TaskId,
        complexity: u32,
        resources: u32,
        device_energy_wh: f64,
    },
    /// Admitted into a server queue. `queue_len` includes the new task.
    Offloaded {
        task: TaskId,
        server: ServerId,
        queue_len: usize,
        server_energy_wh: f64,
    },
    Rejected {
        task: TaskId,
        server: ServerId,
        reason: RejectReason,
        server_energy_wh: f64,
    },
    /// Local processing is starting
    Local {
        task: TaskId,
        reason: LocalReason,
        device_energy_wh: f64,
    },
    CompletedOnServer {
        task: TaskId,
        server: ServerId,
        duration: Duration,
        energy_wh: f64,
        server_energy_wh: f64,
    },
    CompletedLocally {
        task: TaskId,
        duration: Duration,
        energy_wh: f64,
        device_energy_wh: f64,
    },
}

impl OffloadEvent {
    pub fn task(&self) -> TaskId {
        match self {
            OffloadEvent::Generated { task, .. }
            | OffloadEvent::Offloaded { task, .. }
            | OffloadEvent::Rejected { task, .. }
            | OffloadEvent::Local { task, .. }
            | OffloadEvent::CompletedOnServer { task, .. }
            | OffloadEvent::CompletedLocally { task, .. } => *task,
        }
    }

    pub fn device(&self) -> DeviceId {
        self.task().device
    }

    pub fn server(&self) -> Option<ServerId> {
        match self {
            OffloadEvent::Offloaded { server, .. }
            | OffloadEvent::Rejected { server, .. }
            | OffloadEvent::CompletedOnServer { server, .. } => Some(*server),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OffloadEvent::Generated { .. } => "generated",
            OffloadEvent::Offloaded { .. } => "offloaded",
            OffloadEvent::Rejected { .. } => "rejected",
            OffloadEvent::Local { .. } => "local",
            OffloadEvent::CompletedOnServer { .. } => "completed_on_server",
            OffloadEvent::CompletedLocally { .. } => "completed_locally",
        }
    }

    /// Running energy total of the device or server the event belongs to
    pub fn total_energy_wh(&self) -> f64 {
        match self {
            OffloadEvent::Generated {
                device_energy_wh, ..
            }
            | OffloadEvent::Local {
                device_energy_wh, ..
            }
            | OffloadEvent::CompletedLocally {
                device_energy_wh, ..
            } => *device_energy_wh,
            OffloadEvent::Offloaded {
                server_energy_wh, ..
            }
            | OffloadEvent::Rejected {
                server_energy_wh, ..
            }
            | OffloadEvent::CompletedOnServer {
                server_energy_wh, ..
            } => *server_energy_wh,
        }
    }

    pub fn is_completion(&self) -> bool {
        matches!(
            self,
            OffloadEvent::CompletedOnServer { .. } | OffloadEvent::CompletedLocally { .. }
        )
    }
}

impl fmt::Display for OffloadEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffloadEvent::Generated {
                task,
                complexity,
                resources,
                device_energy_wh,
            } => write!(
                f,
                "Device {}: generated Task {task} (complexity {complexity}, resources {resources}). Device total {device_energy_wh:.5} Wh",
                task.device
            ),
            OffloadEvent::Offloaded {
                task,
                server,
                queue_len,
                server_energy_wh,
            } => write!(
                f,
                "Device {}: offloaded Task {task} to server {server} (queue depth {queue_len}). Server total {server_energy_wh:.5} Wh",
                task.device
            ),
            OffloadEvent::Rejected {
                task,
                server,
                reason,
                server_energy_wh,
            } => write!(
                f,
                "Server {server} is busy ({reason}), cannot offload Task {task}. Server total {server_energy_wh:.5} Wh"
            ),
            OffloadEvent::Local {
                task,
                reason,
                device_energy_wh,
            } => write!(
                f,
                "Device {}: processing Task {task} locally ({reason}). Device total {device_energy_wh:.5} Wh",
                task.device
            ),
            OffloadEvent::CompletedOnServer {
                task,
                server,
                duration,
                energy_wh,
                server_energy_wh,
            } => write!(
                f,
                "Task {task} processed on server {server} in {:.2}s. Energy: {energy_wh:.5} Wh, server total {server_energy_wh:.5} Wh",
                duration.as_secs_f64()
            ),
            OffloadEvent::CompletedLocally {
                task,
                duration,
                energy_wh,
                device_energy_wh,
            } => write!(
                f,
                "Device {}: Task {task} processed locally in {:.2}s. Energy: {energy_wh:.5} Wh, device total {device_energy_wh:.5} Wh",
                task.device,
                duration.as_secs_f64()
            ),
        }
    }
}

/// Event with its position in the log
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedEvent {
    pub seq: u64,
    /// Wall-clock offset from log creation
    pub at: Duration,
    pub event: OffloadEvent,
}

/// Flat CSV row
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub seq: u64,
    pub at_ms: f64,
    pub kind: &'static str,
    pub device: DeviceId,
    pub task: String,
    pub server: Option<ServerId>,
    pub detail: Option<String>,
    pub duration_s: Option<f64>,
    pub energy_wh: Option<f64>,
    pub total_energy_wh: Option<f64>,
}

impl From<&LoggedEvent> for EventRecord {
    fn from(logged: &LoggedEvent) -> Self {
        let event = &logged.event;
        let mut record = EventRecord {
            seq: logged.seq,
            at_ms: logged.at.as_secs_f64() * 1000.0,
            kind: event.kind(),
            device: event.device(),
            task: event.task().to_string(),
            server: event.server(),
            detail: None,
            duration_s: None,
            energy_wh: None,
            total_energy_wh: Some(event.total_energy_wh()),
        };

        match event {
            OffloadEvent::Generated {
                complexity,
                resources,
                ..
            } => {
                record.detail = Some(format!("complexity={complexity};resources={resources}"));
            }
            OffloadEvent::Offloaded { queue_len, .. } => {
                record.detail = Some(format!("queue_len={queue_len}"));
            }
            OffloadEvent::Rejected { reason, .. } => {
                record.detail = Some(reason.to_string());
            }
            OffloadEvent::Local { reason, .. } => {
                record.detail = Some(reason.to_string());
            }
            OffloadEvent::CompletedOnServer {
                duration,
                energy_wh,
                ..
            }
            | OffloadEvent::CompletedLocally {
                duration,
                energy_wh,
                ..
            } => {
                record.duration_s = Some(duration.as_secs_f64());
                record.energy_wh = Some(*energy_wh);
            }
        }
        record
    }
}

/// Shared sink for lifecycle events.
///
/// Recording is split in two steps. `stamp` assigns the sequence number and
/// is cheap enough to call under a server's queue lock, which makes `seq`
/// follow that server's admission and completion order. `publish` writes
/// the trace line and, for a retaining log, keeps the event; call it after
/// the queue lock is released.
pub struct EventLog {
    start: Instant,
    retain: bool,
    next_seq: AtomicU64,
    entries: Mutex<Vec<LoggedEvent>>,
}

impl EventLog {
    /// Trace-only log
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Log that also keeps every event for later inspection or export
    pub fn retaining() -> Self {
        Self::build(true)
    }

    fn build(retain: bool) -> Self {
        Self {
            start: Instant::now(),
            retain,
            next_seq: AtomicU64::new(0),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn is_retaining(&self) -> bool {
        self.retain
    }

    /// Assign the next sequence number to `event`.
    pub fn stamp(&self, event: OffloadEvent) -> LoggedEvent {
        LoggedEvent {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            at: self.start.elapsed(),
            event,
        }
    }

    /// Emit the trace line for a stamped event and retain it if configured.
    pub fn publish(&self, logged: LoggedEvent) {
        tracing::info!(target: "offload", seq = logged.seq, "{}", logged.event);
        if self.retain {
            self.entries.lock().push(logged);
        }
    }

    pub fn record(&self, event: OffloadEvent) {
        let logged = self.stamp(event);
        self.publish(logged);
    }

    /// Number of events stamped so far (retained or not)
    pub fn recorded(&self) -> u64 {
        self.next_seq.load(Ordering::Relaxed)
    }

    /// Retained events ordered by `seq`
    pub fn snapshot(&self) -> Vec<LoggedEvent> {
        let mut entries = self.entries.lock().clone();
        entries.sort_by_key(|logged| logged.seq);
        entries
    }

    /// Retained events only, in `seq` order
    pub fn events(&self) -> Vec<OffloadEvent> {
        self.snapshot()
            .into_iter()
            .map(|logged| logged.event)
            .collect()
    }

    /// Write the retained trace as CSV with a header row.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> csv::Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        for logged in self.snapshot().iter() {
            wtr.serialize(EventRecord::from(logged))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
