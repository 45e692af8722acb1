use offload_model::{ConfigError, RejectReason, ServerId, Task};
use thiserror::Error;

/// A server turned a task away. The task is handed back untouched so the
/// caller can run it locally.
#[derive(Debug, Error)]
#[error("server {server} rejected task {}: {reason}", .task.id)]
pub struct AdmissionRejected {
    pub server: ServerId,
    pub reason: RejectReason,
    pub task: Task,
}

/// Errors that stop a simulation from starting
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}
