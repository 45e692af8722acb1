//! Server pool and first-fit selection

use offload_model::{DrainMode, Task};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::warn;

use crate::error::SimError;
use crate::server::{Server, ServerReport};

/// Fixed, ordered set of servers. Owns the consumer threads of
/// dedicated-mode servers.
pub struct ServerPool {
    servers: Vec<Arc<Server>>,
    consumers: Mutex<Vec<JoinHandle<()>>>,
}

impl ServerPool {
    /// Take ownership of `servers` and start a consumer for each
    /// dedicated-mode server.
    pub fn start(servers: Vec<Arc<Server>>) -> Result<Self, SimError> {
        Self::start_with(servers, |server| {
            let server = Arc::clone(server);
            thread::Builder::new()
                .name(format!("server-{}", server.id()))
                .spawn(move || server.run_consumer())
        })
    }

    /// If a spawn fails, every server is closed and the consumers already
    /// running are joined before the error is returned.
    fn start_with<F>(servers: Vec<Arc<Server>>, mut spawn: F) -> Result<Self, SimError>
    where
        F: FnMut(&Arc<Server>) -> io::Result<JoinHandle<()>>,
    {
        let pool = Self {
            servers,
            consumers: Mutex::new(Vec::new()),
        };
        for server in pool.servers.iter() {
            if server.mode() != DrainMode::Dedicated {
                continue;
            }
            match spawn(server) {
                Ok(handle) => pool.consumers.lock().push(handle),
                Err(err) => {
                    warn!(server = server.id(), %err, "failed to start server consumer");
                    pool.shutdown();
                    return Err(err.into());
                }
            }
        }
        Ok(pool)
    }

    /// Test-only hook: a pool whose dedicated servers have no consumer, so
    /// admitted tasks stay queued.
    #[cfg(test)]
    pub(crate) fn without_consumers(servers: Vec<Arc<Server>>) -> Self {
        Self {
            servers,
            consumers: Mutex::new(Vec::new()),
        }
    }

    /// First server, in index order, with enough available resources.
    pub fn select(&self, task: &Task) -> Option<&Arc<Server>> {
        self.servers
            .iter()
            .find(|server| server.available_resources() >= task.resources_needed)
    }

    pub fn servers(&self) -> &[Arc<Server>] {
        &self.servers
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Close every server and wait for consumers to finish their backlog.
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        for server in self.servers.iter() {
            server.shutdown();
        }

        let consumers: Vec<JoinHandle<()>> = self.consumers.lock().drain(..).collect();
        for handle in consumers {
            if handle.join().is_err() {
                warn!("server consumer thread panicked");
            }
        }
    }

    pub fn reports(&self) -> Vec<ServerReport> {
        self.servers.iter().map(|server| server.report()).collect()
    }
}

impl Drop for ServerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;
    use crate::cost::NoDelay;
    use offload_model::{RejectReason, SimConfig, TaskId};

    fn inline_pool(resources: &[u32]) -> ServerPool {
        let ctx = SimContext::from_config(&SimConfig::default()).with_pacer(Arc::new(NoDelay));
        let servers = resources
            .iter()
            .enumerate()
            .map(|(id, &server_resources)| {
                let config = SimConfig {
                    server_resources,
                    drain_mode: DrainMode::Inline,
                    ..SimConfig::default()
                };
                Arc::new(Server::new(id as u32, &config, &ctx))
            })
            .collect();
        ServerPool::start(servers).unwrap()
    }

    fn task(resources: u32) -> Task {
        Task::new(TaskId::new(0, 0), 9, resources)
    }

    #[test]
    fn test_first_fit() {
        let pool = inline_pool(&[10, 10]);
        assert_eq!(pool.select(&task(3)).map(|s| s.id()), Some(0));
    }

    #[test]
    fn test_skips_servers_without_resources() {
        let pool = inline_pool(&[2, 1, 5]);
        assert_eq!(pool.select(&task(1)).map(|s| s.id()), Some(0));
        assert_eq!(pool.select(&task(3)).map(|s| s.id()), Some(2));
        assert!(pool.select(&task(6)).is_none());
    }

    #[test]
    fn test_failed_spawn_stops_started_consumers() {
        let config = SimConfig::default();
        let ctx = SimContext::from_config(&config).with_pacer(Arc::new(NoDelay));
        let servers: Vec<Arc<Server>> = (0..3)
            .map(|id| Arc::new(Server::new(id, &config, &ctx)))
            .collect();

        let mut spawned = 0;
        let result = ServerPool::start_with(servers.clone(), |server| {
            if spawned == 1 {
                return Err(io::Error::new(io::ErrorKind::Other, "no more threads"));
            }
            spawned += 1;
            let server = Arc::clone(server);
            thread::Builder::new().spawn(move || server.run_consumer())
        });

        assert!(matches!(result, Err(SimError::Spawn(_))));
        for server in servers.iter() {
            let rejected = server.offload(task(1)).unwrap_err();
            assert_eq!(rejected.reason, RejectReason::ShuttingDown);
        }
    }

    #[test]
    fn test_dedicated_consumers_joined_on_shutdown() {
        let config = SimConfig::default();
        let ctx = SimContext::from_config(&config).with_pacer(Arc::new(NoDelay));
        let servers = (0..2)
            .map(|id| Arc::new(Server::new(id, &config, &ctx)))
            .collect();
        let pool = ServerPool::start(servers).unwrap();
        assert_eq!(pool.len(), 2);

        pool.servers()[1].offload(task(2)).unwrap();
        pool.shutdown();
        pool.shutdown();

        let reports = pool.reports();
        assert_eq!(reports[1].completed, 1);
        assert_eq!(reports[0].completed, 0);
    }
}
