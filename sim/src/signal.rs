use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct StopState {
    raised: Mutex<bool>,
    wake: Condvar,
}

/// Cooperative termination signal shared by the driver and its devices.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopState>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        let mut raised = self.inner.raised.lock();
        *raised = true;
        self.inner.wake.notify_all();
    }

    pub fn is_raised(&self) -> bool {
        *self.inner.raised.lock()
    }

    /// Wait up to `timeout`, returning early if the signal is raised.
    /// Returns whether the signal is raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut raised = self.inner.raised.lock();
        match Instant::now().checked_add(timeout) {
            Some(deadline) => {
                while !*raised {
                    if self.inner.wake.wait_until(&mut raised, deadline).timed_out() {
                        break;
                    }
                }
            }
            None => {
                while !*raised {
                    self.inner.wake.wait(&mut raised);
                }
            }
        }
        *raised
    }
}
