//! Trailing-edge debounce.
//!
//! Every call restarts the timer; only the action of the last call runs,
//! `wait` after that call.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Merges bursts of calls into one trailing invocation.
pub struct Debouncer {
    wait: Duration,
    runtime: Handle,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    /// Create a debouncer on `runtime`.
    pub fn new(wait: Duration, runtime: Handle) -> Self {
        Self {
            wait,
            runtime,
            pending: Mutex::new(None),
        }
    }

    /// Create a debouncer on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn current(wait: Duration) -> Self {
        Self::new(wait, Handle::current())
    }

    /// The debounce interval.
    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Schedule `action`, replacing whatever was scheduled before.
    pub fn call(&self, action: impl FnOnce() + Send + 'static) {
        // Measured from the call, not from when the task first runs
        let deadline = Instant::now() + self.wait;
        let mut pending = self.pending.lock();

        if let Some(previous) = pending.take() {
            previous.abort();
        }

        *pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            action();
        }));
    }

    /// Drop the scheduled action, if any. Returns `true` if one was pending.
    pub fn cancel(&self) -> bool {
        self.pending.lock().take().is_some_and(|task| {
            let pending = !task.is_finished();
            task.abort();
            pending
        })
    }

    /// Returns `true` while an action is scheduled and has not run.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(task) = self.pending.get_mut().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("wait", &self.wait)
            .field("pending", &self.is_pending())
            .finish()
    }
}
