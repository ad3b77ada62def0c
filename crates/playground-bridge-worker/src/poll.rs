//! Poll-until-ready.
//!
//! The readiness gate is a plain boolean; [`poll_until_ready`] turns it into
//! something a caller can await, with its own interval and timeout, and
//! abandon early through [`ReadinessPoll::cancel`].

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use playground_bridge_common::BridgeError;

/// A running readiness poll.
#[derive(Debug)]
pub struct ReadinessPoll {
    stop: Mutex<Option<oneshot::Sender<()>>>,
    task: JoinHandle<Result<(), BridgeError>>,
}

impl ReadinessPoll {
    /// Stop polling. The poll resolves with [`BridgeError::PollCancelled`]
    /// unless it already finished.
    pub fn cancel(&self) {
        if let Some(stop) = self.stop.lock().take() {
            let _ = stop.send(());
        }
    }

    /// Returns `true` once the poll has resolved.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the poll to resolve.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::BootFailure`] on timeout and
    /// [`BridgeError::PollCancelled`] if the poll was cancelled.
    pub async fn wait(self) -> Result<(), BridgeError> {
        self.task.await.unwrap_or(Err(BridgeError::PollCancelled))
    }
}

/// Poll `probe` every `interval` until it returns `true` or `timeout` passes.
///
/// The first probe happens immediately. Must be called from within a Tokio
/// runtime.
pub fn poll_until_ready<F>(probe: F, interval: Duration, timeout: Duration) -> ReadinessPoll
where
    F: Fn() -> bool + Send + 'static,
{
    let (stop, mut stopped) = oneshot::channel::<()>();
    let deadline = Instant::now() + timeout;

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts = 0u32;

        loop {
            tokio::select! {
                biased;
                _ = &mut stopped => {
                    debug!(attempts, "Readiness poll cancelled");
                    return Err(BridgeError::PollCancelled);
                }
                () = tokio::time::sleep_until(deadline) => {
                    // One last look at the deadline itself
                    if probe() {
                        return Ok(());
                    }
                    return Err(BridgeError::boot_failure(format!(
                        "runtime not ready after {}ms",
                        timeout.as_millis()
                    )));
                }
                _ = ticker.tick() => {
                    attempts += 1;
                    if probe() {
                        debug!(attempts, "Runtime ready");
                        return Ok(());
                    }
                }
            }
        }
    });

    ReadinessPoll {
        stop: Mutex::new(Some(stop)),
        task,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ready_immediately() {
        let poll = poll_until_ready(|| true, Duration::from_millis(50), Duration::from_secs(1));
        assert!(poll.wait().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_some_probes() {
        let probes = Arc::new(AtomicU32::new(0));
        let counter = probes.clone();
        let start = Instant::now();

        let poll = poll_until_ready(
            move || counter.fetch_add(1, Ordering::SeqCst) >= 3,
            Duration::from_millis(50),
            Duration::from_secs(10),
        );

        assert!(poll.wait().await.is_ok());
        assert_eq!(probes.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_boot_failure() {
        let start = Instant::now();
        let poll = poll_until_ready(|| false, Duration::from_millis(50), Duration::from_millis(500));

        let result = poll.wait().await;

        assert!(matches!(result, Err(BridgeError::BootFailure { .. })));
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let ready = Arc::new(AtomicBool::new(false));
        let flag = ready.clone();
        let poll = poll_until_ready(
            move || flag.load(Ordering::SeqCst),
            Duration::from_millis(50),
            Duration::from_secs(10),
        );

        tokio::time::sleep(Duration::from_millis(120)).await;
        poll.cancel();

        assert!(matches!(poll.wait().await, Err(BridgeError::PollCancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_success_keeps_result() {
        let poll = poll_until_ready(|| true, Duration::from_millis(50), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(poll.is_finished());
        poll.cancel();
        assert!(poll.wait().await.is_ok());
    }
}
