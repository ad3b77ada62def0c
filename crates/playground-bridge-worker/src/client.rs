//! The host adapter.
//!
//! [`BridgeClient`] is what the UI holds. It forwards `run`/`check` over the
//! transport, signals cancellation out of band, exposes the readiness gate,
//! and offers both a debounced readiness re-check and an explicit
//! poll-until-ready.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::debounce::Debouncer;
use crate::poll::{ReadinessPoll, poll_until_ready};
use crate::protocol::{CallToken, HostFrame, SlotSet};
use crate::relay::{Continuations, relay};
use crate::transport::{FrameSender, HostEnd};
use playground_bridge_common::{BridgeConfig, BridgeError, Operation, Outcome};
use playground_bridge_core::{
    Bindings, BridgeState, EntryRegistry, ExecutionRequest, request_cancel,
};

/// A submitted call.
///
/// Callbacks fire as the worker relays them, whether or not anyone waits
/// here; [`wait`](Self::wait) only reports how the call ended.
#[derive(Debug)]
pub struct PendingCall {
    token: CallToken,
    outcome: oneshot::Receiver<Outcome>,
    timeout: Duration,
    continuations: Continuations,
}

impl PendingCall {
    /// Correlation token of the call.
    pub fn token(&self) -> CallToken {
        self.token
    }

    /// Wait for the call to finish.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Timeout`] if the worker stays silent past the
    /// call timeout, and [`BridgeError::WorkerUnavailable`] if it stopped.
    pub async fn wait(self) -> Result<Outcome, BridgeError> {
        match tokio::time::timeout(self.timeout, self.outcome).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(BridgeError::WorkerUnavailable),
            Err(_) => {
                // Late callbacks for this token are dropped from now on
                self.continuations.forget(self.token);
                warn!(token = self.token, "Call timed out");
                Err(BridgeError::Timeout {
                    duration_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }
}

/// Caller-side handle to a runtime worker.
pub struct BridgeClient {
    id: Uuid,
    registry: Arc<EntryRegistry>,
    sender: FrameSender<HostFrame>,
    continuations: Continuations,
    next_token: AtomicU64,
    latest_token: AtomicU64,
    config: BridgeConfig,
    debouncer: Debouncer,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeClient {
    pub(crate) fn new(
        id: Uuid,
        registry: Arc<EntryRegistry>,
        host: HostEnd,
        config: BridgeConfig,
        worker: JoinHandle<()>,
        runtime: &Handle,
    ) -> Self {
        let HostEnd { sender, receiver } = host;
        let continuations = Continuations::new();
        runtime.spawn(relay(receiver, continuations.clone()));

        Self {
            id,
            registry,
            sender,
            continuations,
            next_token: AtomicU64::new(0),
            latest_token: AtomicU64::new(0),
            debouncer: Debouncer::new(config.debounce(), runtime.clone()),
            config,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Identifier of this bridge, as used in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns `true` once the runtime's entry points are installed.
    ///
    /// Never blocks and never fails.
    pub fn is_loaded(&self) -> bool {
        self.registry.is_loaded()
    }

    /// Lifecycle state of the runtime.
    pub fn state(&self) -> BridgeState {
        self.registry.state()
    }

    /// Execute a script; its outcome arrives through `resultCallback`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotReady`] before the runtime is loaded.
    pub fn run(
        &self,
        script: impl Into<String>,
        bindings: Bindings,
    ) -> Result<PendingCall, BridgeError> {
        self.submit(Operation::Run, ExecutionRequest::new(script, bindings))
    }

    /// Check a script; its warning arrives through `checkCallback`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotReady`] before the runtime is loaded.
    pub fn check(
        &self,
        script: impl Into<String>,
        bindings: Bindings,
    ) -> Result<PendingCall, BridgeError> {
        self.submit(Operation::Check, ExecutionRequest::new(script, bindings))
    }

    /// Send a call to the worker.
    ///
    /// Calls made before the runtime is loaded are rejected here and never
    /// reach the worker.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotReady`] before the runtime is loaded and
    /// [`BridgeError::WorkerUnavailable`] if the worker has stopped.
    pub fn submit(
        &self,
        operation: Operation,
        request: ExecutionRequest,
    ) -> Result<PendingCall, BridgeError> {
        if !self.is_loaded() {
            debug!(operation = %operation, state = %self.state(), "Rejecting call before ready");
            return Err(BridgeError::NotReady);
        }

        let ExecutionRequest { script, bindings } = request;
        let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;
        let slots = SlotSet::of(&bindings);
        let outcome = self.continuations.register(token, bindings);

        let frame = HostFrame::Call {
            token,
            op: operation,
            script,
            slots,
        };
        if let Err(e) = self.sender.send(&frame) {
            self.continuations.forget(token);
            return Err(e);
        }

        self.latest_token.fetch_max(token, Ordering::SeqCst);
        debug!(token, operation = %operation, "Call submitted");

        Ok(PendingCall {
            token,
            outcome,
            timeout: self.config.call_timeout(),
            continuations: self.continuations.clone(),
        })
    }

    /// Ask the runtime to unwind the call in progress.
    ///
    /// Returns `false` if the runtime is not loaded, does not support
    /// cancellation, or is gone. Never fails.
    ///
    /// A call that completes successfully despite the request still
    /// delivers its result; compare tokens with
    /// [`latest_token`](Self::latest_token) to ignore superseded calls.
    pub fn cancel(&self) -> bool {
        request_cancel(self.registry.cancel_entry())
    }

    /// Token of the most recently submitted call.
    pub fn latest_token(&self) -> Option<CallToken> {
        match self.latest_token.load(Ordering::SeqCst) {
            0 => None,
            token => Some(token),
        }
    }

    /// Returns `true` if `token` belongs to the most recently submitted call.
    pub fn is_latest(&self, token: CallToken) -> bool {
        self.latest_token() == Some(token)
    }

    /// Number of calls still waiting for the worker.
    pub fn pending_calls(&self) -> usize {
        self.continuations.len()
    }

    /// Start polling readiness with the configured interval and timeout.
    pub fn readiness_poll(&self) -> ReadinessPoll {
        self.readiness_poll_with(self.config.poll_interval(), self.config.ready_timeout())
    }

    /// Start polling readiness with a caller-supplied interval and timeout.
    pub fn readiness_poll_with(&self, interval: Duration, timeout: Duration) -> ReadinessPoll {
        let registry = self.registry.clone();
        poll_until_ready(move || registry.is_loaded(), interval, timeout)
    }

    /// Wait until the runtime is ready.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::BootFailure`] if it is not ready within the
    /// configured timeout.
    pub async fn wait_ready(&self) -> Result<(), BridgeError> {
        self.readiness_poll().wait().await
    }

    /// Debounced readiness re-check.
    ///
    /// Bursts of requests collapse into one: `on_checked` of the last
    /// request runs with the readiness state once the debounce interval has
    /// passed without another request.
    pub fn request_readiness_check(&self, on_checked: impl FnOnce(bool) + Send + 'static) {
        let registry = self.registry.clone();
        self.debouncer.call(move || on_checked(registry.is_loaded()));
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// A call in progress runs to completion first. Afterwards `cancel`
    /// returns `false` and new calls fail with
    /// [`BridgeError::WorkerUnavailable`].
    pub async fn shutdown(&self) {
        if self.sender.send(&HostFrame::Shutdown).is_err() {
            debug!("Worker already gone");
        }

        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        let join = tokio::task::spawn_blocking(move || worker.join());
        match tokio::time::timeout(self.config.call_timeout(), join).await {
            Ok(Ok(Ok(()))) => info!(bridge_id = %self.id, "Worker shut down"),
            Ok(Ok(Err(_))) => warn!(bridge_id = %self.id, "Worker panicked"),
            Ok(Err(e)) => warn!(bridge_id = %self.id, error = %e, "Failed to join worker"),
            Err(_) => warn!(bridge_id = %self.id, "Worker did not stop in time"),
        }
    }
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("pending_calls", &self.pending_calls())
            .finish_non_exhaustive()
    }
}
