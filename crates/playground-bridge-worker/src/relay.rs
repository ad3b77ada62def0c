//! Continuation registry on the host side.
//!
//! Every call registers its bindings under its token. The relay task feeds
//! worker frames into the registry: callbacks go to the bindings of their
//! token, `Finished` completes the call and drops its continuation.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::protocol::{CallToken, WorkerFrame};
use crate::transport::FrameReceiver;
use playground_bridge_common::Outcome;
use playground_bridge_core::Bindings;

struct Continuation {
    bindings: Arc<Mutex<Bindings>>,
    done: oneshot::Sender<Outcome>,
}

/// Pending calls keyed by token.
#[derive(Clone, Default)]
pub struct Continuations {
    entries: Arc<DashMap<CallToken, Continuation>>,
}

impl Continuations {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the bindings of a call.
    ///
    /// The returned receiver resolves with the call's outcome, or errors if
    /// the continuation is dropped without one.
    pub fn register(&self, token: CallToken, bindings: Bindings) -> oneshot::Receiver<Outcome> {
        let (done, outcome) = oneshot::channel();
        self.entries.insert(
            token,
            Continuation {
                bindings: Arc::new(Mutex::new(bindings)),
                done,
            },
        );
        outcome
    }

    /// Drop a continuation without completing it.
    pub fn forget(&self, token: CallToken) -> bool {
        self.entries.remove(&token).is_some()
    }

    /// Number of pending calls.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no call is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every continuation. Their waiters observe the worker as gone.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Route one frame from the worker.
    pub fn dispatch(&self, frame: WorkerFrame) {
        match frame {
            WorkerFrame::Callback {
                token,
                slot,
                payload,
            } => {
                // Clone out of the map so no shard lock is held while user code runs
                let bindings = self.entries.get(&token).map(|c| c.bindings.clone());
                match bindings {
                    Some(bindings) => {
                        if !bindings.lock().invoke(slot, payload) {
                            warn!(token, slot = slot.binding_name(), "Callback for unbound slot");
                        }
                    }
                    None => debug!(token, "Callback for unknown call"),
                }
            }
            WorkerFrame::Finished { token, outcome } => match self.entries.remove(&token) {
                Some((_, continuation)) => {
                    // The waiter may have timed out already
                    let _ = continuation.done.send(outcome);
                }
                None => debug!(token, "Completion for unknown call"),
            },
        }
    }
}

impl std::fmt::Debug for Continuations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Continuations")
            .field("pending", &self.entries.len())
            .finish()
    }
}

/// Feed worker frames into `continuations` until the worker goes away.
pub async fn relay(mut receiver: FrameReceiver<WorkerFrame>, continuations: Continuations) {
    while let Some(frame) = receiver.recv().await {
        match frame {
            Ok(frame) => continuations.dispatch(frame),
            Err(e) => warn!(error = %e, "Dropping malformed worker frame"),
        }
    }

    debug!(pending = continuations.len(), "Worker channel closed");
    continuations.clear();
}
