//! Frames exchanged between the host adapter and the worker.
//!
//! Host to worker: [`HostFrame::Call`] and [`HostFrame::Shutdown`].
//! Worker to host: zero or more [`WorkerFrame::Callback`] per call, then
//! exactly one [`WorkerFrame::Finished`].
//!
//! Cancellation is not a frame: the worker is blocked inside the runtime
//! while a call runs, so it could not read one.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use playground_bridge_common::{CallbackSlot, Operation, Outcome};
use playground_bridge_core::Bindings;

/// Correlation token of a call, assigned by the host adapter.
///
/// Tokens increase monotonically per adapter, starting at 1.
pub type CallToken = u64;

/// Which callback slots the caller bound.
///
/// The worker only relays invocations of bound slots; an unbound slot stays
/// unbound on the worker side too.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSet {
    /// `resultCallback` is bound.
    pub result: bool,
    /// `checkCallback` is bound.
    pub check: bool,
}

impl SlotSet {
    /// Slots bound in `bindings`.
    pub fn of(bindings: &Bindings) -> Self {
        Self {
            result: bindings.has(CallbackSlot::Result),
            check: bindings.has(CallbackSlot::Check),
        }
    }

    /// Returns `true` if `slot` is bound.
    pub fn contains(self, slot: CallbackSlot) -> bool {
        match slot {
            CallbackSlot::Result => self.result,
            CallbackSlot::Check => self.check,
        }
    }
}

/// Frames sent by the host adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostFrame {
    /// Execute `op` on `script`.
    Call {
        /// Correlation token.
        token: CallToken,
        /// Operation to invoke.
        op: Operation,
        /// Script text.
        script: String,
        /// Bound callback slots.
        slots: SlotSet,
    },
    /// Stop serving and tear down the runtime.
    Shutdown,
}

/// Frames sent by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerFrame {
    /// A callback slot was invoked.
    Callback {
        /// Token of the call the callback belongs to.
        token: CallToken,
        /// Invoked slot.
        slot: CallbackSlot,
        /// Payload passed to the slot.
        payload: Value,
    },
    /// The call completed. Always the last frame of its call.
    Finished {
        /// Token of the completed call.
        token: CallToken,
        /// Normalized outcome.
        outcome: Outcome,
    },
}

impl WorkerFrame {
    /// Token of the call this frame belongs to.
    pub fn token(&self) -> CallToken {
        match self {
            WorkerFrame::Callback { token, .. } | WorkerFrame::Finished { token, .. } => *token,
        }
    }
}
