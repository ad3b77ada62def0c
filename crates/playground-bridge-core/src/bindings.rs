//! Per-call bindings and execution requests.
//!
//! [`Bindings`] carry the callback slots the runtime invokes during one call.
//! They are moved into the store for the duration of the call and handed back
//! afterwards; the bridge never keeps them.

use serde_json::Value;

use playground_bridge_common::CallbackSlot;

/// A callback slot implementation.
///
/// Invoked with the JSON payload the runtime (or the bridge, for synthesized
/// failures) delivers. May be invoked zero or more times per call.
pub type Callback = Box<dyn FnMut(Value) + Send + 'static>;

/// Callback slots of a single call.
#[derive(Default)]
pub struct Bindings {
    result_callback: Option<Callback>,
    check_callback: Option<Callback>,
}

impl Bindings {
    /// Create bindings with no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `resultCallback` slot.
    #[must_use]
    pub fn with_result_callback(mut self, callback: impl FnMut(Value) + Send + 'static) -> Self {
        self.result_callback = Some(Box::new(callback));
        self
    }

    /// Set the `checkCallback` slot.
    #[must_use]
    pub fn with_check_callback(mut self, callback: impl FnMut(Value) + Send + 'static) -> Self {
        self.check_callback = Some(Box::new(callback));
        self
    }

    /// Install a boxed callback into the given slot.
    pub fn set(&mut self, slot: CallbackSlot, callback: Callback) {
        *self.slot_mut(slot) = Some(callback);
    }

    /// Returns `true` if the slot holds a callback.
    pub fn has(&self, slot: CallbackSlot) -> bool {
        match slot {
            CallbackSlot::Result => self.result_callback.is_some(),
            CallbackSlot::Check => self.check_callback.is_some(),
        }
    }

    /// Invoke the callback in `slot`.
    ///
    /// Returns `false` if the slot is empty and the payload went nowhere.
    pub fn invoke(&mut self, slot: CallbackSlot, payload: Value) -> bool {
        match self.slot_mut(slot) {
            Some(callback) => {
                callback(payload);
                true
            }
            None => false,
        }
    }

    fn slot_mut(&mut self, slot: CallbackSlot) -> &mut Option<Callback> {
        match slot {
            CallbackSlot::Result => &mut self.result_callback,
            CallbackSlot::Check => &mut self.check_callback,
        }
    }
}

impl std::fmt::Debug for Bindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bindings")
            .field("result_callback", &self.result_callback.is_some())
            .field("check_callback", &self.check_callback.is_some())
            .finish()
    }
}

/// A script plus the bindings of one call.
#[derive(Debug)]
pub struct ExecutionRequest {
    /// Script source handed to the runtime.
    pub script: String,

    /// Callback slots for this call.
    pub bindings: Bindings,
}

impl ExecutionRequest {
    /// Create a request.
    pub fn new(script: impl Into<String>, bindings: Bindings) -> Self {
        Self {
            script: script.into(),
            bindings,
        }
    }
}
