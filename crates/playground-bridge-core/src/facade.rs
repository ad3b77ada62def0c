//! The execution facade: `run`, `check` and `cancel` behind one outcome type.
//!
//! Whatever the runtime does (completes, throws, traps, returns an error
//! object), the caller gets an [`Outcome`], and the matching callback slot
//! sees the failure exactly once. Callbacks the runtime itself invoked before
//! failing are left as they are.

use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::bindings::{Bindings, ExecutionRequest};
use crate::cancel::CancelEntry;
use crate::handle::RuntimeHandle;
use crate::trap;
use playground_bridge_common::{CallbackSlot, Operation, Outcome, UNKNOWN_FAILURE};

/// Message reported by `check` for an empty script.
pub const EMPTY_SCRIPT: &str = "empty script";

/// Field of an error-shaped return value carrying the message.
const RETURNED_ERROR_FIELD: &str = "error";

/// Uniform entry to the installed runtime.
#[derive(Debug)]
pub struct ExecutionFacade {
    handle: RuntimeHandle,
    calls: u64,
}

impl ExecutionFacade {
    /// Wrap an installed runtime.
    pub fn new(handle: RuntimeHandle) -> Self {
        Self { handle, calls: 0 }
    }

    /// Execute a script.
    pub fn run(&mut self, request: ExecutionRequest) -> Outcome {
        self.execute(Operation::Run, request)
    }

    /// Validate a script without executing it.
    ///
    /// An empty script is reported as a warning without entering the runtime.
    pub fn check(&mut self, request: ExecutionRequest) -> Outcome {
        self.execute(Operation::Check, request)
    }

    /// Invoke `operation` and normalize whatever happens into an [`Outcome`].
    #[instrument(skip(self, request), fields(operation = %operation, script_len = request.script.len()))]
    pub fn execute(&mut self, operation: Operation, request: ExecutionRequest) -> Outcome {
        let ExecutionRequest {
            script,
            mut bindings,
        } = request;
        let slot = operation.slot();

        if operation == Operation::Check && script.is_empty() {
            debug!("Empty script, skipping runtime");
            let outcome = Outcome::failure(EMPTY_SCRIPT);
            deliver_failure(&mut bindings, slot, EMPTY_SCRIPT);
            return outcome;
        }

        self.calls += 1;
        let call_id = format!("{operation}-{}", self.calls);

        if let Err(e) = self.handle.begin_call(call_id.clone(), bindings) {
            let report = self.handle.end_call();
            let mut bindings = report.bindings;
            let message = e.to_string();
            deliver_failure(&mut bindings, slot, &message);
            return Outcome::failure(message);
        }

        let result = self.handle.invoke(operation, &script);
        let report = self.handle.end_call();
        let mut bindings = report.bindings;
        let duration = report.duration;

        let outcome = match result {
            Ok(None) => Outcome::Success,
            Ok(Some(returned)) => match returned_error(&returned) {
                Some(message) => Outcome::failure(message),
                None => Outcome::Success,
            },
            Err(e) => {
                if trap::is_out_of_fuel(&e) {
                    warn!(call_id = %call_id, "Execution terminated: fuel exhausted");
                }
                debug!(
                    call_id = %call_id,
                    trap_code = ?trap::trap_code(&e),
                    error = %e,
                    "Runtime threw"
                );
                Outcome::failure(trap::describe(&e))
            }
        };

        for entry in &report.logs {
            debug!(call_id = %call_id, level = %entry.level, message = %entry.message, "Runtime log");
        }

        match &outcome {
            Outcome::Success => info!(
                call_id = %call_id,
                duration_ms = duration.as_millis(),
                fuel_consumed = report.fuel_consumed,
                logs = report.logs.len(),
                "Call completed"
            ),
            Outcome::Failure { message } => {
                info!(
                    call_id = %call_id,
                    duration_ms = duration.as_millis(),
                    fuel_consumed = report.fuel_consumed,
                    message = %message,
                    "Call failed"
                );
                deliver_failure(&mut bindings, slot, message);
            }
        }

        outcome
    }

    /// The runtime's cancellation entry, if it has one.
    pub fn cancel_entry(&self) -> Option<&CancelEntry> {
        self.handle.cancel_entry()
    }

    /// Ask the runtime to unwind the current call.
    pub fn cancel(&self) -> bool {
        request_cancel(self.cancel_entry())
    }

    /// The installed runtime.
    pub fn handle(&self) -> &RuntimeHandle {
        &self.handle
    }
}

/// Request cancellation through an entry, if there is one.
///
/// Returns `true` only if the request was made. Never fails: a missing entry
/// or a torn-down runtime is logged and reported as `false`.
pub fn request_cancel(entry: Option<&CancelEntry>) -> bool {
    let Some(entry) = entry else {
        warn!("Cancellation is not supported by the loaded runtime");
        return false;
    };

    match entry.request() {
        Ok(()) => {
            info!("Cancellation requested");
            true
        }
        Err(e) => {
            error!(error = %e, "Cancellation request failed");
            false
        }
    }
}

/// Hand a failure to the slot's callback, or log it if the slot is empty.
fn deliver_failure(bindings: &mut Bindings, slot: CallbackSlot, message: &str) {
    if !bindings.invoke(slot, slot.failure_payload(message)) {
        warn!(slot = %slot.binding_name(), message = %message, "No callback bound; failure dropped");
    }
}

/// Extract the message of an error-shaped return value.
///
/// `None` means the value carried no error. A value that is not a JSON
/// object is itself reported as an error.
fn returned_error(bytes: &[u8]) -> Option<String> {
    let value: Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(e) => return Some(format!("internal error: malformed return value: {e}")),
    };

    match value.get(RETURNED_ERROR_FIELD) {
        None | Some(Value::Null) => None,
        Some(Value::String(message)) if message.trim().is_empty() => None,
        Some(Value::String(message)) => Some(format!("internal error: {message}")),
        Some(_) => Some(format!("internal error: {UNKNOWN_FAILURE}")),
    }
}
