//! Callback host functions.
//!
//! `env.result_callback` and `env.check_callback` hand a JSON payload to the
//! matching slot of the bindings installed for the current call.

use serde_json::Value;
use tracing::warn;

use playground_bridge_common::{CallbackSlot, HostFunctionError};
use playground_bridge_core::store::RuntimeContext;

/// Host implementation of the callback imports.
pub struct CallbackHost;

impl CallbackHost {
    /// Import name of a slot.
    pub fn import_name(slot: CallbackSlot) -> &'static str {
        match slot {
            CallbackSlot::Result => "result_callback",
            CallbackSlot::Check => "check_callback",
        }
    }

    /// Decode a payload as written by the runtime.
    ///
    /// An empty buffer is `null`.
    ///
    /// # Errors
    ///
    /// Returns [`HostFunctionError::InvalidArgument`] if the bytes are not JSON.
    pub fn decode(bytes: &[u8]) -> Result<Value, HostFunctionError> {
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(bytes).map_err(|e| HostFunctionError::InvalidArgument {
            reason: format!("callback payload is not JSON: {e}"),
        })
    }

    /// Deliver a payload to the slot of the current call.
    ///
    /// Returns `false` if no call is in progress or the slot is unbound.
    pub fn deliver(ctx: &mut RuntimeContext, slot: CallbackSlot, payload: Value) -> bool {
        let call_id = ctx.call_id().to_string();
        let delivered = ctx
            .bindings
            .as_mut()
            .is_some_and(|bindings| bindings.invoke(slot, payload));

        if !delivered {
            warn!(call_id, slot = slot.binding_name(), "Runtime invoked an unbound callback");
        }
        delivered
    }
}
