//! Normalized call outcomes and callback slots.
//!
//! Everything in this module crosses the worker boundary, so every type is
//! plain serializable data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::BridgeError;

/// Message used when the runtime fails without saying why.
pub const UNKNOWN_FAILURE: &str = "unknown runtime error";

/// The operation a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Execute a script.
    Run,
    /// Validate a script without executing it.
    Check,
}

impl Operation {
    /// Name of the runtime export implementing this operation.
    pub fn export_name(self) -> &'static str {
        match self {
            Operation::Run => "run",
            Operation::Check => "check",
        }
    }

    /// Callback slot this operation delivers its outcome through.
    pub fn slot(self) -> CallbackSlot {
        match self {
            Operation::Run => CallbackSlot::Result,
            Operation::Check => CallbackSlot::Check,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.export_name())
    }
}

/// A callback slot in the bindings of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackSlot {
    /// `resultCallback`, used by `run`.
    Result,
    /// `checkCallback`, used by `check`.
    Check,
}

impl CallbackSlot {
    /// Conventional binding name of the slot.
    pub fn binding_name(self) -> &'static str {
        match self {
            CallbackSlot::Result => "resultCallback",
            CallbackSlot::Check => "checkCallback",
        }
    }

    /// Key carrying the failure message in a synthesized payload.
    pub fn failure_key(self) -> &'static str {
        match self {
            CallbackSlot::Result => "error",
            CallbackSlot::Check => "warning",
        }
    }

    /// Payload delivered to this slot when the bridge synthesizes a failure.
    pub fn failure_payload(self, message: &str) -> Value {
        let mut payload = Map::new();
        payload.insert(
            self.failure_key().to_string(),
            Value::String(message.to_string()),
        );
        Value::Object(payload)
    }
}

impl std::fmt::Display for CallbackSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.binding_name())
    }
}

/// Normalized result of a single `run` or `check` call.
///
/// `Success` carries nothing: whatever the runtime produced has already been
/// delivered through the callback slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The runtime delivered its own result.
    Success,
    /// The call failed; the bridge delivered a synthesized failure.
    Failure {
        /// Non-empty description of the failure.
        message: String,
    },
}

impl Outcome {
    /// Create a failure, substituting [`UNKNOWN_FAILURE`] for blank messages.
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            UNKNOWN_FAILURE.to_string()
        } else {
            message
        };
        Self::Failure { message }
    }

    /// Returns `true` if the call succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    /// Returns `true` if the call failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure { .. })
    }

    /// Failure message, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Outcome::Success => None,
            Outcome::Failure { message } => Some(message),
        }
    }

    /// Convert into the error taxonomy of the given operation.
    ///
    /// A failed `run` is an execution failure, a failed `check` is a
    /// validation warning.
    pub fn into_result(self, operation: Operation) -> Result<(), BridgeError> {
        match (self, operation) {
            (Outcome::Success, _) => Ok(()),
            (Outcome::Failure { message }, Operation::Run) => {
                Err(BridgeError::ExecutionFailure { message })
            }
            (Outcome::Failure { message }, Operation::Check) => {
                Err(BridgeError::ValidationWarning { message })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_never_blank() {
        assert_eq!(Outcome::failure("").message(), Some(UNKNOWN_FAILURE));
        assert_eq!(Outcome::failure("  ").message(), Some(UNKNOWN_FAILURE));
        assert_eq!(Outcome::failure("boom").message(), Some("boom"));
    }

    #[test]
    fn test_failure_payload() {
        assert_eq!(
            CallbackSlot::Result.failure_payload("boom"),
            json!({"error": "boom"})
        );
        assert_eq!(
            CallbackSlot::Check.failure_payload("unexpected token"),
            json!({"warning": "unexpected token"})
        );
    }

    #[test]
    fn test_operation_slots() {
        assert_eq!(Operation::Run.slot(), CallbackSlot::Result);
        assert_eq!(Operation::Check.slot(), CallbackSlot::Check);
        assert_eq!(Operation::Run.export_name(), "run");
        assert_eq!(CallbackSlot::Check.to_string(), "checkCallback");
    }

    #[test]
    fn test_outcome_wire_shape() {
        let json = serde_json::to_value(Outcome::failure("boom")).unwrap();
        assert_eq!(json, json!({"status": "failure", "message": "boom"}));

        let json = serde_json::to_value(Outcome::Success).unwrap();
        assert_eq!(json, json!({"status": "success"}));
    }

    #[test]
    fn test_into_result() {
        assert!(Outcome::Success.into_result(Operation::Run).is_ok());
        assert!(matches!(
            Outcome::failure("x").into_result(Operation::Run),
            Err(BridgeError::ExecutionFailure { .. })
        ));
        assert!(matches!(
            Outcome::failure("x").into_result(Operation::Check),
            Err(BridgeError::ValidationWarning { .. })
        ));
    }
}
