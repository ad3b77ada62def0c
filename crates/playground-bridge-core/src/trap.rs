//! Turning runtime errors into plain messages.
//!
//! A runtime "throws" either by trapping or by calling the `env.throw` host
//! function, which fails with a [`GuestThrow`]. Both reach the facade as a
//! [`wasmtime::Error`] that may carry backtrace context; [`describe`] digs out
//! the message the runtime meant.

use wasmtime::Trap;
use wasmtime_wasi::I32Exit;

use playground_bridge_common::UNKNOWN_FAILURE;

/// Error raised by the `env.throw` host function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestThrow {
    message: String,
}

impl GuestThrow {
    /// Create a throw carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The thrown message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for GuestThrow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GuestThrow {}

/// Describe a runtime error as a non-empty message.
pub fn describe(error: &wasmtime::Error) -> String {
    let message = if let Some(thrown) = error.downcast_ref::<GuestThrow>() {
        thrown.message().to_string()
    } else if let Some(exit) = error.downcast_ref::<I32Exit>() {
        format!("runtime exited with status {}", exit.0)
    } else if let Some(trap) = error.downcast_ref::<Trap>() {
        trap.to_string()
    } else {
        error.root_cause().to_string()
    };

    if message.trim().is_empty() {
        UNKNOWN_FAILURE.to_string()
    } else {
        message
    }
}

/// Trap code of an error, if it is a wasm trap.
pub fn trap_code(error: &wasmtime::Error) -> Option<String> {
    error.downcast_ref::<Trap>().map(|trap| format!("{trap:?}"))
}

/// Check if an error is due to fuel exhaustion.
pub fn is_out_of_fuel(error: &wasmtime::Error) -> bool {
    error
        .downcast_ref::<Trap>()
        .is_some_and(|trap| *trap == Trap::OutOfFuel)
}
