//! Error types for the playground bridge.
//!
//! This module defines a hierarchy of error types using `thiserror`:
//! - [`BridgeError`]: Top-level errors for loading, calling and polling the runtime
//! - [`HostFunctionError`]: Errors raised by host functions the runtime imports
//!
//! Only [`BridgeError`] values that describe *caller-side* failures are ever
//! returned to the UI. Failures inside the runtime are converted to a plain
//! [`Outcome::Failure`](crate::Outcome) before they cross the worker boundary.

use std::io;

use thiserror::Error;

/// Top-level bridge errors.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The runtime never became ready.
    ///
    /// Fatal: the bridge has no retry, the worker must be reloaded.
    #[error("Runtime failed to boot: {reason}")]
    BootFailure {
        /// Description of the boot failure.
        reason: String,
    },

    /// A call was issued before the runtime installed its entry points.
    #[error("Runtime is not ready")]
    NotReady,

    /// The runtime failed while executing a script.
    #[error("Execution failed: {message}")]
    ExecutionFailure {
        /// Message reported by the runtime.
        message: String,
    },

    /// The runtime reported a problem while checking a script.
    #[error("Validation warning: {message}")]
    ValidationWarning {
        /// Message reported by the runtime.
        message: String,
    },

    /// The cancellation signal could not be delivered.
    #[error("Cancellation failed: {reason}")]
    CancelFailure {
        /// Description of the failure.
        reason: String,
    },

    /// WebAssembly compilation or instantiation failed.
    #[error("Compilation failed: {reason}")]
    CompilationFailed {
        /// Description of the compilation failure.
        reason: String,
    },

    /// The runtime module could not be fetched.
    #[error("Failed to fetch module from {source_location}: {reason}")]
    FetchFailed {
        /// Path or URL the module was fetched from.
        source_location: String,
        /// Description of the failure.
        reason: String,
    },

    /// The runtime module does not provide a required export.
    #[error("Missing export: {name}")]
    MissingExport {
        /// Name of the missing export.
        name: String,
    },

    /// A call stayed silent longer than the configured timeout.
    #[error("Call timed out after {duration_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        duration_ms: u64,
    },

    /// The worker has stopped or crashed.
    #[error("Worker is unavailable")]
    WorkerUnavailable,

    /// A readiness poll was cancelled before it completed.
    #[error("Readiness poll cancelled")]
    PollCancelled,

    /// A transport frame could not be encoded or decoded.
    #[error("Transport error: {reason}")]
    Transport {
        /// Description of the codec failure.
        reason: String,
    },

    /// A host function returned an error.
    #[error("Host function error: {0}")]
    HostFunction(#[from] HostFunctionError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

/// Errors from host function implementations.
///
/// These errors occur when the runtime passes malformed arguments to one of
/// the host functions it imports.
#[derive(Error, Debug)]
pub enum HostFunctionError {
    /// The guest module does not export its linear memory.
    #[error("Guest memory export not found")]
    MemoryNotExported,

    /// A pointer/length pair is outside of guest memory.
    #[error("Guest memory access out of bounds: {ptr}+{len}")]
    OutOfBounds {
        /// Guest pointer.
        ptr: i64,
        /// Length in bytes.
        len: i64,
    },

    /// Invalid argument was passed to a host function.
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// Description of why the argument was invalid.
        reason: String,
    },
}

impl BridgeError {
    /// Create a new `BootFailure` error.
    pub fn boot_failure(reason: impl Into<String>) -> Self {
        Self::BootFailure {
            reason: reason.into(),
        }
    }

    /// Create a new `CancelFailure` error.
    pub fn cancel_failure(reason: impl Into<String>) -> Self {
        Self::CancelFailure {
            reason: reason.into(),
        }
    }

    /// Create a new `CompilationFailed` error.
    pub fn compilation_failed(reason: impl Into<String>) -> Self {
        Self::CompilationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `FetchFailed` error.
    pub fn fetch_failed(source_location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FetchFailed {
            source_location: source_location.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `MissingExport` error.
    pub fn missing_export(name: impl Into<String>) -> Self {
        Self::MissingExport { name: name.into() }
    }

    /// Create a new `Transport` error.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if no further call can succeed without reloading the worker.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::BootFailure { .. }
                | Self::CompilationFailed { .. }
                | Self::FetchFailed { .. }
                | Self::MissingExport { .. }
                | Self::WorkerUnavailable
        )
    }

    /// Returns `true` if the caller may simply issue another call.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ExecutionFailure { .. }
                | Self::ValidationWarning { .. }
                | Self::NotReady
                | Self::Timeout { .. }
        )
    }
}
