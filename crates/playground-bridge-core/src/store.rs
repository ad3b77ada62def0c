//! Runtime context and store management.
//!
//! This module provides:
//! - [`RuntimeContext`]: State reachable from host functions while the
//!   runtime executes
//! - [`LogEntry`] and [`LogLevel`]: Diagnostics emitted by the runtime
//!
//! Unlike a per-request store, one store lives as long as the worker: the
//! runtime keeps its own state between calls. Per-call pieces (bindings,
//! logs) are swapped in and out by the facade.

use wasmtime::{Store, StoreLimits, StoreLimitsBuilder};
use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::preview1::WasiP1Ctx;

use crate::WasmEngine;
use crate::bindings::Bindings;
use crate::cancel::CancelFlag;
use playground_bridge_common::{BridgeError, ExecutionConfig};

/// State owned by the runtime's store.
///
/// Host functions reach it through [`wasmtime::Caller::data_mut`].
pub struct RuntimeContext {
    /// WASI preview1 context (clocks, random, stdio).
    wasi: WasiP1Ctx,

    /// Memory limits enforced by the store.
    limits: StoreLimits,

    /// Bindings of the call in progress, if any.
    pub bindings: Option<Bindings>,

    /// Cooperative cancellation flag.
    pub cancel: CancelFlag,

    /// Identifier of the call in progress, for tracing.
    pub call_id: Option<String>,

    /// Logs collected from the runtime during the current call.
    pub logs: Vec<LogEntry>,
}

/// A single log entry from the runtime.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log level (debug, info, warn, error).
    pub level: LogLevel,

    /// Log message content.
    pub message: String,
}

/// Log level for runtime logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug-level messages.
    Debug,
    /// Informational messages.
    Info,
    /// Warning messages.
    Warn,
    /// Error messages.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl RuntimeContext {
    /// Create a new runtime context.
    pub fn new(config: &ExecutionConfig) -> Self {
        let mut wasi = WasiCtxBuilder::new();
        if config.inherit_stdio {
            wasi.inherit_stdio();
        }

        Self {
            wasi: wasi.build_p1(),
            limits: StoreLimitsBuilder::new()
                .memory_size(config.max_memory_bytes())
                .build(),
            bindings: None,
            cancel: CancelFlag::new(),
            call_id: None,
            logs: Vec::new(),
        }
    }

    /// WASI preview1 context, for linking the WASI shims.
    pub fn wasi_mut(&mut self) -> &mut WasiP1Ctx {
        &mut self.wasi
    }

    /// Add a log entry.
    pub fn log(&mut self, level: LogLevel, message: String) {
        self.logs.push(LogEntry { level, message });
    }

    /// Call identifier for log fields.
    pub fn call_id(&self) -> &str {
        self.call_id.as_deref().unwrap_or("boot")
    }
}

/// Create the runtime's store.
///
/// # Errors
///
/// Returns an error if fuel cannot be set on the store.
pub fn create_store(
    engine: &WasmEngine,
    config: &ExecutionConfig,
) -> Result<Store<RuntimeContext>, BridgeError> {
    let mut store = Store::new(engine.inner(), RuntimeContext::new(config));
    store.limiter(|ctx| &mut ctx.limits);

    // Boot (entry routine) runs on the first tank of fuel
    if engine.is_fuel_enabled() {
        refuel(&mut store, config.max_fuel)?;
    }

    Ok(store)
}

/// Reset the fuel of a store before a call.
pub fn refuel(store: &mut Store<RuntimeContext>, fuel: u64) -> Result<(), BridgeError> {
    store
        .set_fuel(fuel)
        .map_err(|e| BridgeError::invalid_config(format!("Failed to set fuel: {e}")))
}

/// Get remaining fuel from a store.
pub fn get_remaining_fuel(store: &Store<RuntimeContext>) -> Option<u64> {
    store.get_fuel().ok()
}

/// Calculate fuel consumed.
pub fn calculate_fuel_consumed(initial_fuel: u64, store: &Store<RuntimeContext>) -> u64 {
    let remaining = get_remaining_fuel(store).unwrap_or(0);
    initial_fuel.saturating_sub(remaining)
}
