//! Configuration structures for the playground bridge.
//!
//! This module defines configuration options for the bridge components:
//! - [`RuntimeConfig`]: Top-level configuration containing all settings
//! - [`EngineConfig`]: Wasmtime engine settings (optimization, backtraces, fuel)
//! - [`ExecutionConfig`]: Per-call execution limits (fuel, memory, stdio)
//! - [`BridgeConfig`]: Host-side timing (readiness polling, call timeout, debounce)

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level runtime configuration.
///
/// This structure contains all configuration options for the bridge.
/// It is usually loaded as the `[runtime]` table of a TOML config file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-call execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Host-side bridge configuration.
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// Wasmtime engine configuration.
///
/// These settings apply to the engine that compiles the playground runtime.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Compile with Cranelift speed optimizations.
    #[serde(default = "defaults::optimize")]
    pub optimize: bool,

    /// Capture wasm backtraces on traps.
    #[serde(default = "defaults::wasm_backtrace")]
    pub wasm_backtrace: bool,

    /// Enable fuel metering.
    ///
    /// When enabled, each call is refueled with
    /// [`ExecutionConfig::max_fuel`] before the entry point runs.
    #[serde(default)]
    pub fuel_metering: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            optimize: defaults::optimize(),
            wasm_backtrace: defaults::wasm_backtrace(),
            fuel_metering: false,
        }
    }
}

/// Per-call execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Fuel granted to each `run`/`check` call.
    ///
    /// Only effective when [`EngineConfig::fuel_metering`] is enabled.
    #[serde(default = "defaults::max_fuel")]
    pub max_fuel: u64,

    /// Maximum linear memory of the runtime in megabytes.
    #[serde(default = "defaults::max_memory_mb")]
    pub max_memory_mb: u32,

    /// Forward the runtime's stdout/stderr to the host process.
    #[serde(default = "defaults::inherit_stdio")]
    pub inherit_stdio: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_fuel: defaults::max_fuel(),
            max_memory_mb: defaults::max_memory_mb(),
            inherit_stdio: defaults::inherit_stdio(),
        }
    }
}

impl ExecutionConfig {
    /// Get the memory limit in bytes.
    pub fn max_memory_bytes(&self) -> usize {
        (self.max_memory_mb as usize) * 1024 * 1024
    }
}

/// Host-side bridge configuration.
///
/// None of these values are enforced inside the worker; they drive the
/// readiness polling and the bounded waits of the host adapter.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Interval between readiness polls in milliseconds.
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long to wait for the runtime to become ready before reporting
    /// a boot failure.
    #[serde(default = "defaults::ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    /// How long a call may stay silent before it is reported as timed out.
    #[serde(default = "defaults::call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Wait window of the debounced readiness re-check.
    #[serde(default = "defaults::debounce_ms")]
    pub debounce_ms: u64,

    /// Maximum size of a fetched runtime module in megabytes.
    #[serde(default = "defaults::max_module_mb")]
    pub max_module_mb: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::poll_interval_ms(),
            ready_timeout_ms: defaults::ready_timeout_ms(),
            call_timeout_ms: defaults::call_timeout_ms(),
            debounce_ms: defaults::debounce_ms(),
            max_module_mb: defaults::max_module_mb(),
        }
    }
}

impl BridgeConfig {
    /// Get the readiness poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get the readiness timeout as a `Duration`.
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Get the call timeout as a `Duration`.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Get the debounce wait window as a `Duration`.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Get the module size limit in bytes.
    pub fn max_module_bytes(&self) -> usize {
        (self.max_module_mb as usize) * 1024 * 1024
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn optimize() -> bool {
        true
    }

    pub const fn wasm_backtrace() -> bool {
        true
    }

    pub const fn max_fuel() -> u64 {
        10_000_000_000
    }

    pub const fn max_memory_mb() -> u32 {
        256
    }

    pub const fn inherit_stdio() -> bool {
        true
    }

    pub const fn poll_interval_ms() -> u64 {
        50
    }

    pub const fn ready_timeout_ms() -> u64 {
        10_000
    }

    pub const fn call_timeout_ms() -> u64 {
        30_000
    }

    pub const fn debounce_ms() -> u64 {
        100
    }

    pub const fn max_module_mb() -> u32 {
        64
    }
}
