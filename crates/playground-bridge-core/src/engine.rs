//! Wasmtime engine configuration and creation.
//!
//! The [`WasmEngine`] compiles the playground runtime. Calls into the
//! runtime block the worker thread that owns it, so the engine is built
//! without async support.

use std::sync::Arc;

use tracing::{debug, info};
use wasmtime::{Config, Engine, OptLevel};

use playground_bridge_common::{BridgeError, EngineConfig};

/// Thread-safe WebAssembly engine wrapper.
///
/// The engine holds no per-call state and may be cloned freely; the loader
/// hands a clone to the worker thread it spawns.
///
/// # Example
///
/// ```ignore
/// use playground_bridge_common::EngineConfig;
/// use playground_bridge_core::WasmEngine;
///
/// let engine = WasmEngine::new(&EngineConfig::default())?;
/// ```
#[derive(Clone)]
pub struct WasmEngine {
    engine: Arc<Engine>,
    config: EngineConfig,
}

impl WasmEngine {
    /// Create a new WebAssembly engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime configuration is invalid.
    pub fn new(config: &EngineConfig) -> Result<Self, BridgeError> {
        let mut wasmtime_config = Config::new();

        // Entry points are called synchronously from the worker thread
        wasmtime_config.async_support(false);

        wasmtime_config.consume_fuel(config.fuel_metering);
        wasmtime_config.wasm_backtrace(config.wasm_backtrace);

        if config.optimize {
            wasmtime_config.cranelift_opt_level(OptLevel::Speed);
        } else {
            wasmtime_config.cranelift_opt_level(OptLevel::None);
        }

        debug!(
            fuel_metering = config.fuel_metering,
            wasm_backtrace = config.wasm_backtrace,
            optimize = config.optimize,
            "Engine configured"
        );

        let engine = Engine::new(&wasmtime_config).map_err(|e| {
            BridgeError::invalid_config(format!("Failed to create Wasmtime engine: {e}"))
        })?;

        info!("Wasmtime engine initialized");

        Ok(Self {
            engine: Arc::new(engine),
            config: config.clone(),
        })
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Check if fuel metering is enabled.
    pub fn is_fuel_enabled(&self) -> bool {
        self.config.fuel_metering
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("fuel_metering", &self.config.fuel_metering)
            .field("optimize", &self.config.optimize)
            .finish_non_exhaustive()
    }
}
