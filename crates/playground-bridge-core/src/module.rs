//! WebAssembly module compilation.
//!
//! This module provides [`CompiledModule`], a wrapper around Wasmtime's
//! [`Module`] holding the compiled playground runtime plus the metadata the
//! loader logs and inspects (content hash, cancellation support).

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Instant;

use tracing::{info, instrument};
use wasmtime::{Engine, ExternType, Module};

use playground_bridge_common::BridgeError;

/// Import module of every bridge host function.
pub const HOST_MODULE: &str = "env";

/// Host import whose presence marks a runtime as cancellable.
pub const CANCEL_IMPORT: &str = "cancel_requested";

/// A compiled runtime module.
///
/// `CompiledModule` is cheap to clone; the underlying Wasmtime module is
/// reference counted.
#[derive(Clone)]
pub struct CompiledModule {
    module: Module,

    /// Hash of the original Wasm bytes (or WAT text).
    content_hash: String,
}

impl CompiledModule {
    /// Compile a core module from WebAssembly bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid Wasm binary.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, BridgeError> {
        let start = Instant::now();

        Self::validate_wasm_header(bytes)?;

        let module = Module::new(engine, bytes).map_err(|e| {
            BridgeError::compilation_failed(format!("Core module compilation failed: {e}"))
        })?;

        let content_hash = compute_hash(bytes);

        info!(
            content_hash = %content_hash,
            duration_ms = start.elapsed().as_millis(),
            "Runtime module compiled"
        );

        Ok(Self {
            module,
            content_hash,
        })
    }

    /// Compile a core module from WAT (WebAssembly Text Format).
    ///
    /// This is primarily for testing purposes.
    #[instrument(skip(engine, wat))]
    pub fn from_wat(engine: &Engine, wat: &str) -> Result<Self, BridgeError> {
        let start = Instant::now();

        let module = Module::new(engine, wat).map_err(|e| {
            BridgeError::compilation_failed(format!("WAT compilation failed: {e}"))
        })?;

        let content_hash = compute_hash(wat.as_bytes());

        info!(
            content_hash = %content_hash,
            duration_ms = start.elapsed().as_millis(),
            "WAT module compiled"
        );

        Ok(Self {
            module,
            content_hash,
        })
    }

    /// Get the inner Wasmtime module.
    pub fn inner(&self) -> &Module {
        &self.module
    }

    /// Get the content hash of the original module source.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Returns `true` if the module imports the given host function.
    pub fn imports_host_function(&self, name: &str) -> bool {
        self.module.imports().any(|import| {
            import.module() == HOST_MODULE
                && import.name() == name
                && matches!(import.ty(), ExternType::Func(_))
        })
    }

    /// Returns `true` if the runtime observes the cooperative cancellation flag.
    pub fn supports_cancellation(&self) -> bool {
        self.imports_host_function(CANCEL_IMPORT)
    }

    /// Returns `true` if the module exports a function with the given name.
    pub fn exports_function(&self, name: &str) -> bool {
        self.module
            .get_export(name)
            .is_some_and(|ty| matches!(ty, ExternType::Func(_)))
    }

    /// Validate WebAssembly header (magic number).
    fn validate_wasm_header(bytes: &[u8]) -> Result<(), BridgeError> {
        if bytes.len() < 8 {
            return Err(BridgeError::compilation_failed(
                "Invalid Wasm: file too small",
            ));
        }

        // Check magic number: \0asm
        if &bytes[0..4] != b"\0asm" {
            return Err(BridgeError::compilation_failed(
                "Invalid Wasm: bad magic number",
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("content_hash", &self.content_hash)
            .field("supports_cancellation", &self.supports_cancellation())
            .finish_non_exhaustive()
    }
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
