//! Core Wasmtime runtime for the playground bridge.
//!
//! This crate owns everything that touches the runtime directly:
//! - [`WasmEngine`]: Configured Wasmtime engine
//! - [`CompiledModule`]: The compiled runtime module
//! - [`RuntimeContext`]: Store state reachable from host functions
//! - [`RuntimeHandle`]: The installed runtime and its entry points
//! - [`ExecutionFacade`]: `run`/`check`/`cancel` with normalized outcomes
//! - [`EntryRegistry`]: Readiness gate plus the published cancel entry
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              WasmEngine + CompiledModule                │
//! │  (Compiled once per worker)                             │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │        Store<RuntimeContext> + RuntimeHandle            │
//! │  (Lives as long as the worker, one call at a time)      │
//! │  - run / check entry points                             │
//! │  - per-call bindings, logs and fuel                     │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!              ┌─────────────┴─────────────┐
//!              ▼                           ▼
//! ┌───────────────────────┐   ┌─────────────────────────────┐
//! │    ExecutionFacade    │   │       EntryRegistry         │
//! │  (worker thread)      │   │  (shared with the host)     │
//! │  - Outcome per call   │   │  - readiness gate           │
//! │                       │   │  - CancelEntry              │
//! └───────────────────────┘   └─────────────────────────────┘
//! ```

pub mod bindings;
pub mod cancel;
pub mod engine;
pub mod facade;
pub mod handle;
pub mod module;
pub mod readiness;
pub mod store;
pub mod trap;

pub use bindings::{Bindings, Callback, ExecutionRequest};
pub use cancel::{CancelEntry, CancelFlag};
pub use engine::WasmEngine;
pub use facade::{ExecutionFacade, request_cancel};
pub use handle::{EntryPoint, ReturnConvention, RuntimeHandle};
pub use module::CompiledModule;
pub use readiness::{BridgeState, EntryRegistry, ReadinessGate};
pub use store::{LogEntry, LogLevel, RuntimeContext};
pub use trap::GuestThrow;
