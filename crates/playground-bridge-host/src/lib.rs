//! Host functions imported by the playground runtime.
//!
//! Everything the runtime can reach on the host side lives in the `env`
//! import module, plus WASI preview1 for clocks, randomness and stdio.
//!
//! # Interfaces
//!
//! - [`logging`]: Guest diagnostics re-emitted through `tracing`
//! - [`callbacks`]: `result_callback` / `check_callback` into the call's bindings
//! - [`linker`]: Registration of every import, including `throw` and
//!   `cancel_requested`
//! - [`memory`]: Bounds-checked reads of guest memory

pub mod callbacks;
pub mod linker;
pub mod logging;
pub mod memory;

pub use callbacks::CallbackHost;
pub use linker::register_all;
pub use logging::LoggingHost;
