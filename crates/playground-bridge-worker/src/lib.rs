//! Worker-side loading and host-side adaptation of the playground runtime.
//!
//! ```text
//!   UI ──► BridgeClient ──HostFrame──► worker thread ──► ExecutionFacade ──► runtime
//!            ▲   │                          │
//!            │   └── cancel (CancelEntry) ──┼──────────────────────────────► flag
//!            └──────────WorkerFrame─────────┘
//! ```
//!
//! - [`RuntimeLoader`]: fetches and boots the runtime on a dedicated thread
//! - [`BridgeClient`]: the host adapter (run/check/cancel/is_loaded)
//! - [`transport`], [`protocol`], [`codec`]: serialized frames between the two
//! - [`relay`]: continuation registry turning frames back into callbacks
//! - [`poll`] and [`debounce`]: readiness polling and debounced re-checks

pub mod client;
pub mod codec;
pub mod debounce;
pub mod fetch;
pub mod loader;
pub mod poll;
pub mod protocol;
pub mod relay;
pub mod transport;

pub use client::{BridgeClient, PendingCall};
pub use debounce::Debouncer;
pub use fetch::{DefaultFetcher, ModuleFetcher, ModuleSource};
pub use loader::{DEFAULT_ENTRY_POINT, RuntimeLoader};
pub use poll::{ReadinessPoll, poll_until_ready};
pub use protocol::{CallToken, HostFrame, SlotSet, WorkerFrame};
