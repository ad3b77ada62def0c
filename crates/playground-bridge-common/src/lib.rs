//! Common types, errors, and configuration for playground-bridge.
//!
//! This crate provides shared functionality used across the workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures and the TOML config file
//! - The serializable [`Outcome`] every call is normalized into

pub mod config;
pub mod config_file;
pub mod error;
pub mod outcome;

pub use config::{BridgeConfig, EngineConfig, ExecutionConfig, RuntimeConfig};
pub use config_file::{ConfigFile, ConfigFileError, ModuleConfig};
pub use error::{BridgeError, HostFunctionError};
pub use outcome::{CallbackSlot, Operation, Outcome, UNKNOWN_FAILURE};
