//! Logging host function implementation.
//!
//! Guest diagnostics are both kept in the [`RuntimeContext`] of the current
//! call and re-emitted through `tracing` with `guest_log = true`.

use playground_bridge_core::store::{LogLevel, RuntimeContext};
use tracing::{debug, error, info, warn};

/// Host implementation of `env.log`.
pub struct LoggingHost;

impl LoggingHost {
    /// Log a message at the specified level.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The runtime context to store logs in
    /// * `level` - The log level
    /// * `message` - The log message
    pub fn log(ctx: &mut RuntimeContext, level: LogLevel, message: &str) {
        let call_id = ctx.call_id().to_string();
        match level {
            LogLevel::Debug => debug!(call_id, guest_log = true, "{}", message),
            LogLevel::Info => info!(call_id, guest_log = true, "{}", message),
            LogLevel::Warn => warn!(call_id, guest_log = true, "{}", message),
            LogLevel::Error => error!(call_id, guest_log = true, "{}", message),
        }

        ctx.log(level, message.to_string());
    }
}

/// Convert a numeric log level to [`LogLevel`].
///
/// Unknown values map to `Info`.
pub fn level_from_i32(level: i32) -> LogLevel {
    match level {
        0 => LogLevel::Debug,
        2 => LogLevel::Warn,
        3 => LogLevel::Error,
        _ => LogLevel::Info,
    }
}
