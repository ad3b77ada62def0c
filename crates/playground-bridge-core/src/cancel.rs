//! Cooperative cancellation.
//!
//! A [`CancelFlag`] is shared between the store of the worker and the
//! [`CancelEntry`] handed to the host side. The runtime reads it through the
//! `env.cancel_requested` import at its own checkpoints; nothing here can
//! interrupt running code.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use playground_bridge_common::BridgeError;

/// Flag observed by the runtime at its cancellation checkpoints.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    requested: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Create a cleared flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag.
    pub fn raise(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Clear the flag. Called before every call so a stale request does not
    /// cancel the next script.
    pub fn clear(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }

    /// Returns `true` if cancellation was requested.
    pub fn is_raised(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// The runtime's cancellation entry point, callable from any thread.
///
/// The entry stays valid only while the worker that owns the runtime is
/// alive; afterwards [`request`](Self::request) fails.
#[derive(Debug, Clone)]
pub struct CancelEntry {
    flag: CancelFlag,
    attached: Arc<AtomicBool>,
}

impl CancelEntry {
    pub(crate) fn new(flag: CancelFlag) -> Self {
        Self {
            flag,
            attached: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Ask the runtime to unwind whatever it is currently executing.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::CancelFailure`] if the runtime has been torn
    /// down.
    pub fn request(&self) -> Result<(), BridgeError> {
        if !self.attached.load(Ordering::SeqCst) {
            return Err(BridgeError::cancel_failure("runtime has been torn down"));
        }
        self.flag.raise();
        Ok(())
    }

    /// Returns `true` while the owning runtime is alive.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub(crate) fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_raise_and_clear() {
        let flag = CancelFlag::new();
        assert!(!flag.is_raised());

        flag.raise();
        assert!(flag.is_raised());

        flag.clear();
        assert!(!flag.is_raised());
    }

    #[test]
    fn test_entry_shares_flag() {
        let flag = CancelFlag::new();
        let entry = CancelEntry::new(flag.clone());

        assert!(entry.request().is_ok());
        assert!(flag.is_raised());
    }

    #[test]
    fn test_detached_entry_fails() {
        let flag = CancelFlag::new();
        let entry = CancelEntry::new(flag.clone());
        let clone = entry.clone();

        entry.detach();

        assert!(!clone.is_attached());
        let err = clone.request().unwrap_err();
        assert!(matches!(err, BridgeError::CancelFailure { .. }));
        assert!(err.to_string().contains("torn down"));
        assert!(!flag.is_raised());
    }
}
