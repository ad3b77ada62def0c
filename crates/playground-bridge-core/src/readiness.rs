//! Readiness gate and entry registry.
//!
//! The [`EntryRegistry`] is the one object shared between the worker that
//! boots the runtime and the host side that polls it. It replaces any
//! ambient global lookup: readiness is exactly "the loader published its
//! entry points here".

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};

use tracing::debug;

use crate::cancel::CancelEntry;

/// Lifecycle of the runtime inside one worker.
///
/// Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum BridgeState {
    /// The worker has not started loading.
    NotLoaded = 0,
    /// The module is being fetched, compiled or started.
    Loading = 1,
    /// `run` and `check` are installed and callable.
    Ready = 2,
}

impl BridgeState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => BridgeState::NotLoaded,
            1 => BridgeState::Loading,
            _ => BridgeState::Ready,
        }
    }
}

impl std::fmt::Display for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeState::NotLoaded => write!(f, "not_loaded"),
            BridgeState::Loading => write!(f, "loading"),
            BridgeState::Ready => write!(f, "ready"),
        }
    }
}

/// Poll-able, monotonic readiness flag.
#[derive(Debug)]
pub struct ReadinessGate {
    state: AtomicU8,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(BridgeState::NotLoaded as u8),
        }
    }
}

impl ReadinessGate {
    /// Create a gate in the `NotLoaded` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> BridgeState {
        BridgeState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` once the entry points are installed.
    ///
    /// Never blocks and never fails, however early it is called.
    pub fn is_loaded(&self) -> bool {
        self.state() == BridgeState::Ready
    }

    /// Advance to `state`. Attempts to move backwards are ignored.
    pub(crate) fn advance(&self, state: BridgeState) -> BridgeState {
        let previous = BridgeState::from_u8(self.state.fetch_max(state as u8, Ordering::AcqRel));
        if previous < state {
            debug!(from = %previous, to = %state, "Bridge state advanced");
        }
        previous
    }
}

/// Entry points published by the loader.
///
/// `run` and `check` themselves stay on the worker thread (they need the
/// store); what is shared is whether they exist, and the cancellation entry
/// which must be reachable while the worker is busy.
#[derive(Debug, Default)]
pub struct EntryRegistry {
    gate: ReadinessGate,
    cancel: OnceLock<CancelEntry>,
}

impl EntryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The readiness gate.
    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    /// Shorthand for `gate().is_loaded()`.
    pub fn is_loaded(&self) -> bool {
        self.gate.is_loaded()
    }

    /// Current state.
    pub fn state(&self) -> BridgeState {
        self.gate.state()
    }

    /// Mark that loading has started.
    pub fn mark_loading(&self) {
        self.gate.advance(BridgeState::Loading);
    }

    /// Publish the installed entry points and flip the gate to `Ready`.
    ///
    /// The cancellation entry is set before the gate flips, so a caller that
    /// observes `Ready` also observes it.
    pub fn publish(&self, cancel: Option<CancelEntry>) {
        if let Some(entry) = cancel {
            // A second publish keeps the first entry
            let _ = self.cancel.set(entry);
        }
        self.gate.advance(BridgeState::Ready);
    }

    /// The cancellation entry, if the runtime supports cancellation.
    pub fn cancel_entry(&self) -> Option<&CancelEntry> {
        self.cancel.get()
    }
}
