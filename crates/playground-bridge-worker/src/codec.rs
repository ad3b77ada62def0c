//! JSON codec for transport frames.
//!
//! Frames cross the worker boundary as text, so nothing but plain data
//! (strings, numbers, JSON values) can leak from one side to the other.

use serde::Serialize;
use serde::de::DeserializeOwned;

use playground_bridge_common::BridgeError;

/// Encode a frame.
///
/// # Errors
///
/// Returns [`BridgeError::Transport`] if the frame cannot be serialized.
pub fn encode<F: Serialize>(frame: &F) -> Result<String, BridgeError> {
    serde_json::to_string(frame)
        .map_err(|e| BridgeError::transport(format!("Failed to encode frame: {e}")))
}

/// Decode a frame.
///
/// # Errors
///
/// Returns [`BridgeError::Transport`] if the text is not a valid frame.
pub fn decode<F: DeserializeOwned>(text: &str) -> Result<F, BridgeError> {
    serde_json::from_str(text)
        .map_err(|e| BridgeError::transport(format!("Failed to decode frame: {e}")))
}
