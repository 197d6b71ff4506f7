//! Translation between the canonical model and each backend dialect
//!
//! One module per dialect, owning request encoding, response decoding, and
//! the streaming state machine that normalizes the backend's event sequence
//! into the canonical one.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in epoch seconds, used when a backend reports no timestamp
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
