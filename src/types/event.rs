use tokio::sync::mpsc;

use super::response::{Delta, Response};
use crate::error::Error;

/// One event in a streaming response
///
/// Every stream delivers zero or more `ContentDelta` and `ToolCallDelta`
/// events followed by exactly one terminator (`Done` or `Error`), after
/// which the channel closes. Concatenating all `ContentDelta` text equals
/// the assistant content in the final `Done` response, and per tool call
/// (grouped by id or index) concatenating argument fragments equals the
/// final arguments string.
#[derive(Debug)]
pub enum Event {
    /// Incremental text content
    ContentDelta {
        /// Non-empty text fragment
        text: String,
    },
    /// Incremental tool-call data
    ToolCallDelta {
        /// Delta carrying partial tool calls
        delta: Delta,
    },
    /// Terminal event of a successful stream
    Done {
        /// Fully assembled response
        response: Response,
    },
    /// Terminal event of a failed stream
    Error {
        /// The failure
        error: Error,
    },
}

impl Event {
    /// Whether this event terminates its stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// Receiving half of a streaming response
///
/// The producing adapter owns the sender and closes the channel after the
/// terminal event. Consumers either drain to close or drop the receiver,
/// which the producer detects and stops.
pub type EventStream = mpsc::Receiver<Event>;
