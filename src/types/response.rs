use serde::{Deserialize, Serialize};

use super::message::{Message, Role};
use super::tool::ToolCall;

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of generation
    Stop,
    /// Output token limit reached
    Length,
    /// The model requested tool calls
    ToolCalls,
    /// Safety systems filtered the content
    ContentFilter,
}

/// Token usage reported by the backend
///
/// The core never synthesizes usage; when the backend reports none the
/// response carries `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u32,
    /// Tokens generated in the completion
    pub completion_tokens: u32,
    /// Total tokens (prompt + completion)
    pub total_tokens: u32,
}

/// One completion choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Choice index
    pub index: u32,
    /// Full assistant message (single-shot responses and Done events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    /// Incremental delta (streaming chunks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<Delta>,
    /// Why generation stopped; `None` while still generating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// Incremental content within a streaming choice
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
    /// Author role, present on the first chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Text fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Partial tool calls
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

/// Canonical completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Backend response identifier; empty when the dialect reports none
    #[serde(default)]
    pub id: String,
    /// Object tag, "chat.completion" by convention
    #[serde(default)]
    pub object: String,
    /// Creation time in epoch seconds
    #[serde(default)]
    pub created: u64,
    /// Model that produced the response
    pub model: String,
    /// Registered name of the provider that produced the response
    pub provider: String,
    /// Ordered completion choices
    pub choices: Vec<Choice>,
    /// Token usage, when the backend reported it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Response {
    /// Text content of the first choice's message, if any
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.as_ref())
            .map(|message| message.content.as_str())
    }

    /// Tool calls of the first choice's message, if any
    pub fn tool_calls(&self) -> Option<&[ToolCall]> {
        self.choices
            .first()
            .and_then(|choice| choice.message.as_ref())
            .and_then(|message| message.tool_calls.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[test]
    fn finish_reason_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&FinishReason::ToolCalls).unwrap(),
            "\"tool_calls\""
        );
        assert_eq!(
            serde_json::to_string(&FinishReason::ContentFilter).unwrap(),
            "\"content_filter\""
        );
    }

    #[test]
    fn text_accessor_reads_first_choice() {
        let resp = Response {
            id: "r1".into(),
            object: "chat.completion".into(),
            created: 0,
            model: "m1".into(),
            provider: "p".into(),
            choices: vec![Choice {
                index: 0,
                message: Some(Message::assistant("hello")),
                delta: None,
                finish_reason: Some(FinishReason::Stop),
            }],
            usage: None,
        };
        assert_eq!(resp.text(), Some("hello"));
        assert!(resp.tool_calls().is_none());
    }
}
