//! Anthropic Messages API wire format

use serde::{Deserialize, Serialize};
use serde_json::Value;

// -- Request --

/// Messages API request body
#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    /// Model identifier
    pub model: String,
    /// Maximum tokens to generate; required by this dialect
    pub max_tokens: u32,
    /// System prompt, held outside the message list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Conversation messages
    pub messages: Vec<MessageParam>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Whether to stream the response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Tool definitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolParam>>,
    /// Tool choice directive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoiceParam>,
}

/// Message within a request
#[derive(Debug, Clone, Serialize)]
pub struct MessageParam {
    /// "user" or "assistant"
    pub role: String,
    /// Content: shorthand string or block array
    pub content: MessageContent,
}

/// Message content
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text shorthand
    Text(String),
    /// Array of content blocks
    Blocks(Vec<ContentBlock>),
}

/// Content block within a request message
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text block
    Text {
        /// The text string
        text: String,
    },
    /// Image block
    Image {
        /// Image source
        source: ImageSource,
    },
    /// Tool use request replayed from a prior assistant turn
    ToolUse {
        /// Tool use identifier
        id: String,
        /// Tool name
        name: String,
        /// Input as structured JSON
        input: Value,
    },
    /// Tool result answering a prior tool use
    ToolResult {
        /// Tool use this result answers
        tool_use_id: String,
        /// Result payload
        content: String,
    },
}

/// Base64 image source
#[derive(Debug, Clone, Serialize)]
pub struct ImageSource {
    /// Always "base64"
    #[serde(rename = "type")]
    pub kind: String,
    /// Media type, e.g. "image/png"
    pub media_type: String,
    /// Base64-encoded bytes
    pub data: String,
}

/// Tool definition
#[derive(Debug, Clone, Serialize)]
pub struct ToolParam {
    /// Tool name
    pub name: String,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the input, top-level type forced to "object"
    pub input_schema: Value,
}

/// Tool choice directive
#[derive(Debug, Clone, Serialize)]
pub struct ToolChoiceParam {
    /// "auto", "any", or "tool"
    #[serde(rename = "type")]
    pub kind: String,
    /// Tool name when kind is "tool"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// -- Response --

/// Messages API response body
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    /// Response identifier
    #[serde(default)]
    pub id: String,
    /// Model used
    #[serde(default)]
    pub model: String,
    /// Response content blocks
    #[serde(default)]
    pub content: Vec<ResponseBlock>,
    /// Stop reason
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Token usage
    #[serde(default)]
    pub usage: UsageInfo,
}

/// Content block within a response
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBlock {
    /// Text block
    Text {
        /// The text string
        text: String,
    },
    /// Tool use request
    ToolUse {
        /// Tool use identifier
        id: String,
        /// Tool name
        name: String,
        /// Input as structured JSON
        input: Value,
    },
}

/// Token usage halves
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct UsageInfo {
    /// Input tokens
    #[serde(default)]
    pub input_tokens: u32,
    /// Output tokens
    #[serde(default)]
    pub output_tokens: u32,
}

// -- Streaming --

/// Server-sent event within a streaming response
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Stream opened; carries message metadata and input usage
    MessageStart {
        /// Partial message
        message: StreamMessage,
    },
    /// A content block opened
    ContentBlockStart {
        /// Block index
        index: u32,
        /// Initial block content
        content_block: StartBlock,
    },
    /// Incremental content within the current block
    ContentBlockDelta {
        /// Block index
        index: u32,
        /// The delta
        delta: BlockDelta,
    },
    /// The current content block closed
    ContentBlockStop {
        /// Block index
        index: u32,
    },
    /// Message metadata delta carrying stop reason and output usage
    MessageDelta {
        /// The delta
        delta: MessageDeltaBody,
        /// Updated usage
        #[serde(default)]
        usage: Option<UsageInfo>,
    },
    /// Stream completed
    MessageStop,
    /// Keep-alive
    Ping,
    /// Mid-stream failure reported by the backend
    Error {
        /// Error details
        error: ErrorDetail,
    },
}

/// Partial message in a `message_start` event
#[derive(Debug, Clone, Deserialize)]
pub struct StreamMessage {
    /// Response identifier
    #[serde(default)]
    pub id: String,
    /// Model
    #[serde(default)]
    pub model: String,
    /// Initial usage
    #[serde(default)]
    pub usage: Option<UsageInfo>,
}

/// Block payload in a `content_block_start` event
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartBlock {
    /// Text block
    Text {
        /// Initial text, usually empty
        #[serde(default)]
        text: String,
    },
    /// Tool use block; id and name are fixed from this point on
    ToolUse {
        /// Tool use identifier
        id: String,
        /// Tool name
        name: String,
    },
}

/// Delta payload in a `content_block_delta` event
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    /// Text fragment
    TextDelta {
        /// The fragment
        text: String,
    },
    /// Partial tool input JSON
    InputJsonDelta {
        /// The JSON fragment
        partial_json: String,
    },
}

/// Delta payload in a `message_delta` event
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageDeltaBody {
    /// Stop reason
    #[serde(default)]
    pub stop_reason: Option<String>,
}

// -- Errors --

/// Error response body
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetail,
}

/// Error details
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    /// Error type
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Error message
    #[serde(default)]
    pub message: String,
}
