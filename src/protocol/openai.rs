//! `OpenAI` chat completion wire format
//!
//! Also covers the `OpenAI`-compatible look-alikes (DeepSeek, Groq,
//! Together, Ollama) which speak the same dialect at different base URLs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// -- Request --

/// Chat completion request body
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier
    pub model: String,
    /// Conversation messages
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Whether to stream the response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Stream options; set to request usage on the final chunk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
    /// Tool definitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ChatTool>>,
    /// Tool choice directive; a bare string or a named-function object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
}

/// Stream options
#[derive(Debug, Clone, Serialize)]
pub struct StreamOptions {
    /// Ask for a final usage chunk
    pub include_usage: bool,
}

/// Message within a chat request
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Author role string
    pub role: String,
    /// Content: plain string or structured parts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ChatContent>,
    /// Participant name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls made by the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
    /// Tool call this message responds to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Message content, either a string or an array of parts
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChatContent {
    /// Plain text
    Text(String),
    /// Structured parts (text and images)
    Parts(Vec<ChatContentPart>),
}

/// One part of a multipart message
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatContentPart {
    /// Text part
    Text {
        /// The text string
        text: String,
    },
    /// Image part referenced by URL or data URI
    ImageUrl {
        /// URL wrapper
        image_url: ImageUrl,
    },
}

/// Image URL wrapper
#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    /// URL or base64 data URI
    pub url: String,
}

/// Tool definition
#[derive(Debug, Clone, Serialize)]
pub struct ChatTool {
    /// Always "function"
    #[serde(rename = "type")]
    pub kind: String,
    /// Function specification
    pub function: ChatFunction,
}

/// Function specification within a tool definition
#[derive(Debug, Clone, Serialize)]
pub struct ChatFunction {
    /// Function name
    pub name: String,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema, passed through verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Tool call within a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatToolCall {
    /// Call identifier
    pub id: String,
    /// Always "function"
    #[serde(rename = "type")]
    pub kind: String,
    /// Function call details
    pub function: ChatFunctionCall,
}

/// Function name and arguments within a tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatFunctionCall {
    /// Function name
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

// -- Response --

/// Chat completion response body
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    /// Response identifier
    #[serde(default)]
    pub id: String,
    /// Object tag
    #[serde(default)]
    pub object: String,
    /// Creation timestamp
    #[serde(default)]
    pub created: u64,
    /// Model used
    #[serde(default)]
    pub model: String,
    /// Generated choices
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    /// Token usage
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

/// Choice within a response
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    /// Choice index
    #[serde(default)]
    pub index: u32,
    /// Generated message
    pub message: ChatResponseMessage,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Assistant message within a response choice
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponseMessage {
    /// Always "assistant"
    #[serde(default)]
    pub role: String,
    /// Text content
    #[serde(default)]
    pub content: Option<String>,
    /// Tool calls
    #[serde(default)]
    pub tool_calls: Option<Vec<ChatToolCall>>,
}

/// Token usage
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChatUsage {
    /// Prompt tokens
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Completion tokens
    #[serde(default)]
    pub completion_tokens: u32,
    /// Total tokens
    #[serde(default)]
    pub total_tokens: u32,
}

// -- Streaming --

/// One streaming chunk
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChunk {
    /// Chunk identifier
    #[serde(default)]
    pub id: String,
    /// Model used
    #[serde(default)]
    pub model: String,
    /// Creation timestamp
    #[serde(default)]
    pub created: u64,
    /// Delta choices
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    /// Usage, present on the final chunk when requested
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

/// Choice within a streaming chunk
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    /// Choice index
    #[serde(default)]
    pub index: u32,
    /// Incremental delta
    #[serde(default)]
    pub delta: ChunkDelta,
    /// Finish reason, present on the final content chunk
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Delta within a streaming choice
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    /// Role, present on the first chunk
    #[serde(default)]
    pub role: Option<String>,
    /// Text fragment
    #[serde(default)]
    pub content: Option<String>,
    /// Tool call fragments
    #[serde(default)]
    pub tool_calls: Option<Vec<ChunkToolCall>>,
}

/// Tool call fragment within a streaming delta
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkToolCall {
    /// Position in the tool-call array; stable across fragments
    #[serde(default)]
    pub index: u32,
    /// Call identifier, first fragment only
    #[serde(default)]
    pub id: Option<String>,
    /// Partial function data
    #[serde(default)]
    pub function: Option<ChunkFunctionCall>,
}

/// Partial function data within a tool call fragment
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkFunctionCall {
    /// Function name, first fragment only
    #[serde(default)]
    pub name: Option<String>,
    /// Next fragment of the argument JSON
    #[serde(default)]
    pub arguments: Option<String>,
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
    /// Error message
    #[serde(default)]
    pub message: String,
    /// Error type
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}
