use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Definition of a function the model may call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Tool kind, currently always "function"
    #[serde(rename = "type")]
    pub kind: String,
    /// Function specification
    pub function: FunctionDef,
}

/// Specification of a callable function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    /// Function name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Opaque JSON Schema fragment; never validated by the core
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl Tool {
    /// Build a function tool from its parts
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function".to_owned(),
            function: FunctionDef {
                name: name.into(),
                description: Some(description.into()),
                parameters: Some(parameters),
            },
        }
    }
}

/// A tool invocation requested by the model
///
/// `function.arguments` is always a JSON string, never a parsed object, so
/// that streaming argument fragments concatenate byte-accurately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier; links the eventual tool-role answer back to this call
    #[serde(default)]
    pub id: String,
    /// Position within the assistant's tool-call array, set on stream deltas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    /// Invoked function and its arguments
    pub function: FunctionCall,
}

/// Function name and JSON-encoded arguments within a tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name; empty on argument-only stream fragments
    #[serde(default)]
    pub name: String,
    /// Arguments as JSON text (possibly a partial fragment mid-stream)
    #[serde(default)]
    pub arguments: String,
}

/// Directive controlling how the model selects tools
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    /// Simple mode: "auto", "none", or "required"
    Mode(ToolChoiceMode),
    /// Force a specific function
    Function(NamedToolChoice),
}

/// Tool selection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoiceMode {
    /// The model decides whether to call tools
    Auto,
    /// The model must not call tools
    None,
    /// The model must call at least one tool
    Required,
}

/// Forced selection of a named function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedToolChoice {
    /// Must be "function"
    #[serde(rename = "type")]
    pub kind: String,
    /// The function to call
    pub function: FunctionRef,
}

/// Reference to a function by name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionRef {
    /// Function name
    pub name: String,
}

impl ToolChoice {
    /// Let the model decide
    pub fn auto() -> Self {
        Self::Mode(ToolChoiceMode::Auto)
    }

    /// Forbid tool calls
    pub fn none() -> Self {
        Self::Mode(ToolChoiceMode::None)
    }

    /// Require at least one tool call
    pub fn required() -> Self {
        Self::Mode(ToolChoiceMode::Required)
    }

    /// Force a specific function by name
    pub fn function(name: impl Into<String>) -> Self {
        Self::Function(NamedToolChoice {
            kind: "function".to_owned(),
            function: FunctionRef { name: name.into() },
        })
    }
}
