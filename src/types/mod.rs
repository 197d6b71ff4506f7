//! Canonical request, response, and event types
//!
//! These are the provider-neutral shapes every adapter translates to and
//! from. When serialized as JSON the field names follow the snake_case
//! conventions of the `OpenAI` chat dialect.

mod event;
mod message;
mod request;
mod response;
mod tool;

pub use event::{Event, EventStream};
pub use message::{ContentPart, Message, Role};
pub use request::Request;
pub use response::{Choice, Delta, FinishReason, Response, Usage};
pub use tool::{FunctionCall, FunctionDef, FunctionRef, NamedToolChoice, Tool, ToolCall, ToolChoice, ToolChoiceMode};
