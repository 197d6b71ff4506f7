//! Unified dispatch layer over multiple LLM provider APIs
//!
//! Client code submits one canonical request naming a target model; the
//! [`Router`] resolves the backing provider (`OpenAI`-compatible, Anthropic,
//! Google Gemini), translates the request into that provider's dialect, and
//! translates the reply back into a single canonical shape. Cross-cutting
//! behavior (timeouts, retries, circuit breaking) composes as a chain of
//! [`Middleware`] wrappers, each of which is itself a [`Provider`].

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod middleware;
pub mod protocol;
pub mod provider;
pub mod router;
pub mod types;

pub use config::ProviderConfig;
pub use context::RequestContext;
pub use error::{ApiError, Error};
pub use middleware::{CircuitBreakerMiddleware, Middleware, RetryMiddleware, TimeoutMiddleware};
pub use provider::{AnthropicProvider, GeminiProvider, OpenAiProvider, Provider};
pub use router::{Router, RouterBuilder};
pub use types::{
    Choice, ContentPart, Delta, Event, EventStream, FinishReason, FunctionCall, Message, Request,
    Response, Role, Tool, ToolCall, ToolChoice, Usage,
};
