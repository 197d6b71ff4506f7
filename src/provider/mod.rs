//! Provider contract and the concrete backend adapters

pub mod anthropic;
pub mod gemini;
pub mod openai;

use std::future::Future;

use async_trait::async_trait;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

use crate::context::RequestContext;
use crate::error::Error;
use crate::types::{EventStream, Request, Response};

/// Buffer size of the event channel each streaming call owns
pub(crate) const EVENT_BUFFER: usize = 32;

/// Capability set implemented by every backend adapter and middleware wrapper
///
/// Implementations must be safe for concurrent use: one instance serves many
/// overlapping requests. A request whose model field is empty or equals the
/// provider's own name is dispatched with the adapter's default model.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier, used as the registry key
    fn name(&self) -> &str;

    /// Declared model list; empty means "accept any model string"
    fn models(&self) -> Vec<String>;

    /// Whether the backend supports function/tool calling
    fn supports_tools(&self) -> bool;

    /// Perform a single-shot completion
    async fn complete(&self, ctx: &RequestContext, request: &Request) -> Result<Response, Error>;

    /// Perform a streaming completion
    ///
    /// The returned channel is closed by the producer after a terminal
    /// `Done` or `Error` event. Construction failures (resolution, transport
    /// setup, non-success status) return synchronously without a channel.
    async fn stream(&self, ctx: &RequestContext, request: &Request) -> Result<EventStream, Error>;
}

/// Race a call against the context's cancellation signal
pub(crate) async fn guard<T, F>(ctx: &RequestContext, call: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    if ctx.is_canceled() {
        return Err(Error::Canceled);
    }

    tokio::select! {
        _ = ctx.canceled() => Err(Error::Canceled),
        result = call => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guard_short_circuits_on_pre_canceled_context() {
        let ctx = RequestContext::new();
        ctx.token().cancel();

        let result = guard(&ctx, async { Ok::<_, Error>(1) }).await;
        assert!(matches!(result, Err(Error::Canceled)));
    }

    #[tokio::test]
    async fn guard_aborts_pending_call_on_cancel() {
        let ctx = RequestContext::new();
        let token = ctx.token().clone();

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            token.cancel();
        });

        let result = guard(&ctx, async {
            std::future::pending::<Result<(), Error>>().await
        })
        .await;
        assert!(matches!(result, Err(Error::Canceled)));
    }
}
