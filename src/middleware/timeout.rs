use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

use super::Middleware;
use crate::context::RequestContext;
use crate::error::Error;
use crate::provider::{EVENT_BUFFER, Provider};
use crate::types::{Event, EventStream, Request, Response};

/// Bounds each call with a deadline
///
/// For streaming calls the deadline covers the entire stream lifetime, not
/// just establishment; on expiry the consumer sees one `Error` event and
/// the channel closes. Expiry surfaces as the cancellation sentinel, the
/// same as a caller-initiated cancel.
pub struct TimeoutMiddleware {
    timeout: Duration,
}

impl TimeoutMiddleware {
    /// Create a timeout middleware with the given bound
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Middleware for TimeoutMiddleware {
    fn wrap(&self, next: Arc<dyn Provider>) -> Arc<dyn Provider> {
        Arc::new(TimeoutProvider {
            inner: next,
            timeout: self.timeout,
        })
    }
}

struct TimeoutProvider {
    inner: Arc<dyn Provider>,
    timeout: Duration,
}

#[async_trait]
impl Provider for TimeoutProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn models(&self) -> Vec<String> {
        self.inner.models()
    }

    fn supports_tools(&self) -> bool {
        self.inner.supports_tools()
    }

    async fn complete(&self, ctx: &RequestContext, request: &Request) -> Result<Response, Error> {
        tokio::select! {
            _ = ctx.canceled() => Err(Error::Canceled),
            _ = tokio::time::sleep(self.timeout) => Err(Error::Canceled),
            result = self.inner.complete(ctx, request) => result,
        }
    }

    async fn stream(&self, ctx: &RequestContext, request: &Request) -> Result<EventStream, Error> {
        let deadline = Instant::now() + self.timeout;

        // The inner provider watches the child so expiry reaches it too
        let child = ctx.child();

        let mut inner_rx = tokio::select! {
            _ = ctx.canceled() => return Err(Error::Canceled),
            _ = sleep_until(deadline) => return Err(Error::Canceled),
            result = self.inner.stream(&child, request) => result?,
        };

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sleep_until(deadline) => {
                        child.token().cancel();
                        let _ = tx.send(Event::Error { error: Error::Canceled }).await;
                        return;
                    }
                    event = inner_rx.recv() => match event {
                        Some(event) => {
                            let terminal = event.is_terminal();
                            if tx.send(event).await.is_err() {
                                // Consumer went away; stop the producer too
                                child.token().cancel();
                                return;
                            }
                            if terminal {
                                return;
                            }
                        }
                        None => return,
                    }
                }
            }
        });

        Ok(rx)
    }
}
