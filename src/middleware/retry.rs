use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::Middleware;
use crate::context::RequestContext;
use crate::error::Error;
use crate::provider::Provider;
use crate::types::{EventStream, Request, Response};

/// Classifies whether an error is worth retrying
pub type RetryClassifier = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Retries failed calls with exponential backoff
///
/// Sleeps `base_delay * 2^(attempt-1)` between attempts, capped at the max
/// delay. Non-retryable errors fail immediately; exhausting all attempts
/// wraps the last error in [`Error::MaxRetriesExceeded`]. Streaming retry
/// applies only to establishing the stream; once events flow a partially
/// consumed stream is never restarted.
pub struct RetryMiddleware {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    classifier: RetryClassifier,
}

impl RetryMiddleware {
    /// Create a retry middleware with the default 30s delay cap and the
    /// default classifier ([`Error::is_retryable`])
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
            classifier: Arc::new(Error::is_retryable),
        }
    }

    /// Set the maximum delay between attempts
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Replace the retry decision function
    pub fn with_classifier(mut self, classifier: impl Fn(&Error) -> bool + Send + Sync + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }
}

impl Middleware for RetryMiddleware {
    fn wrap(&self, next: Arc<dyn Provider>) -> Arc<dyn Provider> {
        Arc::new(RetryProvider {
            inner: next,
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            classifier: Arc::clone(&self.classifier),
        })
    }
}

struct RetryProvider {
    inner: Arc<dyn Provider>,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    classifier: RetryClassifier,
}

impl RetryProvider {
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Sleep before a retry attempt, racing the cancellation signal
    async fn pause(&self, ctx: &RequestContext, attempt: u32) -> Result<(), Error> {
        tokio::select! {
            _ = ctx.canceled() => Err(Error::Canceled),
            _ = tokio::time::sleep(self.backoff(attempt)) => Ok(()),
        }
    }
}

#[async_trait]
impl Provider for RetryProvider {
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
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                self.pause(ctx, attempt).await?;
            }

            match self.inner.complete(ctx, request).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    if !(self.classifier)(&error) {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
            }
        }

        Err(exhausted(last_error))
    }

    async fn stream(&self, ctx: &RequestContext, request: &Request) -> Result<EventStream, Error> {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                self.pause(ctx, attempt).await?;
            }

            match self.inner.stream(ctx, request).await {
                Ok(stream) => return Ok(stream),
                Err(error) => {
                    if !(self.classifier)(&error) {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
            }
        }

        Err(exhausted(last_error))
    }
}

fn exhausted(last_error: Option<Error>) -> Error {
    Error::MaxRetriesExceeded(Box::new(
        last_error.unwrap_or(Error::Provider("no attempts were made".to_owned())),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use reqwest::StatusCode;

    use super::*;
    use crate::error::ApiError;
    use crate::types::Message;

    struct FlakyProvider {
        calls: AtomicU32,
        failures: u32,
        status: u16,
    }

    impl FlakyProvider {
        fn always_failing(status: u16) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures: u32::MAX,
                status,
            }
        }

        fn failing_first(failures: u32, status: u16) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
                status,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::Relaxed)
        }

        fn next(&self) -> Result<Response, Error> {
            let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
            if call <= self.failures {
                let status = StatusCode::from_u16(self.status).unwrap();
                return Err(ApiError::from_status("flaky", status, "boom", None).into());
            }
            Ok(Response {
                id: "r1".into(),
                object: "chat.completion".into(),
                created: 0,
                model: "m".into(),
                provider: "flaky".into(),
                choices: Vec::new(),
                usage: None,
            })
        }
    }

    #[async_trait]
    impl Provider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn models(&self) -> Vec<String> {
            Vec::new()
        }

        fn supports_tools(&self) -> bool {
            false
        }

        async fn complete(&self, _: &RequestContext, _: &Request) -> Result<Response, Error> {
            self.next()
        }

        async fn stream(&self, _: &RequestContext, _: &Request) -> Result<EventStream, Error> {
            self.next()?;
            let (_tx, rx) = tokio::sync::mpsc::channel(1);
            Ok(rx)
        }
    }

    fn request() -> Request {
        Request::new("m", vec![Message::user("hi")])
    }

    #[tokio::test]
    async fn exhausts_attempts_against_persistent_429() {
        let inner = Arc::new(FlakyProvider::always_failing(429));
        let middleware = RetryMiddleware::new(3, Duration::from_millis(1));
        let provider = middleware.wrap(Arc::clone(&inner) as Arc<dyn Provider>);

        let result = provider.complete(&RequestContext::new(), &request()).await;

        assert!(matches!(result, Err(Error::MaxRetriesExceeded(_))));
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn succeeds_on_second_attempt_after_backoff() {
        let inner = Arc::new(FlakyProvider::failing_first(1, 503));
        let middleware = RetryMiddleware::new(2, Duration::from_millis(10));
        let provider = middleware.wrap(Arc::clone(&inner) as Arc<dyn Provider>);

        let started = std::time::Instant::now();
        let result = provider.complete(&RequestContext::new(), &request()).await;

        assert!(result.is_ok());
        assert_eq!(inner.calls(), 2);
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let inner = Arc::new(FlakyProvider::always_failing(401));
        let middleware = RetryMiddleware::new(3, Duration::from_millis(1));
        let provider = middleware.wrap(Arc::clone(&inner) as Arc<dyn Provider>);

        let result = provider.complete(&RequestContext::new(), &request()).await;

        assert!(matches!(result, Err(Error::Api(_))));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn stream_retries_establishment_only() {
        let inner = Arc::new(FlakyProvider::failing_first(1, 503));
        let middleware = RetryMiddleware::new(3, Duration::from_millis(1));
        let provider = middleware.wrap(Arc::clone(&inner) as Arc<dyn Provider>);

        let result = provider.stream(&RequestContext::new(), &request()).await;

        assert!(result.is_ok());
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn cancellation_during_backoff_aborts() {
        let inner = Arc::new(FlakyProvider::always_failing(503));
        let middleware = RetryMiddleware::new(5, Duration::from_secs(5));
        let provider = middleware.wrap(Arc::clone(&inner) as Arc<dyn Provider>);

        let ctx = RequestContext::new();
        let token = ctx.token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let started = std::time::Instant::now();
        let result = provider.complete(&ctx, &request()).await;

        assert!(matches!(result, Err(Error::Canceled)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(inner.calls(), 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let middleware = RetryMiddleware::new(5, Duration::from_millis(100)).with_max_delay(Duration::from_millis(250));
        let provider = RetryProvider {
            inner: Arc::new(FlakyProvider::always_failing(503)),
            max_attempts: middleware.max_attempts,
            base_delay: middleware.base_delay,
            max_delay: middleware.max_delay,
            classifier: Arc::clone(&middleware.classifier),
        };

        assert_eq!(provider.backoff(1), Duration::from_millis(100));
        assert_eq!(provider.backoff(2), Duration::from_millis(200));
        assert_eq!(provider.backoff(3), Duration::from_millis(250));
        assert_eq!(provider.backoff(4), Duration::from_millis(250));
    }
}
