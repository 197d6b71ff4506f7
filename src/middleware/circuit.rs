use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::Middleware;
use crate::context::RequestContext;
use crate::error::Error;
use crate::provider::Provider;
use crate::types::{EventStream, Request, Response};

/// Rolling window over which consecutive failures are counted
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls fail fast without contacting the backend
    Open,
    /// A bounded number of probe calls are admitted
    HalfOpen,
}

/// Observer invoked on every state transition
pub type StateChangeHook = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Three-state breaker keyed to one provider
///
/// Counts consecutive failures over a rolling window; trips open when they
/// exceed the threshold. After the cool-down it admits a bounded number of
/// probes: one success closes the circuit, one failure re-opens it.
pub struct CircuitBreaker {
    name: String,
    threshold: u32,
    window: Duration,
    cooldown: Duration,
    max_probes: u32,
    hook: Option<StateChangeHook>,
    inner: Mutex<BreakerInner>,
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    opened_at: Option<Instant>,
    probes: u32,
}

impl CircuitBreaker {
    /// Create a closed breaker that trips when consecutive failures exceed
    /// `threshold` and stays open for `cooldown`
    pub fn new(name: impl Into<String>, threshold: u32, cooldown: Duration) -> Self {
        Self {
            name: name.into(),
            threshold,
            window: DEFAULT_WINDOW,
            cooldown,
            max_probes: 1,
            hook: None,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                opened_at: None,
                probes: 0,
            }),
        }
    }

    /// Set the rolling failure window
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Set how many probe calls the half-open state admits
    pub fn with_probe_limit(mut self, max_probes: u32) -> Self {
        self.max_probes = max_probes.max(1);
        self
    }

    /// Observe state transitions
    pub fn with_state_hook(mut self, hook: impl Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Current state
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Admit or reject a call
    fn acquire(&self) -> Result<(), Error> {
        let (result, change) = {
            let mut inner = self.lock();
            match inner.state {
                CircuitState::Closed => (Ok(()), None),
                CircuitState::Open => {
                    if inner.opened_at.is_some_and(|at| at.elapsed() >= self.cooldown) {
                        let change = transition(&mut inner, CircuitState::HalfOpen);
                        inner.probes = 1;
                        (Ok(()), change)
                    } else {
                        (Err(Error::CircuitOpen), None)
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.probes < self.max_probes {
                        inner.probes += 1;
                        (Ok(()), None)
                    } else {
                        (Err(Error::CircuitOpen), None)
                    }
                }
            }
        };

        self.notify(change);
        result
    }

    /// Record a successful call, closing the circuit
    fn record_success(&self) {
        let change = {
            let mut inner = self.lock();
            inner.consecutive_failures = 0;
            inner.last_failure = None;
            inner.opened_at = None;
            inner.probes = 0;
            transition(&mut inner, CircuitState::Closed)
        };

        self.notify(change);
    }

    /// Record a failed call, tripping or re-opening the circuit as needed
    fn record_failure(&self) {
        let change = {
            let mut inner = self.lock();
            let now = Instant::now();

            match inner.state {
                CircuitState::HalfOpen => {
                    inner.opened_at = Some(now);
                    inner.probes = 0;
                    transition(&mut inner, CircuitState::Open)
                }
                CircuitState::Closed => {
                    // Failures outside the window do not accumulate
                    if inner.last_failure.is_some_and(|at| at.elapsed() > self.window) {
                        inner.consecutive_failures = 0;
                    }
                    inner.consecutive_failures += 1;
                    inner.last_failure = Some(now);

                    if inner.consecutive_failures > self.threshold {
                        inner.opened_at = Some(now);
                        transition(&mut inner, CircuitState::Open)
                    } else {
                        None
                    }
                }
                // A straggler from before the trip; keep the timer fresh
                CircuitState::Open => {
                    inner.opened_at = Some(now);
                    None
                }
            }
        };

        self.notify(change);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, change: Option<(CircuitState, CircuitState)>) {
        if let Some((from, to)) = change
            && let Some(hook) = &self.hook
        {
            hook(&self.name, from, to);
        }
    }
}

fn transition(inner: &mut BreakerInner, to: CircuitState) -> Option<(CircuitState, CircuitState)> {
    let from = inner.state;
    if from == to {
        return None;
    }
    inner.state = to;
    Some((from, to))
}

/// Gates calls through a shared [`CircuitBreaker`]
///
/// For streaming calls the breaker scores only stream establishment; events
/// flowing afterwards do not feed the failure counter.
pub struct CircuitBreakerMiddleware {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerMiddleware {
    /// Create a middleware around a fresh breaker with default window and
    /// probe limit
    pub fn new(name: impl Into<String>, threshold: u32, cooldown: Duration) -> Self {
        Self::from_breaker(CircuitBreaker::new(name, threshold, cooldown))
    }

    /// Create a middleware around a fully configured breaker
    pub fn from_breaker(breaker: CircuitBreaker) -> Self {
        Self {
            breaker: Arc::new(breaker),
        }
    }

    /// Current breaker state, for observability
    pub fn state(&self) -> CircuitState {
        self.breaker.state()
    }
}

impl Middleware for CircuitBreakerMiddleware {
    fn wrap(&self, next: Arc<dyn Provider>) -> Arc<dyn Provider> {
        Arc::new(CircuitBreakerProvider {
            inner: next,
            breaker: Arc::clone(&self.breaker),
        })
    }
}

struct CircuitBreakerProvider {
    inner: Arc<dyn Provider>,
    breaker: Arc<CircuitBreaker>,
}

#[async_trait]
impl Provider for CircuitBreakerProvider {
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
        self.breaker.acquire()?;

        match self.inner.complete(ctx, request).await {
            Ok(response) => {
                self.breaker.record_success();
                Ok(response)
            }
            Err(error) => {
                self.breaker.record_failure();
                Err(error)
            }
        }
    }

    async fn stream(&self, ctx: &RequestContext, request: &Request) -> Result<EventStream, Error> {
        self.breaker.acquire()?;

        match self.inner.stream(ctx, request).await {
            Ok(stream) => {
                self.breaker.record_success();
                Ok(stream)
            }
            Err(error) => {
                self.breaker.record_failure();
                Err(error)
            }
        }
    }
}
