use tokio_util::sync::CancellationToken;

/// Cancellation context carried with every router call
///
/// Wraps a caller-owned [`CancellationToken`] that propagates through the
/// middleware chain and into the provider adapters. Middleware derive child
/// contexts bounded by the caller's signal; they never create unrelated
/// roots. Adapters watch the token at every suspension point and abort
/// promptly when it fires.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
}

impl RequestContext {
    /// Create a context that is only canceled explicitly
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context driven by an existing token
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Derive a child context that is canceled when this one is
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
        }
    }

    /// The underlying cancellation token
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the cancellation signal has fired
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the cancellation signal fires
    pub async fn canceled(&self) {
        self.cancel.cancelled().await;
    }
}
