use reqwest::StatusCode;
use thiserror::Error as ThisError;

/// Errors produced by the router, middleware, and provider adapters
#[derive(Debug, ThisError)]
pub enum Error {
    /// No providers are registered with the router
    #[error("no providers registered")]
    NoProviders,

    /// Model resolution failed against every registered provider
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// A provider was referenced by a name that is not registered
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// The request was malformed or rejected by the backend (HTTP 400)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The backend rejected the credentials (HTTP 401 / 403)
    #[error("authentication failed")]
    AuthFailed,

    /// The backend throttled the request (HTTP 429)
    #[error("rate limited")]
    RateLimited,

    /// The backend failed (HTTP 5xx) or the transport broke
    #[error("provider error: {0}")]
    Provider(String),

    /// The circuit breaker gated the call without contacting the backend
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// The retry middleware exhausted its attempts
    #[error("max retries exceeded: {0}")]
    MaxRetriesExceeded(#[source] Box<Error>),

    /// A stream terminated before delivering its final event
    #[error("stream closed unexpectedly")]
    StreamClosed,

    /// The caller's cancellation signal fired (or a derived deadline expired)
    #[error("request canceled")]
    Canceled,

    /// A backend API error carrying provider, status, and cause details
    #[error(transparent)]
    Api(#[from] Box<ApiError>),
}

/// Error envelope for failures reported by a remote provider API
///
/// The `cause` field holds the canonical sentinel matching the HTTP status
/// category when one applies, so callers classify by variant rather than by
/// message text.
#[derive(Debug, ThisError)]
#[error("{provider}: {message}")]
pub struct ApiError {
    /// Name of the provider that produced the error
    pub provider: String,
    /// HTTP status code, when the backend got far enough to return one
    pub status: Option<StatusCode>,
    /// Human-readable message from the backend or transport
    pub message: String,
    /// Backend-reported error type, when present in the error body
    pub kind: Option<String>,
    /// Canonical sentinel matching the status category
    #[source]
    pub cause: Option<Box<Error>>,
}

impl ApiError {
    /// Wrap a transport-level failure with no HTTP status
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            status: None,
            message: message.into(),
            kind: None,
            cause: None,
        }
    }

    /// Wrap a non-success HTTP status, attaching the matching sentinel
    pub fn from_status(
        provider: impl Into<String>,
        status: StatusCode,
        message: impl Into<String>,
        kind: Option<String>,
    ) -> Self {
        let message = message.into();
        let cause = match status.as_u16() {
            400 => Some(Error::InvalidRequest(message.clone())),
            401 | 403 => Some(Error::AuthFailed),
            429 => Some(Error::RateLimited),
            s if s >= 500 => Some(Error::Provider(message.clone())),
            _ => None,
        };

        Self {
            provider: provider.into(),
            status: Some(status),
            message,
            kind,
            cause: cause.map(Box::new),
        }
    }
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        Self::Api(Box::new(err))
    }
}

impl Error {
    /// Whether a retry of the failed call could plausibly succeed
    ///
    /// This is the default retry classifier: cancellation, auth failures,
    /// and invalid requests never retry; rate limiting and server-side
    /// failures do; unknown errors default to retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Canceled
            | Self::AuthFailed
            | Self::InvalidRequest(_)
            | Self::NoProviders
            | Self::UnknownModel(_)
            | Self::UnknownProvider(_)
            | Self::CircuitOpen
            | Self::StreamClosed
            | Self::MaxRetriesExceeded(_) => false,
            Self::RateLimited | Self::Provider(_) => true,
            Self::Api(api) => {
                if let Some(cause) = &api.cause {
                    return cause.is_retryable();
                }
                match api.status {
                    Some(status) if status == StatusCode::TOO_MANY_REQUESTS => true,
                    Some(status) if status.is_server_error() => true,
                    Some(status) if status.is_client_error() => false,
                    _ => true,
                }
            }
        }
    }

    /// Whether the error indicates backend throttling
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited => true,
            Self::Api(api) => {
                api.status == Some(StatusCode::TOO_MANY_REQUESTS)
                    || api
                        .cause
                        .as_ref()
                        .is_some_and(|cause| matches!(**cause, Self::RateLimited))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_maps_to_sentinel_cause() {
        let err = ApiError::from_status("openai", StatusCode::UNAUTHORIZED, "nope", None);
        assert!(matches!(err.cause.as_deref(), Some(Error::AuthFailed)));

        let err = ApiError::from_status("openai", StatusCode::TOO_MANY_REQUESTS, "slow", None);
        assert!(matches!(err.cause.as_deref(), Some(Error::RateLimited)));

        let err = ApiError::from_status("openai", StatusCode::BAD_GATEWAY, "down", None);
        assert!(matches!(err.cause.as_deref(), Some(Error::Provider(_))));

        let err = ApiError::from_status("openai", StatusCode::BAD_REQUEST, "bad", None);
        assert!(matches!(err.cause.as_deref(), Some(Error::InvalidRequest(_))));
    }

    #[test]
    fn retry_classifier() {
        assert!(!Error::Canceled.is_retryable());
        assert!(!Error::AuthFailed.is_retryable());
        assert!(!Error::InvalidRequest("bad".into()).is_retryable());
        assert!(!Error::CircuitOpen.is_retryable());
        assert!(Error::RateLimited.is_retryable());
        assert!(Error::Provider("boom".into()).is_retryable());

        let api: Error = ApiError::from_status("p", StatusCode::SERVICE_UNAVAILABLE, "x", None).into();
        assert!(api.is_retryable());

        let api: Error = ApiError::from_status("p", StatusCode::FORBIDDEN, "x", None).into();
        assert!(!api.is_retryable());

        // Transport failure with no status defaults to retryable
        let api: Error = ApiError::new("p", "connection reset").into();
        assert!(api.is_retryable());
    }

    #[test]
    fn rate_limit_detection() {
        assert!(Error::RateLimited.is_rate_limited());
        let api: Error = ApiError::from_status("p", StatusCode::TOO_MANY_REQUESTS, "x", None).into();
        assert!(api.is_rate_limited());
        assert!(!Error::AuthFailed.is_rate_limited());
    }

    #[test]
    fn max_retries_preserves_last_error() {
        let err = Error::MaxRetriesExceeded(Box::new(Error::RateLimited));
        assert!(err.to_string().contains("rate limited"));
        assert!(!err.is_retryable());
    }
}
