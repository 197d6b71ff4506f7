//! Anthropic Messages API provider adapter

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use url::Url;

use super::{EVENT_BUFFER, Provider, guard};
use crate::config::ProviderConfig;
use crate::context::RequestContext;
use crate::convert::anthropic::{MessagesStreamState, decode_response, encode_request};
use crate::error::{ApiError, Error};
use crate::protocol::anthropic as wire;
use crate::types::{Event, EventStream, Request, Response};

/// Default API base URL
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model substituted when a request names none
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Models advertised to the router by default
const DEFAULT_MODELS: &[&str] = &[
    "claude-opus-4-20250514",
    "claude-sonnet-4-20250514",
    "claude-3-5-haiku-20241022",
    "claude-3-5-sonnet-20241022",
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
];

/// Provider for the Anthropic Messages API
pub struct AnthropicProvider {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    model: String,
    models: Vec<String>,
}

impl AnthropicProvider {
    /// Create an adapter from configuration
    pub fn new(config: ProviderConfig) -> Self {
        let base_url = config
            .base_url
            .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL).expect("valid default URL"));

        let models = if config.models.is_empty() {
            DEFAULT_MODELS.iter().map(|&m| m.to_owned()).collect()
        } else {
            config.models
        };

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Self {
            client: builder.build().unwrap_or_default(),
            base_url,
            api_key: config.api_key,
            model: config.model.unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            models,
        }
    }

    /// Create an adapter reading `ANTHROPIC_API_KEY` from the environment
    pub fn from_env() -> Self {
        let mut config = ProviderConfig::named("anthropic");
        config.api_key = std::env::var("ANTHROPIC_API_KEY").ok().map(SecretString::from);
        Self::new(config)
    }

    fn resolve_model(&self, request: &Request) -> String {
        if request.model.is_empty() || request.model == "anthropic" {
            self.model.clone()
        } else {
            request.model.clone()
        }
    }

    fn messages_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/messages")
    }

    async fn dispatch(&self, body: &wire::MessageRequest) -> Result<reqwest::Response, Error> {
        let mut builder = self
            .client
            .post(self.messages_url())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(provider = "anthropic", error = %e, "upstream request failed");
            Error::from(ApiError::new("anthropic", e.to_string()))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(provider = "anthropic", status = %status, "upstream returned error");

            let (message, kind) = match serde_json::from_str::<wire::ErrorResponse>(&body) {
                Ok(parsed) => (parsed.error.message, Some(parsed.error.kind)),
                Err(_) => (body, None),
            };
            return Err(ApiError::from_status("anthropic", status, message, kind).into());
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn complete(&self, ctx: &RequestContext, request: &Request) -> Result<Response, Error> {
        let model = self.resolve_model(request);
        let body = encode_request(request, &model, false);

        let wire_response = guard(ctx, async {
            let response = self.dispatch(&body).await?;
            response
                .json::<wire::MessageResponse>()
                .await
                .map_err(|e| ApiError::new("anthropic", format!("failed to decode response: {e}")).into())
        })
        .await?;

        Ok(decode_response(wire_response, self.name()))
    }

    async fn stream(&self, ctx: &RequestContext, request: &Request) -> Result<EventStream, Error> {
        let model = self.resolve_model(request);
        let body = encode_request(request, &model, true);

        let response = guard(ctx, self.dispatch(&body)).await?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let ctx = ctx.clone();

        tokio::spawn(async move {
            let mut frames = Box::pin(response.bytes_stream().eventsource());
            let mut state = MessagesStreamState::new();

            loop {
                tokio::select! {
                    _ = ctx.canceled() => {
                        let _ = tx.send(Event::Error { error: Error::Canceled }).await;
                        return;
                    }
                    frame = frames.next() => match frame {
                        Some(Ok(frame)) => {
                            let data = frame.data.trim();
                            if data.is_empty() {
                                continue;
                            }
                            match serde_json::from_str::<wire::StreamEvent>(data) {
                                Ok(stream_event) => {
                                    for event in state.apply(stream_event) {
                                        let terminal = event.is_terminal();
                                        if tx.send(event).await.is_err() || terminal {
                                            return;
                                        }
                                    }
                                    if state.is_done() {
                                        break;
                                    }
                                }
                                Err(error) => {
                                    tracing::debug!(provider = "anthropic", error = %error, "skipping unparseable stream event");
                                }
                            }
                        }
                        Some(Err(error)) => {
                            let _ = tx
                                .send(Event::Error { error: ApiError::new("anthropic", error.to_string()).into() })
                                .await;
                            return;
                        }
                        None => break,
                    }
                }
            }

            let _ = tx.send(Event::Done { response: state.into_response("anthropic") }).await;
        });

        Ok(rx)
    }
}
