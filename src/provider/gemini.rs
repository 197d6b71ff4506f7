//! Google Generative Language (Gemini) provider adapter
//!
//! Talks to the REST API directly: `generateContent` for single-shot calls
//! and `streamGenerateContent?alt=sse` for streaming.

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
use crate::convert::gemini::{GenerateStreamState, decode_response, encode_request};
use crate::error::{ApiError, Error};
use crate::protocol::gemini as wire;
use crate::types::{Event, EventStream, Request, Response};

/// Default API base URL
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model substituted when a request names none
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Models advertised to the router by default
const DEFAULT_MODELS: &[&str] = &[
    "gemini-1.5-pro",
    "gemini-1.5-flash",
    "gemini-2.0-flash-exp",
    "gemini-1.0-pro",
];

/// Provider for the Google Generative Language API
pub struct GeminiProvider {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    model: String,
    models: Vec<String>,
}

impl GeminiProvider {
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

    /// Create an adapter reading `GEMINI_API_KEY` from the environment
    pub fn from_env() -> Self {
        let mut config = ProviderConfig::named("gemini");
        config.api_key = std::env::var("GEMINI_API_KEY").ok().map(SecretString::from);
        Self::new(config)
    }

    fn resolve_model(&self, request: &Request) -> String {
        if request.model.is_empty() || request.model == "gemini" {
            self.model.clone()
        } else {
            request.model.clone()
        }
    }

    fn generate_url(&self, model: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/models/{model}:generateContent")
    }

    fn stream_url(&self, model: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/models/{model}:streamGenerateContent?alt=sse")
    }

    async fn dispatch(&self, url: String, body: &wire::GenerateRequest) -> Result<reqwest::Response, Error> {
        let mut builder = self.client.post(url).json(body);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-goog-api-key", key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(provider = "gemini", error = %e, "upstream request failed");
            Error::from(ApiError::new("gemini", e.to_string()))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(provider = "gemini", status = %status, "upstream returned error");

            let (message, kind) = match serde_json::from_str::<wire::ErrorResponse>(&body) {
                Ok(parsed) => (parsed.error.message, Some(parsed.error.status)),
                Err(_) => (body, None),
            };
            return Err(ApiError::from_status("gemini", status, message, kind).into());
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn complete(&self, ctx: &RequestContext, request: &Request) -> Result<Response, Error> {
        let model = self.resolve_model(request);
        let body = encode_request(request);

        let wire_response = guard(ctx, async {
            let response = self.dispatch(self.generate_url(&model), &body).await?;
            response
                .json::<wire::GenerateResponse>()
                .await
                .map_err(|e| ApiError::new("gemini", format!("failed to decode response: {e}")).into())
        })
        .await?;

        Ok(decode_response(wire_response, &model, self.name()))
    }

    async fn stream(&self, ctx: &RequestContext, request: &Request) -> Result<EventStream, Error> {
        let model = self.resolve_model(request);
        let body = encode_request(request);

        let response = guard(ctx, self.dispatch(self.stream_url(&model), &body)).await?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let ctx = ctx.clone();

        tokio::spawn(async move {
            let mut frames = Box::pin(response.bytes_stream().eventsource());
            let mut state = GenerateStreamState::new(model);

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
                            match serde_json::from_str::<wire::GenerateResponse>(data) {
                                Ok(chunk) => {
                                    for event in state.apply(&chunk) {
                                        if tx.send(event).await.is_err() {
                                            return;
                                        }
                                    }
                                }
                                Err(error) => {
                                    tracing::debug!(provider = "gemini", error = %error, "skipping unparseable stream chunk");
                                }
                            }
                        }
                        Some(Err(error)) => {
                            let _ = tx
                                .send(Event::Error { error: ApiError::new("gemini", error.to_string()).into() })
                                .await;
                            return;
                        }
                        None => break,
                    }
                }
            }

            let _ = tx.send(Event::Done { response: state.into_response("gemini") }).await;
        });

        Ok(rx)
    }
}
