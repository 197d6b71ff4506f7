//! `OpenAI`-compatible provider adapter
//!
//! One adapter covers the `OpenAI` API itself and the URL-configurable
//! look-alikes (DeepSeek, Groq, Together, Ollama) that speak the same chat
//! dialect. Presets supply the base URL, default model, and declared model
//! list for the known names.

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
use crate::convert::openai::{ChatStreamState, decode_response, encode_request};
use crate::error::{ApiError, Error};
use crate::protocol::openai as wire;
use crate::types::{Event, EventStream, Request, Response};

/// Preset for a known chat-dialect service
struct Preset {
    base_url: &'static str,
    model: &'static str,
    models: &'static [&'static str],
}

const OPENAI: Preset = Preset {
    base_url: "https://api.openai.com/v1",
    model: "gpt-4.1-mini",
    models: &["gpt-4.1", "gpt-4.1-mini", "gpt-4.1-nano", "gpt-4o", "gpt-4o-mini", "o4-mini"],
};

const DEEPSEEK: Preset = Preset {
    base_url: "https://api.deepseek.com",
    model: "deepseek-chat",
    models: &["deepseek-chat", "deepseek-coder"],
};

const GROQ: Preset = Preset {
    base_url: "https://api.groq.com/openai/v1",
    model: "llama-3.3-70b-versatile",
    models: &["llama-3.3-70b-versatile", "llama-3.1-8b-instant", "mixtral-8x7b-32768"],
};

const TOGETHER: Preset = Preset {
    base_url: "https://api.together.xyz/v1",
    model: "meta-llama/Llama-3.3-70B-Instruct-Turbo",
    models: &[
        "meta-llama/Llama-3.3-70B-Instruct-Turbo",
        "mistralai/Mixtral-8x7B-Instruct-v0.1",
    ],
};

const OLLAMA: Preset = Preset {
    base_url: "http://localhost:11434/v1",
    model: "llama3.2",
    // Dynamic, depends on what's installed
    models: &[],
};

fn preset(name: &str) -> Option<&'static Preset> {
    match name {
        "openai" => Some(&OPENAI),
        "deepseek" => Some(&DEEPSEEK),
        "groq" => Some(&GROQ),
        "together" => Some(&TOGETHER),
        "ollama" => Some(&OLLAMA),
        _ => None,
    }
}

/// Provider for `OpenAI` and `OpenAI`-compatible chat APIs
pub struct OpenAiProvider {
    name: String,
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    model: String,
    models: Vec<String>,
}

impl OpenAiProvider {
    /// Create an adapter from configuration, filling gaps from the preset
    /// matching the configured name
    pub fn new(config: ProviderConfig) -> Self {
        let preset = preset(&config.name);

        let base_url = config
            .base_url
            .or_else(|| preset.map(|p| Url::parse(p.base_url).expect("valid preset URL")))
            .unwrap_or_else(|| Url::parse("https://api.openai.com/v1").expect("valid default URL"));

        let model = config
            .model
            .or_else(|| preset.map(|p| p.model.to_owned()))
            .unwrap_or_default();

        let models = if config.models.is_empty() {
            preset.map_or_else(Vec::new, |p| p.models.iter().map(|&m| m.to_owned()).collect())
        } else {
            config.models
        };

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Self {
            name: config.name,
            client: builder.build().unwrap_or_default(),
            base_url,
            api_key: config.api_key,
            model,
            models,
        }
    }

    /// Create an adapter reading its API key from the named environment
    /// variable
    pub fn from_env(name: impl Into<String>, env_var: &str) -> Self {
        let name = name.into();
        let mut config = ProviderConfig::named(name);
        config.api_key = std::env::var(env_var).ok().map(SecretString::from);
        Self::new(config)
    }

    /// Standard `OpenAI` provider
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new(ProviderConfig::named("openai").with_api_key(api_key))
    }

    /// DeepSeek provider
    pub fn deepseek(api_key: impl Into<String>) -> Self {
        Self::new(ProviderConfig::named("deepseek").with_api_key(api_key))
    }

    /// Groq provider
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self::new(ProviderConfig::named("groq").with_api_key(api_key))
    }

    /// Together AI provider
    pub fn together(api_key: impl Into<String>) -> Self {
        Self::new(ProviderConfig::named("together").with_api_key(api_key))
    }

    /// Ollama provider; the key is a placeholder since Ollama ignores it
    pub fn ollama(base_url: Option<Url>) -> Self {
        let mut config = ProviderConfig::named("ollama").with_api_key("ollama");
        config.base_url = base_url;
        Self::new(config)
    }

    fn resolve_model(&self, request: &Request) -> String {
        if request.model.is_empty() || request.model == self.name {
            self.model.clone()
        } else {
            request.model.clone()
        }
    }

    fn completions_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    async fn dispatch(&self, body: &wire::ChatRequest) -> Result<reqwest::Response, Error> {
        let mut builder = self.client.post(self.completions_url()).json(body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(provider = %self.name, error = %e, "upstream request failed");
            Error::from(ApiError::new(self.name.as_str(), e.to_string()))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(provider = %self.name, status = %status, "upstream returned error");

            let (message, kind) = match serde_json::from_str::<wire::ErrorResponse>(&body) {
                Ok(parsed) => (parsed.error.message, parsed.error.kind),
                Err(_) => (body, None),
            };
            return Err(ApiError::from_status(self.name.as_str(), status, message, kind).into());
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
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
                .json::<wire::ChatResponse>()
                .await
                .map_err(|e| ApiError::new(self.name.as_str(), format!("failed to decode response: {e}")).into())
        })
        .await?;

        Ok(decode_response(wire_response, &self.name))
    }

    async fn stream(&self, ctx: &RequestContext, request: &Request) -> Result<EventStream, Error> {
        let model = self.resolve_model(request);
        let body = encode_request(request, &model, true);

        let response = guard(ctx, self.dispatch(&body)).await?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let provider = self.name.clone();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            let mut frames = Box::pin(response.bytes_stream().eventsource());
            let mut state = ChatStreamState::new(model);

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
                            if data == "[DONE]" {
                                break;
                            }
                            match serde_json::from_str::<wire::ChatChunk>(data) {
                                Ok(chunk) => {
                                    for event in state.apply(&chunk) {
                                        if tx.send(event).await.is_err() {
                                            // Consumer went away
                                            return;
                                        }
                                    }
                                }
                                Err(error) => {
                                    tracing::debug!(provider = %provider, error = %error, "skipping unparseable stream chunk");
                                }
                            }
                        }
                        Some(Err(error)) => {
                            let _ = tx
                                .send(Event::Error {
                                    error: ApiError::new(provider.as_str(), error.to_string()).into(),
                                })
                                .await;
                            return;
                        }
                        None => break,
                    }
                }
            }

            let _ = tx.send(Event::Done { response: state.into_response(&provider) }).await;
        });

        Ok(rx)
    }
}
