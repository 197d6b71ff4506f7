use std::time::Duration;

use secrecy::SecretString;
use url::Url;

/// Common configuration accepted by every provider adapter
///
/// All fields are optional; each adapter fills gaps from its preset (base
/// URL, default model, declared model list).
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    /// Registry name, also used to select an `OpenAI`-compatible preset
    pub name: String,
    /// API key; adapters send it only at the transport boundary
    pub api_key: Option<SecretString>,
    /// Base URL override for self-hosted or proxied deployments
    pub base_url: Option<Url>,
    /// Default model substituted when a request names none
    pub model: Option<String>,
    /// Declared model list advertised to the router (empty = accept any)
    pub models: Vec<String>,
    /// Per-request timeout applied at the HTTP client level
    pub timeout: Option<Duration>,
}

impl ProviderConfig {
    /// Start a config with just a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    /// Set the base URL
    pub fn with_base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Set the default model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the declared model list
    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
