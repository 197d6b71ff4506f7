//! Provider registry, model resolution, and wrapper-chain composition

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::context::RequestContext;
use crate::error::Error;
use crate::middleware::Middleware;
use crate::provider::Provider;
use crate::types::{EventStream, Request, Response};

/// Routes canonical requests to registered providers
///
/// Resolution order for a request's model `M`:
/// 1. empty registry fails with [`Error::NoProviders`];
/// 2. an explicit model mapping naming a registered provider wins;
/// 3. `M` equal to a registered provider name addresses that provider
///    directly (the adapter substitutes its default model);
/// 4. otherwise the first provider declaring `M` in its model list wins,
///    scan order unspecified;
/// 5. otherwise the call fails with [`Error::UnknownModel`].
///
/// Registered middleware wrap the resolved provider per call, first
/// registered outermost. The provider name in the returned response is
/// always the resolved provider's own; wrappers never alter it.
#[derive(Default)]
pub struct Router {
    state: RwLock<RouterState>,
}

#[derive(Default)]
struct RouterState {
    providers: HashMap<String, Arc<dyn Provider>>,
    model_map: HashMap<String, String>,
    /// Ordered fallback providers; reserved, not consulted by resolution
    fallbacks: Vec<String>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Router {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building a router
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Register a provider under a name
    pub fn register_provider(&self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.write().providers.insert(name.into(), provider);
    }

    /// Map a model name to a provider name
    pub fn map_model(&self, model: impl Into<String>, provider: impl Into<String>) {
        self.write().model_map.insert(model.into(), provider.into());
    }

    /// Set the fallback provider order
    pub fn set_fallbacks<I, S>(&self, providers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.write().fallbacks = providers.into_iter().map(Into::into).collect();
    }

    /// Append a middleware to the chain
    pub fn add_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.write().middleware.push(middleware);
    }

    /// Names of all registered providers, in unspecified order
    pub fn providers(&self) -> Vec<String> {
        self.read().providers.keys().cloned().collect()
    }

    /// Look up a registered provider by name
    pub fn provider(&self, name: &str) -> Result<Arc<dyn Provider>, Error> {
        self.read()
            .providers
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| Error::UnknownProvider(name.to_owned()))
    }

    /// Perform a single-shot completion against the resolved provider
    pub async fn complete(&self, ctx: &RequestContext, request: &Request) -> Result<Response, Error> {
        if ctx.is_canceled() {
            return Err(Error::Canceled);
        }

        let (provider, middleware) = self.resolve(&request.model)?;
        let chained = build_chain(provider, &middleware);
        chained.complete(ctx, request).await
    }

    /// Perform a streaming completion against the resolved provider
    ///
    /// The returned channel is closed by the producer after a terminal
    /// event; construction failures return synchronously with no channel.
    pub async fn stream(&self, ctx: &RequestContext, request: &Request) -> Result<EventStream, Error> {
        if ctx.is_canceled() {
            return Err(Error::Canceled);
        }

        let (provider, middleware) = self.resolve(&request.model)?;
        let chained = build_chain(provider, &middleware);
        chained.stream(ctx, request).await
    }

    fn resolve(&self, model: &str) -> Result<(Arc<dyn Provider>, Vec<Arc<dyn Middleware>>), Error> {
        let state = self.read();

        if state.providers.is_empty() {
            return Err(Error::NoProviders);
        }

        if let Some(name) = state.model_map.get(model)
            && let Some(provider) = state.providers.get(name)
        {
            return Ok((Arc::clone(provider), state.middleware.clone()));
        }

        if let Some(provider) = state.providers.get(model) {
            return Ok((Arc::clone(provider), state.middleware.clone()));
        }

        for provider in state.providers.values() {
            if provider.models().iter().any(|m| m == model) {
                return Ok((Arc::clone(provider), state.middleware.clone()));
            }
        }

        Err(Error::UnknownModel(model.to_owned()))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RouterState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RouterState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wrap the resolved provider, first-registered middleware outermost
fn build_chain(provider: Arc<dyn Provider>, middleware: &[Arc<dyn Middleware>]) -> Arc<dyn Provider> {
    let mut chained = provider;
    for layer in middleware.iter().rev() {
        chained = layer.wrap(chained);
    }
    chained
}

/// One-shot construction of a [`Router`]
#[derive(Default)]
pub struct RouterBuilder {
    state: RouterState,
}

impl RouterBuilder {
    /// Register a provider under a name
    pub fn provider(mut self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        self.state.providers.insert(name.into(), provider);
        self
    }

    /// Map a model name to a provider name
    pub fn model(mut self, model: impl Into<String>, provider: impl Into<String>) -> Self {
        self.state.model_map.insert(model.into(), provider.into());
        self
    }

    /// Set the fallback provider order
    pub fn fallbacks<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.fallbacks = providers.into_iter().map(Into::into).collect();
        self
    }

    /// Append a middleware to the chain
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.state.middleware.push(middleware);
        self
    }

    /// Finish building
    pub fn build(self) -> Router {
        Router {
            state: RwLock::new(self.state),
        }
    }
}
