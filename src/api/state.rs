use super::{email::Notifier, metrics::Metrics};
use crate::{
    auth::{CredentialVerifier, TokenManager},
    rate_limit::RateLimiter,
    store::Stores,
};
use std::sync::Arc;

/// Everything a request needs, built once at startup and shared as an `Extension`.
pub struct AppState {
    env: String,
    stores: Stores,
    tokens: TokenManager,
    credentials: CredentialVerifier,
    limiter: Arc<RateLimiter>,
    notifier: Notifier,
    metrics: Arc<Metrics>,
}

impl AppState {
    #[must_use]
    pub fn new(
        env: String,
        stores: Stores,
        credentials: CredentialVerifier,
        limiter: Arc<RateLimiter>,
        notifier: Notifier,
    ) -> Self {
        let tokens = TokenManager::new(stores.tokens.clone());
        Self {
            env,
            stores,
            tokens,
            credentials,
            limiter,
            notifier,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Replace the default, pool-less metrics registry.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Arc::new(metrics);
        self
    }

    #[must_use]
    pub fn env(&self) -> &str {
        &self.env
    }

    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialVerifier {
        &self.credentials
    }

    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        self.limiter.as_ref()
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}
