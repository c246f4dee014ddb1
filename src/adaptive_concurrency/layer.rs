use std::sync::Arc;

use tower::Layer;

use super::{
    AdaptiveConcurrencySettings, ConfigError, Limiter, OutcomeLogic,
    service::AdaptiveConcurrencyLimit,
};

/// Admits requests to the wrapped service through a shared, adaptively sized [`Limiter`].
///
/// Every service produced by this layer shares the same limiter, so a handler wrapped once and
/// cloned per connection is still limited as a whole.
#[derive(Debug, Clone)]
pub struct AdaptiveConcurrencyLimitLayer<L> {
    limiter: Arc<Limiter>,
    logic: L,
}

impl<L> AdaptiveConcurrencyLimitLayer<L> {
    pub const fn new(limiter: Arc<Limiter>, logic: L) -> Self {
        AdaptiveConcurrencyLimitLayer { limiter, logic }
    }

    /// Build a layer owning a fresh limiter.
    pub fn from_settings(
        settings: AdaptiveConcurrencySettings,
        logic: L,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(Arc::new(Limiter::new(settings)?), logic))
    }

    pub const fn limiter(&self) -> &Arc<Limiter> {
        &self.limiter
    }
}

impl<S, L: OutcomeLogic> Layer<S> for AdaptiveConcurrencyLimitLayer<L> {
    type Service = AdaptiveConcurrencyLimit<S, L>;

    fn layer(&self, service: S) -> Self::Service {
        AdaptiveConcurrencyLimit::new(service, Arc::clone(&self.limiter), self.logic.clone())
    }
}
