//! Provider failover: one-shot substitution of the fallback route.
//!
//! A failed model call against any provider other than the fallback's is
//! retried exactly once on the fallback route. There is no second tier: if
//! the fallback fails too, its error is returned unchanged.

use std::future::Future;

use bonza_core::error::ProviderError;
use bonza_core::event::{AgentEvent, Observers};
use bonza_core::provider::ModelRoute;
use tracing::{info, warn};

/// Outcome of a call made through [`Failover`].
#[derive(Debug)]
pub struct Attempt<T> {
    pub value: T,
    /// The route that actually answered, when it was not the requested one.
    pub switched_to: Option<ModelRoute>,
}

/// Wraps model calls with a single fallback retry.
#[derive(Debug, Clone, Default)]
pub struct Failover {
    fallback: Option<ModelRoute>,
}

impl Failover {
    pub fn new(fallback: ModelRoute) -> Self {
        Self {
            fallback: Some(fallback),
        }
    }

    /// A wrapper that never substitutes; errors pass straight through.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn fallback(&self) -> Option<&ModelRoute> {
        self.fallback.as_ref()
    }

    /// Run `attempt` against `route`, retrying once on the fallback route.
    ///
    /// The closure receives the route to use so it can rebuild the request
    /// for that route's tool capability. Errors raised while consuming a
    /// stream inside the closure count as call failures too.
    pub async fn call<T, F, Fut>(
        &self,
        route: &ModelRoute,
        observers: &Observers,
        mut attempt: F,
    ) -> Result<Attempt<T>, ProviderError>
    where
        F: FnMut(ModelRoute) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let err = match attempt(route.clone()).await {
            Ok(value) => {
                return Ok(Attempt {
                    value,
                    switched_to: None,
                });
            }
            Err(e) => e,
        };

        let Some(fallback) = self
            .fallback
            .as_ref()
            .filter(|fb| fb.provider_name() != route.provider_name())
        else {
            warn!(provider = %route.provider_name(), error = %err, "Provider failed, no fallback left");
            return Err(err);
        };

        warn!(
            provider = %route.provider_name(),
            error = %err,
            fallback = %fallback.provider_name(),
            "Provider failed, falling back"
        );
        observers.emit(AgentEvent::Info(format!(
            "⚠️ {} unavailable ({}). Falling back to {}...",
            route.provider_name(),
            err.kind(),
            fallback.provider_name()
        )));

        let value = attempt(fallback.clone()).await?;
        info!(provider = %fallback.provider_name(), model = %fallback.model, "Fallback succeeded");

        Ok(Attempt {
            value,
            switched_to: Some(fallback.clone()),
        })
    }
}
