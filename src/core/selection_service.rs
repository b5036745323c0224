use crate::core::relay_registry::RelayRegistry;
use crate::core::selection::SelectionStrategy;
use crate::domain::RelayEndpoint;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Chooses a relay for a task by running a named strategy over the enabled
/// relays.
///
/// Strategies are registered once at construction. When the requested name is
/// unknown the default strategy is used; when no strategy is registered at all
/// the first candidate wins.
#[derive(Clone, Debug)]
pub struct RelaySelectionService {
    registry: Arc<dyn RelayRegistry>,
    strategies: Arc<HashMap<&'static str, Arc<dyn SelectionStrategy>>>,
    default_strategy: String,
}

impl RelaySelectionService {
    #[must_use]
    pub fn new(
        registry: Arc<dyn RelayRegistry>,
        strategies: Vec<Arc<dyn SelectionStrategy>>,
        default_strategy: &str,
    ) -> Self {
        let first_registered = strategies.first().map(|s| s.name());

        let default_strategy = if strategies.iter().any(|s| s.name() == default_strategy) {
            default_strategy.to_string()
        } else if let Some(first) = first_registered {
            tracing::warn!(
                configured = %default_strategy,
                substitute = %first,
                "Default relay strategy is not registered, using the first registered strategy"
            );
            first.to_string()
        } else {
            tracing::warn!("No relay selection strategies registered, the first enabled relay will always be used");
            default_strategy.to_string()
        };

        let strategies = strategies.into_iter().map(|s| (s.name(), s)).collect();

        Self { registry, strategies: Arc::new(strategies), default_strategy }
    }

    #[must_use]
    pub fn default_strategy(&self) -> &str {
        &self.default_strategy
    }

    /// Selects a relay using `strategy`, or the default when `None` or blank.
    ///
    /// Returns `Ok(None)` when no relay is enabled.
    ///
    /// # Errors
    /// Returns an error if the relay registry cannot be read.
    #[tracing::instrument(level = "debug", skip(self), fields(relay = tracing::field::Empty))]
    pub async fn select_relay(&self, strategy: Option<&str>) -> Result<Option<RelayEndpoint>> {
        let requested = strategy.map(str::trim).filter(|name| !name.is_empty()).unwrap_or(&self.default_strategy);

        let candidates = self.registry.find_enabled().await?;
        if candidates.is_empty() {
            tracing::debug!("No enabled relays");
            return Ok(None);
        }

        let selected = match self.strategies.get(requested) {
            Some(strategy) => strategy.select(&candidates),
            None => match self.strategies.get(self.default_strategy.as_str()) {
                Some(fallback) => {
                    tracing::debug!(requested = %requested, fallback = %fallback.name(), "Unknown relay strategy");
                    fallback.select(&candidates)
                }
                None => candidates.first(),
            },
        };

        if let Some(relay) = selected {
            tracing::Span::current().record("relay", relay.name.as_str());
        }
        Ok(selected.cloned())
    }
}
