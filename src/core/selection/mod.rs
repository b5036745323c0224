//! Relay selection strategies.
//!
//! A strategy picks one relay from the enabled candidates handed to it by the
//! [`RelaySelectionService`](crate::core::selection_service::RelaySelectionService).
//! Strategies never fail: an empty candidate slice yields `None`.

pub mod priority;
pub mod random;
pub mod round_robin;
pub mod weighted;

use crate::domain::RelayEndpoint;
use std::sync::Arc;

pub use priority::PriorityStrategy;
pub use random::RandomStrategy;
pub use round_robin::RoundRobinStrategy;
pub use weighted::WeightedStrategy;

pub trait SelectionStrategy: Send + Sync + std::fmt::Debug {
    /// Name under which the strategy is registered and requested.
    fn name(&self) -> &'static str;

    /// Picks one candidate, or `None` when `candidates` is empty.
    fn select<'a>(&self, candidates: &'a [RelayEndpoint]) -> Option<&'a RelayEndpoint>;
}

/// The strategies shipped with the server, in registration order.
#[must_use]
pub fn builtin_strategies() -> Vec<Arc<dyn SelectionStrategy>> {
    vec![
        Arc::new(RoundRobinStrategy::new()),
        Arc::new(RandomStrategy),
        Arc::new(WeightedStrategy),
        Arc::new(PriorityStrategy),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::RelayEndpoint;

    pub(crate) fn relays(specs: &[(&str, u32, i32)]) -> Vec<RelayEndpoint> {
        specs
            .iter()
            .map(|(name, weight, priority)| {
                RelayEndpoint::new(*name, format!("{name}.example.com"), 587)
                    .with_weight(*weight)
                    .with_priority(*priority)
            })
            .collect()
    }
}
