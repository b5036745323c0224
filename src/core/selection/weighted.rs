use super::{RandomStrategy, SelectionStrategy};
use crate::domain::RelayEndpoint;
use rand::Rng;

/// Picks a candidate with probability proportional to its weight.
///
/// A zero-weight candidate is never chosen unless every weight is zero, in
/// which case the choice is uniform.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedStrategy;

impl WeightedStrategy {
    /// Walks the candidates and returns the first whose running weight
    /// reaches `ticket`, which must lie in `1..=total`.
    fn pick(candidates: &[RelayEndpoint], ticket: u64) -> Option<&RelayEndpoint> {
        let mut running = 0u64;
        candidates.iter().find(|relay| {
            running += u64::from(relay.weight);
            running >= ticket
        })
    }
}

impl SelectionStrategy for WeightedStrategy {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn select<'a>(&self, candidates: &'a [RelayEndpoint]) -> Option<&'a RelayEndpoint> {
        if candidates.is_empty() {
            return None;
        }

        let total: u64 = candidates.iter().map(|relay| u64::from(relay.weight)).sum();
        if total == 0 {
            return RandomStrategy.select(candidates);
        }

        let ticket = rand::thread_rng().gen_range(1..=total);
        Self::pick(candidates, ticket)
    }
}
