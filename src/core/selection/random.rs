use super::SelectionStrategy;
use crate::domain::RelayEndpoint;
use rand::Rng;

/// Picks a uniformly random candidate on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomStrategy;

impl RandomStrategy {
    /// Uniform index into a collection of `len` items.
    pub(crate) fn index(len: usize) -> Option<usize> {
        (len > 0).then(|| rand::thread_rng().gen_range(0..len))
    }
}

impl SelectionStrategy for RandomStrategy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn select<'a>(&self, candidates: &'a [RelayEndpoint]) -> Option<&'a RelayEndpoint> {
        candidates.get(Self::index(candidates.len())?)
    }
}
