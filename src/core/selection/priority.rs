use super::{RandomStrategy, SelectionStrategy};
use crate::domain::RelayEndpoint;

/// Picks the candidate with the highest priority. Ties at the top are broken
/// at random.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriorityStrategy;

impl SelectionStrategy for PriorityStrategy {
    fn name(&self) -> &'static str {
        "priority"
    }

    fn select<'a>(&self, candidates: &'a [RelayEndpoint]) -> Option<&'a RelayEndpoint> {
        let top = candidates.iter().map(|relay| relay.priority).max()?;
        let tied: Vec<&'a RelayEndpoint> = candidates.iter().filter(|relay| relay.priority == top).collect();

        match tied.as_slice() {
            [only] => Some(*only),
            _ => {
                let index = RandomStrategy::index(tied.len())?;
                tied.get(index).copied()
            }
        }
    }
}
