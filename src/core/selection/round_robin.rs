use super::SelectionStrategy;
use crate::domain::RelayEndpoint;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Cycles through the candidates in order.
///
/// The cursor belongs to this instance. It assumes the candidate order is
/// stable between calls; when the set changes the cursor keeps counting and
/// simply lands on whatever now occupies that slot.
#[derive(Debug, Default)]
pub struct RoundRobinStrategy {
    cursor: AtomicUsize,
}

impl RoundRobinStrategy {
    #[must_use]
    pub const fn new() -> Self {
        Self { cursor: AtomicUsize::new(0) }
    }
}

impl SelectionStrategy for RoundRobinStrategy {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn select<'a>(&self, candidates: &'a [RelayEndpoint]) -> Option<&'a RelayEndpoint> {
        if candidates.is_empty() {
            return None;
        }
        let position = self.cursor.fetch_add(1, Ordering::Relaxed);
        candidates.get(position % candidates.len())
    }
}
