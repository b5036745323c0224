use crate::domain::RelayEndpoint;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::RwLock;
use uuid::Uuid;

/// Source of relay configuration.
#[async_trait]
pub trait RelayRegistry: Send + Sync + std::fmt::Debug {
    /// Enabled relays in the registry's natural order. The order must be
    /// stable across calls for round-robin rotation to be meaningful.
    async fn find_enabled(&self) -> Result<Vec<RelayEndpoint>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RelayEndpoint>>;
}

/// Fixed relay list held in memory, in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryRelayRegistry {
    relays: RwLock<Vec<RelayEndpoint>>,
}

impl InMemoryRelayRegistry {
    #[must_use]
    pub fn new(relays: Vec<RelayEndpoint>) -> Self {
        Self { relays: RwLock::new(relays) }
    }

    /// Adds or replaces a relay, keeping its original position on replace.
    pub fn upsert(&self, relay: RelayEndpoint) {
        let mut relays = self.relays.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        match relays.iter_mut().find(|existing| existing.id == relay.id) {
            Some(existing) => *existing = relay,
            None => relays.push(relay),
        }
    }

    /// Removes a relay. Returns whether it was present.
    pub fn remove(&self, id: Uuid) -> bool {
        let mut relays = self.relays.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = relays.len();
        relays.retain(|relay| relay.id != id);
        relays.len() != before
    }

    fn snapshot(&self) -> Vec<RelayEndpoint> {
        self.relays.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl RelayRegistry for InMemoryRelayRegistry {
    async fn find_enabled(&self) -> Result<Vec<RelayEndpoint>> {
        Ok(self.snapshot().into_iter().filter(|relay| relay.enabled).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RelayEndpoint>> {
        Ok(self.snapshot().into_iter().find(|relay| relay.id == id))
    }
}
