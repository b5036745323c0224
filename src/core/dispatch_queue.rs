use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Lease-based work queue of task ids.
///
/// Delivery is at-least-once: a leased id that is never acked becomes
/// visible again once its visibility timeout expires.
#[async_trait]
pub trait DispatchQueue: Send + Sync + std::fmt::Debug {
    /// Makes the id visible to workers immediately.
    ///
    /// # Errors
    /// Returns an error if the queue backend is unavailable.
    async fn enqueue(&self, task_id: Uuid) -> anyhow::Result<()>;

    /// Claims up to `limit` visible ids and hides them for `visibility_timeout`.
    ///
    /// # Errors
    /// Returns an error if the queue backend is unavailable.
    async fn lease(&self, limit: usize, visibility_timeout: Duration) -> anyhow::Result<Vec<Uuid>>;

    /// Removes the id for good.
    ///
    /// # Errors
    /// Returns an error if the queue backend is unavailable.
    async fn ack(&self, task_id: Uuid) -> anyhow::Result<()>;
}

/// Process-local queue used when no Redis is configured.
#[derive(Debug, Default)]
pub struct InMemoryDispatchQueue {
    // task id -> instant at which it becomes visible
    jobs: DashMap<Uuid, Instant>,
}

impl InMemoryDispatchQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    #[must_use]
    pub fn contains(&self, task_id: Uuid) -> bool {
        self.jobs.contains_key(&task_id)
    }
}

#[async_trait]
impl DispatchQueue for InMemoryDispatchQueue {
    async fn enqueue(&self, task_id: Uuid) -> anyhow::Result<()> {
        // An id already queued or leased keeps its current visibility
        self.jobs.entry(task_id).or_insert_with(Instant::now);
        Ok(())
    }

    async fn lease(&self, limit: usize, visibility_timeout: Duration) -> anyhow::Result<Vec<Uuid>> {
        let now = Instant::now();
        let mut claimed = Vec::new();
        for mut job in self.jobs.iter_mut() {
            if claimed.len() >= limit {
                break;
            }
            if *job.value() <= now {
                *job.value_mut() = now + visibility_timeout;
                claimed.push(*job.key());
            }
        }
        Ok(claimed)
    }

    async fn ack(&self, task_id: Uuid) -> anyhow::Result<()> {
        self.jobs.remove(&task_id);
        Ok(())
    }
}
