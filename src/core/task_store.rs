use crate::domain::{MailStatus, MailTask};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// Persistence for mail tasks.
#[async_trait]
pub trait TaskStore: Send + Sync + std::fmt::Debug {
    /// Inserts or fully overwrites the task.
    async fn save(&self, task: &MailTask) -> Result<()>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<MailTask>>;

    /// All tasks currently in `PENDING`, oldest first.
    async fn find_pending(&self) -> Result<Vec<MailTask>>;

    /// Pending tasks whose schedule is set and at or before `now`, earliest
    /// schedule first, at most `limit` of them.
    async fn find_due_pending_scheduled(&self, now: OffsetDateTime, limit: i64) -> Result<Vec<MailTask>>;

    /// Writes `task` only if the stored copy is still `PENDING`.
    ///
    /// This is the single read-then-write that keeps two dispatchers from
    /// sending the same task. Returns `false` when the claim was lost.
    async fn claim_for_processing(&self, task: &MailTask) -> Result<bool>;

    /// Writes the reset `task` only if the stored copy is resendable, see
    /// [`MailTask::is_resendable`]. Returns `false` when it is not, which
    /// keeps a resend from reopening an attempt that is still in flight.
    async fn reset_for_resend(&self, task: &MailTask, stale_before: OffsetDateTime) -> Result<bool>;
}

/// Process-local task store.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<Uuid, MailTask>,
}

impl InMemoryTaskStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save(&self, task: &MailTask) -> Result<()> {
        self.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<MailTask>> {
        Ok(self.tasks.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_pending(&self) -> Result<Vec<MailTask>> {
        let mut pending: Vec<MailTask> = self
            .tasks
            .iter()
            .filter(|entry| entry.status == MailStatus::Pending)
            .map(|entry| entry.value().clone())
            .collect();
        pending.sort_by_key(|task| (task.created_at, task.id));
        Ok(pending)
    }

    async fn find_due_pending_scheduled(&self, now: OffsetDateTime, limit: i64) -> Result<Vec<MailTask>> {
        let mut due: Vec<MailTask> = self
            .tasks
            .iter()
            .filter(|entry| entry.status == MailStatus::Pending && entry.scheduled_at.is_some_and(|at| at <= now))
            .map(|entry| entry.value().clone())
            .collect();
        due.sort_by_key(|task| (task.scheduled_at, task.id));
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }

    async fn claim_for_processing(&self, task: &MailTask) -> Result<bool> {
        // The entry guard holds the shard lock across the check and the write
        match self.tasks.get_mut(&task.id) {
            Some(mut stored) if stored.status == MailStatus::Pending => {
                *stored = task.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reset_for_resend(&self, task: &MailTask, stale_before: OffsetDateTime) -> Result<bool> {
        match self.tasks.get_mut(&task.id) {
            Some(mut stored) if stored.is_resendable(stale_before) => {
                *stored = task.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Mailbox;
    use time::Duration;

    fn task(scheduled_at: Option<OffsetDateTime>) -> MailTask {
        let mut task =
            MailTask::new(Mailbox::new("a@example.com", None), Mailbox::new("b@example.com", None), "s", "b");
        task.scheduled_at = scheduled_at;
        task
    }

    #[tokio::test]
    async fn test_due_query_filters_and_orders() {
        let store = InMemoryTaskStore::new();
        let now = OffsetDateTime::now_utc();

        let later = task(Some(now - Duration::minutes(1)));
        let earlier = task(Some(now - Duration::minutes(5)));
        let exactly_now = task(Some(now));
        let future = task(Some(now + Duration::minutes(5)));
        let unscheduled = task(None);
        let mut failed = task(Some(now - Duration::minutes(10)));
        failed.mark_failed("x", now);

        for t in [&later, &earlier, &exactly_now, &future, &unscheduled, &failed] {
            store.save(t).await.expect("save");
        }

        let due = store.find_due_pending_scheduled(now, 100).await.expect("query");
        let ids: Vec<Uuid> = due.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![earlier.id, later.id, exactly_now.id]);

        let limited = store.find_due_pending_scheduled(now, 1).await.expect("query");
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_claim_only_succeeds_once() {
        let store = InMemoryTaskStore::new();
        let mut t = task(None);
        store.save(&t).await.expect("save");

        t.mark_processing(OffsetDateTime::now_utc());
        assert!(store.claim_for_processing(&t).await.expect("claim"));
        assert!(!store.claim_for_processing(&t).await.expect("claim"));

        let unknown = task(None);
        assert!(!store.claim_for_processing(&unknown).await.expect("claim"));
    }

    #[tokio::test]
    async fn test_reset_refuses_task_in_flight() {
        let store = InMemoryTaskStore::new();
        let now = OffsetDateTime::now_utc();
        let stale_before = now - Duration::minutes(15);
        let mut t = task(None);
        t.mark_processing(now);
        store.save(&t).await.expect("save");

        let mut reset = t.clone();
        reset.reset_for_resend(now);
        assert!(!store.reset_for_resend(&reset, stale_before).await.expect("reset"));
        assert_eq!(store.find_by_id(t.id).await.expect("query").map(|s| s.status), Some(MailStatus::Processing));

        t.mark_failed("relay refused", now);
        store.save(&t).await.expect("save");
        assert!(store.reset_for_resend(&reset, stale_before).await.expect("reset"));
        assert!(!store.reset_for_resend(&reset, stale_before).await.expect("reset"));
    }
}
