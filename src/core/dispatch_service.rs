use crate::config::MailConfig;
use crate::core::dispatch_queue::DispatchQueue;
use crate::core::relay_registry::RelayRegistry;
use crate::core::selection_service::RelaySelectionService;
use crate::core::task_store::TaskStore;
use crate::core::transport::MailTransport;
use crate::domain::mail_task::DELIVERY_FAILED_MESSAGE;
use crate::domain::{AttachmentSource, MailTask, Mailbox, SendOptions};
use crate::error::{AppError, Result};
use futures::FutureExt;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::panic::AssertUnwindSafe;
use std::path::Component;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    sent: Counter<u64>,
    failed: Counter<u64>,
    enqueued: Counter<u64>,
    scheduled_dispatched: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("courier-server");
        Self {
            sent: meter.u64_counter("mail_sent_total").with_description("Total number of mails delivered").build(),
            failed: meter
                .u64_counter("mail_failed_total")
                .with_description("Total number of delivery attempts that ended in FAILED")
                .build(),
            enqueued: meter
                .u64_counter("mail_enqueued_total")
                .with_description("Total number of tasks handed to the dispatch queue")
                .build(),
            scheduled_dispatched: meter
                .u64_counter("mail_scheduled_dispatched_total")
                .with_description("Total number of scheduled tasks dispatched by the sweep")
                .build(),
        }
    }
}

/// What happened to a task pulled from the dispatch queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Failed,
    /// The task was not dispatchable (already handled, or not due yet).
    Skipped,
}

/// Creates mail tasks and drives them through
/// `PENDING -> PROCESSING -> SENT | FAILED`.
#[derive(Clone, Debug)]
pub struct DispatchService {
    store: Arc<dyn TaskStore>,
    relays: Arc<dyn RelayRegistry>,
    selection: RelaySelectionService,
    transport: Arc<dyn MailTransport>,
    queue: Arc<dyn DispatchQueue>,
    config: MailConfig,
    metrics: Metrics,
}

impl DispatchService {
    #[must_use]
    pub fn new(
        store: Arc<dyn TaskStore>,
        relays: Arc<dyn RelayRegistry>,
        selection: RelaySelectionService,
        transport: Arc<dyn MailTransport>,
        queue: Arc<dyn DispatchQueue>,
        config: MailConfig,
    ) -> Self {
        Self { store, relays, selection, transport, queue, config, metrics: Metrics::new() }
    }

    /// Creates a task and dispatches it now unless it is scheduled for later.
    ///
    /// The id is returned whatever the delivery outcome; callers look the
    /// task up to learn its status.
    ///
    /// # Errors
    /// Returns `AppError::Validation` if the request is malformed.
    /// Returns `AppError::Database` if the task cannot be persisted.
    #[tracing::instrument(skip(self, body, options), fields(task_id = tracing::field::Empty))]
    pub async fn send(&self, recipient: &str, subject: &str, body: &str, options: SendOptions) -> Result<Uuid> {
        let task = self.build_task(recipient, subject, body, options);
        self.create_and_dispatch(task).await
    }

    /// Like [`send`](Self::send), with the task bound to one relay that
    /// overrides any selection strategy.
    ///
    /// # Errors
    /// Returns `AppError::RelayNotFound` if `relay_id` does not exist.
    /// Returns `AppError::Validation` if the request is malformed.
    /// Returns `AppError::Database` if the task cannot be persisted.
    #[tracing::instrument(skip(self, body, options), fields(task_id = tracing::field::Empty))]
    pub async fn send_with_relay(
        &self,
        relay_id: Uuid,
        recipient: &str,
        subject: &str,
        body: &str,
        options: SendOptions,
    ) -> Result<Uuid> {
        let relay = self.relays.find_by_id(relay_id).await?.ok_or(AppError::RelayNotFound(relay_id))?;

        let mut task = self.build_task(recipient, subject, body, options);
        task.relay_id = Some(relay.id);
        self.create_and_dispatch(task).await
    }

    /// Runs one delivery attempt for a pending task.
    ///
    /// Never fails: every fault ends with the task in `FAILED` and `false`
    /// returned. Also returns `false` without touching the task when another
    /// dispatcher already claimed it.
    #[tracing::instrument(skip(self, task), fields(task_id = %task.id))]
    pub async fn send_now(&self, task: &mut MailTask) -> bool {
        self.try_attempt(task).await.unwrap_or(false)
    }

    /// Resets a failed task to `PENDING` and dispatches it again.
    ///
    /// A task left in `PROCESSING` for longer than `stale_processing_secs`
    /// counts as failed. Returns whether the task was delivered (sync mode)
    /// or enqueued (async mode).
    ///
    /// # Errors
    /// Returns `AppError::MailTaskNotFound` if `task_id` does not exist.
    /// Returns `AppError::NotResendable` if the task is pending, sent, or
    /// still being delivered.
    /// Returns `AppError::Database` if the reset cannot be persisted.
    #[tracing::instrument(skip(self))]
    pub async fn resend_failed_mail(&self, task_id: Uuid) -> Result<bool> {
        let mut task = self.find_task(task_id).await?;
        let previous_status = task.status;

        let now = OffsetDateTime::now_utc();
        let stale_after = Duration::seconds(i64::try_from(self.config.stale_processing_secs).unwrap_or(i64::MAX));
        let stale_before = now.checked_sub(stale_after).unwrap_or(OffsetDateTime::UNIX_EPOCH);

        task.reset_for_resend(now);
        if !self.store.reset_for_resend(&task, stale_before).await? {
            tracing::info!(status = %previous_status, "Mail task is not resendable");
            return Err(AppError::NotResendable(task_id));
        }

        tracing::info!(previous_status = %previous_status, "Resending mail task");
        Ok(self.dispatch(&mut task).await.unwrap_or(false))
    }

    /// Dispatches every scheduled task that has come due. Returns how many
    /// were dispatched.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the due tasks cannot be queried.
    #[tracing::instrument(skip(self), fields(dispatched = tracing::field::Empty))]
    pub async fn process_scheduled_tasks(&self) -> Result<usize> {
        let now = OffsetDateTime::now_utc();
        let due = self.store.find_due_pending_scheduled(now, self.config.sweep_batch_size).await?;

        let mut dispatched = 0;
        for mut task in due {
            // The query already filtered on status and schedule; the task may
            // still have been picked up between the query and this point.
            if !task.is_ready_to_send(OffsetDateTime::now_utc()) {
                tracing::debug!(task_id = %task.id, status = %task.status, "Scheduled task no longer ready");
                continue;
            }
            if self.dispatch(&mut task).await.is_some() {
                dispatched += 1;
            }
        }

        if dispatched > 0 {
            tracing::info!(count = dispatched, "Dispatched scheduled mail tasks");
            self.metrics.scheduled_dispatched.add(u64::try_from(dispatched).unwrap_or(u64::MAX), &[]);
        }
        tracing::Span::current().record("dispatched", dispatched);
        Ok(dispatched)
    }

    /// Delivery entry point for queue consumers.
    ///
    /// A task that is not ready is skipped so redelivered queue messages are
    /// harmless.
    ///
    /// # Errors
    /// Returns `AppError::MailTaskNotFound` if the task does not exist; the
    /// queue message can never succeed and should be discarded.
    /// Returns `AppError::Database` if the store is unavailable; the message
    /// should be redelivered.
    #[tracing::instrument(skip(self))]
    pub async fn process_queued(&self, task_id: Uuid) -> Result<DispatchOutcome> {
        let mut task = self.find_task(task_id).await?;

        if !task.is_ready_to_send(OffsetDateTime::now_utc()) {
            tracing::info!(status = %task.status, "Queued task is not ready to send, skipping");
            return Ok(DispatchOutcome::Skipped);
        }

        Ok(match self.attempt(&mut task).await? {
            Some(true) => DispatchOutcome::Sent,
            Some(false) => DispatchOutcome::Failed,
            None => DispatchOutcome::Skipped,
        })
    }

    /// # Errors
    /// Returns `AppError::MailTaskNotFound` if `task_id` does not exist.
    pub async fn find_task(&self, task_id: Uuid) -> Result<MailTask> {
        self.store.find_by_id(task_id).await?.ok_or(AppError::MailTaskNotFound(task_id))
    }

    /// # Errors
    /// Returns `AppError::Database` if the store cannot be queried.
    pub async fn pending_tasks(&self) -> Result<Vec<MailTask>> {
        self.store.find_pending().await
    }

    fn build_task(&self, recipient: &str, subject: &str, body: &str, options: SendOptions) -> MailTask {
        let explicit_sender = options.from.clone().filter(|address| !address.trim().is_empty());
        let from = match explicit_sender {
            Some(address) => Mailbox::new(address, options.from_name.clone()),
            None => Mailbox::new(
                self.config.default_sender.clone(),
                options.from_name.clone().or_else(|| self.config.default_sender_name.clone()),
            ),
        };

        MailTask::new(from, Mailbox::new(recipient.trim(), None), subject, body).with_options(options)
    }

    async fn create_and_dispatch(&self, mut task: MailTask) -> Result<Uuid> {
        task.validate().map_err(AppError::Validation)?;
        self.resolve_attachment_paths(&mut task).await?;
        self.store.save(&task).await?;
        tracing::Span::current().record("task_id", tracing::field::display(task.id));

        if task.is_ready_to_send(OffsetDateTime::now_utc()) {
            self.dispatch(&mut task).await;
        } else {
            tracing::debug!(scheduled_at = ?task.scheduled_at, "Mail task scheduled for later");
        }
        Ok(task.id)
    }

    /// Confines file attachments to `attachment_dir` and stores them by their
    /// resolved path. Without an attachment directory they are refused.
    async fn resolve_attachment_paths(&self, task: &mut MailTask) -> Result<()> {
        for attachment in &mut task.attachments {
            let AttachmentSource::Path(path) = &attachment.source else {
                continue;
            };
            let Some(root) = &self.config.attachment_dir else {
                return Err(AppError::Validation(format!(
                    "attachment '{}' names a file but file attachments are disabled",
                    attachment.name
                )));
            };
            if !path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir)) {
                return Err(AppError::Validation(format!(
                    "attachment '{}' must be a relative path inside the attachment directory",
                    attachment.name
                )));
            }

            let root = tokio::fs::canonicalize(root).await.map_err(|e| {
                tracing::error!(error = %e, dir = %root.display(), "Attachment directory is not accessible");
                AppError::Internal
            })?;
            let resolved = tokio::fs::canonicalize(root.join(path))
                .await
                .map_err(|_| AppError::Validation(format!("attachment '{}' is not a readable file", attachment.name)))?;
            // Symlinks inside the directory may still point out of it
            if !resolved.starts_with(&root) {
                return Err(AppError::Validation(format!(
                    "attachment '{}' resolves outside the attachment directory",
                    attachment.name
                )));
            }
            attachment.source = AttachmentSource::Path(resolved);
        }
        Ok(())
    }

    /// Hands a ready task to the queue in async mode, or delivers it inline.
    ///
    /// `Some(true)` means enqueued or delivered and `Some(false)` a failed
    /// attempt. `None` means nothing was dispatched because the claim was
    /// lost or could not be made.
    async fn dispatch(&self, task: &mut MailTask) -> Option<bool> {
        if self.config.async_enabled {
            match self.queue.enqueue(task.id).await {
                Ok(()) => {
                    tracing::debug!(task_id = %task.id, "Mail task enqueued");
                    self.metrics.enqueued.add(1, &[]);
                    return Some(true);
                }
                Err(e) => {
                    tracing::warn!(error = %e, task_id = %task.id, "Failed to enqueue mail task, sending inline");
                }
            }
        }
        self.try_attempt(task).await
    }

    async fn try_attempt(&self, task: &mut MailTask) -> Option<bool> {
        match self.attempt(task).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, task_id = %task.id, "Could not start delivery attempt");
                None
            }
        }
    }

    /// Claims the task and runs the delivery attempt to a terminal state.
    ///
    /// `Ok(None)` means the claim was lost to another dispatcher. Errors only
    /// come from the claim itself; nothing has been attempted in that case.
    async fn attempt(&self, task: &mut MailTask) -> Result<Option<bool>> {
        task.mark_processing(OffsetDateTime::now_utc());
        if !self.store.claim_for_processing(task).await? {
            tracing::info!(task_id = %task.id, "Mail task already claimed by another dispatcher");
            return Ok(None);
        }
        Ok(Some(self.complete_attempt(task).await))
    }

    /// Delivers a task that is already `PROCESSING` and records the outcome.
    async fn complete_attempt(&self, task: &mut MailTask) -> bool {
        let outcome = AssertUnwindSafe(self.deliver(task))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err("mail transport panicked".to_string()));

        let now = OffsetDateTime::now_utc();
        let sent = match outcome {
            Ok(true) => {
                tracing::info!(task_id = %task.id, "Mail delivered");
                task.mark_sent(now);
                self.metrics.sent.add(1, &[]);
                true
            }
            Ok(false) => {
                tracing::warn!(task_id = %task.id, "Mail rejected by transport");
                task.mark_failed(DELIVERY_FAILED_MESSAGE, now);
                self.metrics.failed.add(1, &[KeyValue::new("reason", "rejected")]);
                false
            }
            Err(message) => {
                tracing::error!(task_id = %task.id, error = %message, "Mail delivery fault");
                task.mark_failed(message, now);
                self.metrics.failed.add(1, &[KeyValue::new("reason", "fault")]);
                false
            }
        };

        if let Err(e) = self.store.save(task).await {
            tracing::error!(error = %e, task_id = %task.id, status = %task.status, "Failed to persist delivery outcome");
        }
        sent
    }

    /// A bound relay wins; otherwise the selection service picks one, and
    /// with no relay at all the system transport is used.
    async fn deliver(&self, task: &MailTask) -> std::result::Result<bool, String> {
        let relay = if let Some(relay_id) = task.relay_id {
            let relay = self.relays.find_by_id(relay_id).await.map_err(|e| e.to_string())?;
            Some(relay.ok_or_else(|| AppError::RelayNotFound(relay_id).to_string())?)
        } else {
            self.selection.select_relay(task.strategy.as_deref()).await.map_err(|e| e.to_string())?
        };

        let result = match &relay {
            Some(relay) => {
                tracing::debug!(task_id = %task.id, relay = %relay.name, "Sending via relay");
                self.transport.send_via(task, relay).await
            }
            None => {
                tracing::debug!(task_id = %task.id, "No relay selected, sending via system transport");
                self.transport.send_default(task).await
            }
        };
        result.map_err(|e| e.to_string())
    }
}
