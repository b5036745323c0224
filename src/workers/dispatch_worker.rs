use crate::config::QueueConfig;
use crate::core::dispatch_queue::DispatchQueue;
use crate::core::dispatch_service::{DispatchOutcome, DispatchService};
use crate::error::AppError;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    processed: Counter<u64>,
    redelivered: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("courier-server");
        Self {
            processed: meter
                .u64_counter("dispatch_worker_processed_total")
                .with_description("Total number of queued tasks handled by the dispatch worker")
                .build(),
            redelivered: meter
                .u64_counter("dispatch_worker_redelivery_total")
                .with_description("Total number of queued tasks left for redelivery after an error")
                .build(),
        }
    }
}

/// Drains the dispatch queue and delivers each task through the service.
///
/// A task id is acked once its attempt finished, whatever the outcome. Store
/// errors leave the id leased so it is picked up again when the lease expires.
#[derive(Debug)]
pub struct DispatchWorker {
    service: DispatchService,
    queue: Arc<dyn DispatchQueue>,
    poll_interval: Duration,
    visibility_timeout: Duration,
    semaphore: Arc<Semaphore>,
    metrics: Metrics,
}

impl DispatchWorker {
    #[must_use]
    pub fn new(service: DispatchService, queue: Arc<dyn DispatchQueue>, config: &QueueConfig) -> Self {
        Self {
            service,
            queue,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            visibility_timeout: Duration::from_secs(config.visibility_timeout_secs),
            semaphore: Arc::new(Semaphore::new(config.worker_concurrency.max(1))),
            metrics: Metrics::new(),
        }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.poll_interval);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.process_batch()
                        .instrument(tracing::debug_span!("dispatch_worker_iteration"))
                        .await
                    {
                        tracing::error!(error = %e, "Failed to process queued mail");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("Dispatch worker shutting down...");
    }

    /// Leases one batch of task ids and delivers them concurrently, returning
    /// once every attempt in the batch has finished.
    ///
    /// # Errors
    /// Returns an error if the queue cannot be leased from.
    #[tracing::instrument(level = "debug", skip(self), err, fields(leased = tracing::field::Empty))]
    pub async fn process_batch(&self) -> anyhow::Result<usize> {
        let available = self.semaphore.available_permits();
        if available == 0 {
            return Ok(0);
        }

        let task_ids = self.queue.lease(available, self.visibility_timeout).await?;
        tracing::Span::current().record("leased", task_ids.len());
        if task_ids.is_empty() {
            return Ok(0);
        }

        let mut attempts = JoinSet::new();
        for task_id in &task_ids {
            let permit = Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .map_err(|e| anyhow::anyhow!("Semaphore closed: {e}"))?;
            let service = self.service.clone();
            let queue = Arc::clone(&self.queue);
            let metrics = self.metrics.clone();
            let task_id = *task_id;

            attempts.spawn(
                async move {
                    let _permit = permit;
                    Self::handle(&service, queue.as_ref(), &metrics, task_id).await;
                }
                .instrument(tracing::debug_span!("dispatch_queued", %task_id)),
            );
        }

        while let Some(joined) = attempts.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Dispatch attempt aborted");
            }
        }

        Ok(task_ids.len())
    }

    async fn handle(service: &DispatchService, queue: &dyn DispatchQueue, metrics: &Metrics, task_id: Uuid) {
        let outcome = match service.process_queued(task_id).await {
            Ok(DispatchOutcome::Sent) => "sent",
            Ok(DispatchOutcome::Failed) => "failed",
            Ok(DispatchOutcome::Skipped) => "skipped",
            Err(AppError::MailTaskNotFound(_)) => {
                tracing::warn!("Queued task does not exist, discarding");
                "missing"
            }
            Err(e) if e.is_retryable() => {
                tracing::error!(error = %e, "Queued task failed, will retry after the lease expires");
                metrics.redelivered.add(1, &[]);
                // Not acked: the lease expiry makes it visible again.
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Queued task can never be delivered, discarding");
                "discarded"
            }
        };

        metrics.processed.add(1, &[KeyValue::new("outcome", outcome)]);
        if let Err(e) = queue.ack(task_id).await {
            tracing::error!(error = %e, "Failed to ack queued task, it will be redelivered");
        }
    }
}
