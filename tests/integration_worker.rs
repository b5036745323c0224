#![allow(clippy::unwrap_used, clippy::panic, clippy::todo, clippy::missing_panics_doc, clippy::must_use_candidate, missing_debug_implementations, clippy::clone_on_ref_ptr, clippy::items_after_statements, unreachable_pub, clippy::print_stdout, clippy::similar_names)]
use async_trait::async_trait;
use common::{Harness, get_test_config};
use courier_server::core::{DispatchOutcome, DispatchQueue, InMemoryDispatchQueue, TaskStore};
use courier_server::domain::{MailStatus, MailTask, Mailbox, RelayEndpoint, SendOptions};
use courier_server::error::{AppError, Result};
use courier_server::workers::DispatchWorker;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

mod common;

fn async_harness() -> Harness {
    let mut config = get_test_config();
    config.mail.async_enabled = true;
    Harness::with_config(vec![RelayEndpoint::new("only", "smtp.example.com", 25)], config)
}

#[tokio::test]
async fn test_async_send_enqueues_then_worker_delivers() {
    let harness = async_harness();

    let id = harness.service.send("rcpt@example.com", "Queued", "Body", SendOptions::default()).await.unwrap();

    assert_eq!(harness.service.find_task(id).await.unwrap().status, MailStatus::Pending);
    assert!(harness.queue.contains(id));
    assert!(harness.transport.deliveries().is_empty());

    let worker = DispatchWorker::new(harness.service.clone(), harness.queue.clone(), &harness.config.queue);
    assert_eq!(worker.process_batch().await.unwrap(), 1);

    let task = harness.service.find_task(id).await.unwrap();
    assert_eq!(task.status, MailStatus::Sent);
    assert_eq!(harness.transport.deliveries()[0].relay.as_deref(), Some("only"));
    assert!(harness.queue.is_empty());
}

#[tokio::test]
async fn test_unknown_task_id_is_discarded() {
    let harness = async_harness();
    harness.queue.enqueue(Uuid::now_v7()).await.unwrap();

    let worker = DispatchWorker::new(harness.service.clone(), harness.queue.clone(), &harness.config.queue);
    worker.process_batch().await.unwrap();

    assert!(harness.queue.is_empty());
    assert!(harness.transport.deliveries().is_empty());
}

#[tokio::test]
async fn test_redelivered_sent_task_is_a_no_op() {
    let harness = async_harness();
    let id = harness.service.send("rcpt@example.com", "Once", "Body", SendOptions::default()).await.unwrap();

    assert_eq!(harness.service.process_queued(id).await.unwrap(), DispatchOutcome::Sent);
    assert_eq!(harness.service.process_queued(id).await.unwrap(), DispatchOutcome::Skipped);
    assert_eq!(harness.transport.deliveries().len(), 1);
}

#[tokio::test]
async fn test_future_task_on_queue_is_skipped() {
    let harness = async_harness();
    let mut task = MailTask::new(Mailbox::new("a@example.com", None), Mailbox::new("b@example.com", None), "Later", "x");
    task.scheduled_at = Some(OffsetDateTime::now_utc() + time::Duration::hours(1));
    harness.store.save(&task).await.unwrap();

    assert_eq!(harness.service.process_queued(task.id).await.unwrap(), DispatchOutcome::Skipped);
    assert_eq!(harness.service.find_task(task.id).await.unwrap().status, MailStatus::Pending);

    harness.queue.enqueue(task.id).await.unwrap();
    let worker = DispatchWorker::new(harness.service.clone(), harness.queue.clone(), &harness.config.queue);
    worker.process_batch().await.unwrap();
    assert!(harness.queue.is_empty());
    assert!(harness.transport.deliveries().is_empty());
}

#[tokio::test]
async fn test_concurrent_redelivery_sends_once() {
    let harness = async_harness();
    let id = harness.service.send("rcpt@example.com", "Race", "Body", SendOptions::default()).await.unwrap();

    let (a, b) = tokio::join!(harness.service.process_queued(id), harness.service.process_queued(id));
    let outcomes = [a.unwrap(), b.unwrap()];

    assert_eq!(outcomes.iter().filter(|o| **o == DispatchOutcome::Sent).count(), 1);
    assert_eq!(harness.transport.deliveries().len(), 1);
}

/// A store that is down for every call.
#[derive(Debug)]
struct UnavailableStore;

#[async_trait]
impl TaskStore for UnavailableStore {
    async fn save(&self, _task: &MailTask) -> Result<()> {
        Err(AppError::Internal)
    }
    async fn find_by_id(&self, _id: Uuid) -> Result<Option<MailTask>> {
        Err(AppError::Internal)
    }
    async fn find_pending(&self) -> Result<Vec<MailTask>> {
        Err(AppError::Internal)
    }
    async fn find_due_pending_scheduled(&self, _now: OffsetDateTime, _limit: i64) -> Result<Vec<MailTask>> {
        Err(AppError::Internal)
    }
    async fn claim_for_processing(&self, _task: &MailTask) -> Result<bool> {
        Err(AppError::Internal)
    }
    async fn reset_for_resend(&self, _task: &MailTask, _stale_before: OffsetDateTime) -> Result<bool> {
        Err(AppError::Internal)
    }
}

#[tokio::test]
async fn test_store_outage_leaves_task_for_redelivery() {
    common::setup_tracing();
    let mut config = get_test_config();
    config.mail.async_enabled = true;
    config.queue.visibility_timeout_secs = 60;

    let queue = Arc::new(InMemoryDispatchQueue::new());
    let registry = Arc::new(courier_server::core::InMemoryRelayRegistry::new(Vec::new()));
    let transport = Arc::new(common::RecordingTransport::new(common::Behavior::Accept));
    let service = common::build_service(Arc::new(UnavailableStore), registry, transport, queue.clone(), &config);

    let id = Uuid::now_v7();
    queue.enqueue(id).await.unwrap();

    let worker = DispatchWorker::new(service, queue.clone(), &config.queue);
    assert_eq!(worker.process_batch().await.unwrap(), 1);

    // Still held, but invisible until the lease runs out.
    assert!(queue.contains(id));
    assert!(queue.lease(10, Duration::from_secs(60)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_worker_loop_stops_on_shutdown() {
    let harness = async_harness();
    let id = harness.service.send("rcpt@example.com", "Loop", "Body", SendOptions::default()).await.unwrap();

    let worker = DispatchWorker::new(harness.service.clone(), harness.queue.clone(), &harness.config.queue);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(worker.run(shutdown_rx));

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while harness.service.find_task(id).await.unwrap().status != MailStatus::Sent {
        assert!(std::time::Instant::now() < deadline, "worker did not deliver in time");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}
