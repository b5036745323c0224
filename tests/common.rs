#![allow(dead_code)]
use async_trait::async_trait;
use courier_server::api::MgmtState;
use courier_server::config::Config;
use courier_server::core::{
    DispatchQueue, DispatchService, InMemoryDispatchQueue, InMemoryRelayRegistry, InMemoryTaskStore, MailTransport,
    RelayRegistry, RelaySelectionService, TaskStore, TransportError,
};
use courier_server::core::selection::builtin_strategies;
use courier_server::domain::{MailTask, RelayEndpoint};
use courier_server::{AppBuilder, Workers};
use std::sync::{Arc, Mutex, Once};
use tokio::sync::watch;
use uuid::Uuid;

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("courier_server=debug".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().init();
    });
}

pub fn get_test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.mgmt_port = 0;
    config.mail.default_sender = "noreply@courier.test".to_string();
    config.mail.default_strategy = "priority".to_string();
    config.queue.poll_interval_ms = 20;
    config
}

/// One recorded delivery attempt: the task and the relay it went through
/// (`None` for the system transport).
#[derive(Debug, Clone)]
pub struct Delivery {
    pub task_id: Uuid,
    pub subject: String,
    pub relay: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Accept,
    Reject,
    Fault,
}

/// In-memory transport that records every attempt and answers per `behavior`.
#[derive(Debug)]
pub struct RecordingTransport {
    behavior: Mutex<Behavior>,
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingTransport {
    pub fn new(behavior: Behavior) -> Self {
        Self { behavior: Mutex::new(behavior), deliveries: Mutex::new(Vec::new()) }
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn record(&self, task: &MailTask, relay: Option<&RelayEndpoint>) -> Result<bool, TransportError> {
        self.deliveries.lock().unwrap().push(Delivery {
            task_id: task.id,
            subject: task.subject.clone(),
            relay: relay.map(|r| r.name.clone()),
        });
        match *self.behavior.lock().unwrap() {
            Behavior::Accept => Ok(true),
            Behavior::Reject => Ok(false),
            Behavior::Fault => Err(TransportError::Connection("connection refused".to_string())),
        }
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send_default(&self, task: &MailTask) -> Result<bool, TransportError> {
        self.record(task, None)
    }

    async fn send_via(&self, task: &MailTask, relay: &RelayEndpoint) -> Result<bool, TransportError> {
        self.record(task, Some(relay))
    }
}

/// Accepts every mail after `delay`, recording the attempt before it waits.
#[derive(Debug)]
pub struct SlowTransport {
    pub inner: RecordingTransport,
    delay: std::time::Duration,
}

impl SlowTransport {
    pub fn new(delay: std::time::Duration) -> Self {
        Self { inner: RecordingTransport::new(Behavior::Accept), delay }
    }
}

#[async_trait]
impl MailTransport for SlowTransport {
    async fn send_default(&self, task: &MailTask) -> Result<bool, TransportError> {
        let result = self.inner.record(task, None);
        tokio::time::sleep(self.delay).await;
        result
    }

    async fn send_via(&self, task: &MailTask, relay: &RelayEndpoint) -> Result<bool, TransportError> {
        let result = self.inner.record(task, Some(relay));
        tokio::time::sleep(self.delay).await;
        result
    }
}

/// A transport whose send future panics, standing in for a buggy SMTP client.
#[derive(Debug, Default)]
pub struct PanickingTransport;

#[async_trait]
impl MailTransport for PanickingTransport {
    async fn send_default(&self, _task: &MailTask) -> Result<bool, TransportError> {
        panic!("transport exploded")
    }

    async fn send_via(&self, _task: &MailTask, _relay: &RelayEndpoint) -> Result<bool, TransportError> {
        panic!("transport exploded")
    }
}

/// A dispatch service wired to in-memory collaborators, with handles kept on
/// each so tests can inspect them.
pub struct Harness {
    pub store: Arc<InMemoryTaskStore>,
    pub registry: Arc<InMemoryRelayRegistry>,
    pub queue: Arc<InMemoryDispatchQueue>,
    pub transport: Arc<RecordingTransport>,
    pub service: DispatchService,
    pub config: Config,
}

impl Harness {
    pub fn new(relays: Vec<RelayEndpoint>) -> Self {
        Self::with_config(relays, get_test_config())
    }

    pub fn with_config(relays: Vec<RelayEndpoint>, config: Config) -> Self {
        let transport = Arc::new(RecordingTransport::new(Behavior::Accept));
        Self::with_transport(relays, config, transport)
    }

    pub fn with_transport(relays: Vec<RelayEndpoint>, config: Config, transport: Arc<RecordingTransport>) -> Self {
        setup_tracing();
        let store = Arc::new(InMemoryTaskStore::new());
        let registry = Arc::new(InMemoryRelayRegistry::new(relays));
        let queue = Arc::new(InMemoryDispatchQueue::new());

        let service = build_service(
            store.clone(),
            registry.clone(),
            transport.clone(),
            queue.clone(),
            &config,
        );

        Self { store, registry, queue, transport, service, config }
    }
}

pub fn build_service(
    store: Arc<dyn TaskStore>,
    registry: Arc<dyn RelayRegistry>,
    transport: Arc<dyn MailTransport>,
    queue: Arc<dyn DispatchQueue>,
    config: &Config,
) -> DispatchService {
    let selection = RelaySelectionService::new(registry.clone(), builtin_strategies(), &config.mail.default_strategy);
    DispatchService::new(store, registry, selection, transport, queue, config.mail.clone())
}

/// A running server on ephemeral ports backed by in-memory collaborators.
pub struct TestApp {
    pub server_url: String,
    pub mgmt_url: String,
    pub client: reqwest::Client,
    pub store: Arc<InMemoryTaskStore>,
    pub registry: Arc<InMemoryRelayRegistry>,
    pub transport: Arc<RecordingTransport>,
    pub shutdown_tx: watch::Sender<bool>,
}

impl TestApp {
    pub async fn spawn(relays: Vec<RelayEndpoint>) -> Self {
        Self::spawn_with_config(relays, get_test_config()).await
    }

    pub async fn spawn_with_config(relays: Vec<RelayEndpoint>, config: Config) -> Self {
        setup_tracing();
        let store = Arc::new(InMemoryTaskStore::new());
        let registry = Arc::new(InMemoryRelayRegistry::new(relays));
        let transport = Arc::new(RecordingTransport::new(Behavior::Accept));

        let app = AppBuilder::new(config)
            .with_task_store(store.clone())
            .with_relay_registry(registry.clone())
            .with_transport(transport.clone())
            .build()
            .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        spawn_workers(app.workers, shutdown_rx.clone());

        let api_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mgmt_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server_url = format!("http://{}", api_listener.local_addr().unwrap());
        let mgmt_url = format!("http://{}", mgmt_listener.local_addr().unwrap());

        let app_router = courier_server::api::app_router(app.dispatch_service);
        let mgmt_router = courier_server::api::mgmt_router(MgmtState { health_service: app.health_service });

        let mut api_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(api_listener, app_router)
                .with_graceful_shutdown(async move {
                    let _ = api_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });
        let mut mgmt_rx = shutdown_rx;
        tokio::spawn(async move {
            axum::serve(mgmt_listener, mgmt_router)
                .with_graceful_shutdown(async move {
                    let _ = mgmt_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        Self { server_url, mgmt_url, client: reqwest::Client::new(), store, registry, transport, shutdown_tx }
    }
}

fn spawn_workers(workers: Workers, shutdown_rx: watch::Receiver<bool>) {
    drop(workers.spawn_all(shutdown_rx));
}
