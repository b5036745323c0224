#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

use crate::adapters::database::{DbPool, MailTaskRepository, RelayRepository};
use crate::adapters::redis::{RedisClient, RedisDispatchQueue};
use crate::adapters::smtp::SmtpMailTransport;
use crate::config::Config;
use crate::core::selection::builtin_strategies;
use crate::core::{
    DispatchQueue, DispatchService, HealthService, InMemoryDispatchQueue, MailTransport, RelayRegistry,
    RelaySelectionService, TaskStore,
};
use crate::workers::{DispatchWorker, ScheduledSweepWorker};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

pub mod adapters;
pub mod api;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod telemetry;
pub mod workers;

/// Background loops owned by the application.
#[derive(Debug)]
pub struct Workers {
    dispatch: Option<DispatchWorker>,
    sweep: ScheduledSweepWorker,
}

impl Workers {
    /// Spawns every worker onto the runtime. Each stops when `shutdown_rx`
    /// flips to `true`.
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(2);

        if let Some(dispatch) = self.dispatch {
            let rx = shutdown_rx.clone();
            handles.push(tokio::spawn(dispatch.run(rx).instrument(tracing::info_span!("dispatch_worker"))));
        }
        handles.push(tokio::spawn(self.sweep.run(shutdown_rx).instrument(tracing::info_span!("scheduled_sweep"))));

        handles
    }
}

/// A fully wired application, ready to be served.
#[derive(Debug)]
pub struct App {
    pub dispatch_service: DispatchService,
    pub health_service: HealthService,
    pub workers: Workers,
}

/// Wires stores, queue, transport and workers from configuration.
///
/// Every collaborator can be replaced before `build`; what is not replaced
/// is derived from the database pool, the Redis client and the SMTP settings.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    pool: Option<DbPool>,
    redis: Option<RedisClient>,
    task_store: Option<Arc<dyn TaskStore>>,
    relay_registry: Option<Arc<dyn RelayRegistry>>,
    transport: Option<Arc<dyn MailTransport>>,
    queue: Option<Arc<dyn DispatchQueue>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, pool: None, redis: None, task_store: None, relay_registry: None, transport: None, queue: None }
    }

    #[must_use]
    pub fn with_database(mut self, pool: DbPool) -> Self {
        self.pool = Some(pool);
        self
    }

    #[must_use]
    pub fn with_redis(mut self, redis: RedisClient) -> Self {
        self.redis = Some(redis);
        self
    }

    #[must_use]
    pub fn with_task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.task_store = Some(store);
        self
    }

    #[must_use]
    pub fn with_relay_registry(mut self, registry: Arc<dyn RelayRegistry>) -> Self {
        self.relay_registry = Some(registry);
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn with_queue(mut self, queue: Arc<dyn DispatchQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// # Errors
    /// Returns an error if neither a database nor replacement stores were
    /// supplied, or if the SMTP transport cannot be built.
    pub fn build(self) -> anyhow::Result<App> {
        let config = self.config;

        let task_store: Arc<dyn TaskStore> = match (self.task_store, &self.pool) {
            (Some(store), _) => store,
            (None, Some(pool)) => Arc::new(MailTaskRepository::new(pool.clone())),
            (None, None) => anyhow::bail!("a database pool or a task store is required"),
        };
        let relay_registry: Arc<dyn RelayRegistry> = match (self.relay_registry, &self.pool) {
            (Some(registry), _) => registry,
            (None, Some(pool)) => Arc::new(RelayRepository::new(pool.clone())),
            (None, None) => anyhow::bail!("a database pool or a relay registry is required"),
        };
        let transport: Arc<dyn MailTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(SmtpMailTransport::new(&config.smtp)?),
        };
        let queue: Arc<dyn DispatchQueue> = match (self.queue, &self.redis) {
            (Some(queue), _) => queue,
            (None, Some(redis)) => Arc::new(RedisDispatchQueue::new(redis.clone(), config.queue.queue_key.clone())),
            (None, None) => {
                if config.mail.async_enabled {
                    tracing::warn!("No Redis configured, queued mail is held in process memory");
                }
                Arc::new(InMemoryDispatchQueue::new())
            }
        };

        let selection =
            RelaySelectionService::new(Arc::clone(&relay_registry), builtin_strategies(), &config.mail.default_strategy);
        let dispatch_service = DispatchService::new(
            task_store,
            relay_registry,
            selection,
            transport,
            Arc::clone(&queue),
            config.mail.clone(),
        );

        let dispatch = config
            .mail
            .async_enabled
            .then(|| DispatchWorker::new(dispatch_service.clone(), queue, &config.queue));
        let sweep = ScheduledSweepWorker::new(dispatch_service.clone(), config.mail.sweep_interval_secs);

        let health_service = HealthService::new(self.pool, self.redis, config.health);

        Ok(App { dispatch_service, health_service, workers: Workers { dispatch, sweep } })
    }
}

/// Runs pending database migrations.
///
/// # Errors
/// Returns an error if a migration fails.
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    tracing::info!("Running database migrations...");
    sqlx::migrate!().run(pool).await?;
    Ok(())
}

/// Routes panics through tracing so they reach the configured log sink.
pub fn setup_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info.location().map(ToString::to_string).unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_default();
        tracing::error!(panic.location = %location, panic.payload = %payload, "Panic occurred");
        default_hook(info);
    }));
}

/// Flips `shutdown_tx` to `true` on Ctrl-C or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        tracing::info!("Shutdown signal received, draining...");
        let _ = shutdown_tx.send(true);
    });
}
