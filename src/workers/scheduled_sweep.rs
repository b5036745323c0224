use crate::core::dispatch_service::DispatchService;
use std::time::Duration;
use tracing::Instrument;

/// Periodically dispatches pending tasks whose schedule has come due.
#[derive(Debug)]
pub struct ScheduledSweepWorker {
    service: DispatchService,
    interval: Duration,
}

impl ScheduledSweepWorker {
    #[must_use]
    pub const fn new(service: DispatchService, interval_secs: u64) -> Self {
        Self { service, interval: Duration::from_secs(interval_secs) }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    match self.service.process_scheduled_tasks()
                        .instrument(tracing::info_span!("scheduled_sweep_iteration"))
                        .await
                    {
                        Ok(0) => tracing::debug!("No scheduled mail due"),
                        Ok(count) => tracing::info!(count, "Dispatched scheduled mail"),
                        Err(e) => tracing::error!(error = %e, "Scheduled mail sweep failed"),
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("Scheduled mail sweep shutting down...");
    }
}
