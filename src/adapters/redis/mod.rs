use crate::config::QueueConfig;
use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;

pub mod dispatch_queue;

pub use dispatch_queue::RedisDispatchQueue;

#[derive(Debug, Clone)]
pub struct RedisClient {
    connection: redis::aio::ConnectionManager,
}

impl RedisClient {
    /// Connects to Redis, retrying with exponential backoff.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or every connection attempt fails.
    pub async fn connect(url: &str, config: &QueueConfig) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;

        let retry_strategy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(config.min_backoff_secs))
            .with_max_delay(Duration::from_secs(config.max_backoff_secs))
            .with_max_times(5);

        let connection = (|| async { client.get_connection_manager().await })
            .retry(&retry_strategy)
            .notify(|e, duration| {
                tracing::warn!(error = %e, "Redis connection failed, retrying in {:?}", duration);
            })
            .await?;

        tracing::info!("Connected to Redis");
        Ok(Self { connection })
    }

    /// Returns a connection handle for standard Redis commands.
    #[must_use]
    pub fn connection(&self) -> redis::aio::ConnectionManager {
        self.connection.clone()
    }

    /// Pings the Redis server to check connectivity.
    ///
    /// # Errors
    /// Returns an error if the ping fails.
    pub async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.connection();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
