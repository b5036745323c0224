use crate::adapters::database::DbPool;
use crate::adapters::redis::RedisClient;
use crate::config::HealthConfig;
use opentelemetry::{KeyValue, global, metrics::Gauge};
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Debug)]
struct Metrics {
    status: Gauge<i64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("courier-server");
        Self {
            status: meter
                .i64_gauge("courier_health_status")
                .with_description("Status of health checks (1 for ok, 0 for error)")
                .build(),
        }
    }
}

/// Result of probing one dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentHealth {
    Ok,
    /// The dependency is not configured for this process.
    Disabled,
    Error(String),
}

impl ComponentHealth {
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        !matches!(self, Self::Error(_))
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Disabled => "disabled",
            Self::Error(_) => "error",
        }
    }
}

/// Readiness checks for the database and the Redis dispatch queue.
#[derive(Clone, Debug)]
pub struct HealthService {
    pool: Option<DbPool>,
    redis: Option<RedisClient>,
    config: HealthConfig,
    metrics: Metrics,
}

impl HealthService {
    #[must_use]
    pub fn new(pool: Option<DbPool>, redis: Option<RedisClient>, config: HealthConfig) -> Self {
        Self { pool, redis, config, metrics: Metrics::new() }
    }

    pub async fn check_db(&self) -> ComponentHealth {
        let Some(pool) = &self.pool else {
            return ComponentHealth::Disabled;
        };
        let db_timeout = Duration::from_millis(self.config.db_timeout_ms);

        let health = match timeout(db_timeout, sqlx::query("SELECT 1").execute(pool)).await {
            Ok(Ok(_)) => ComponentHealth::Ok,
            Ok(Err(e)) => ComponentHealth::Error(format!("Database connection failed: {e:?}")),
            Err(_) => ComponentHealth::Error("Database connection timed out".to_string()),
        };
        self.record("database", &health);
        health
    }

    pub async fn check_queue(&self) -> ComponentHealth {
        let Some(redis) = &self.redis else {
            return ComponentHealth::Disabled;
        };
        let queue_timeout = Duration::from_millis(self.config.queue_timeout_ms);

        let health = match timeout(queue_timeout, redis.ping()).await {
            Ok(Ok(())) => ComponentHealth::Ok,
            Ok(Err(e)) => ComponentHealth::Error(format!("Queue connection failed: {e:?}")),
            Err(_) => ComponentHealth::Error("Queue connection timed out".to_string()),
        };
        self.record("queue", &health);
        health
    }

    fn record(&self, component: &'static str, health: &ComponentHealth) {
        let value = i64::from(health.is_healthy());
        self.metrics.status.record(value, &[KeyValue::new("component", component)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_components_are_disabled_not_failing() {
        let service = HealthService::new(None, None, HealthConfig::default());
        let db = service.check_db().await;
        let queue = service.check_queue().await;

        assert_eq!(db, ComponentHealth::Disabled);
        assert_eq!(queue, ComponentHealth::Disabled);
        assert!(db.is_healthy() && queue.is_healthy());
    }
}
