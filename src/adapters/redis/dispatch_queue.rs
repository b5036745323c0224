use crate::adapters::redis::RedisClient;
use crate::core::dispatch_queue::DispatchQueue;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::LazyLock;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

// Moves up to ARGV[2] members whose score is <= ARGV[1] to score ARGV[3] and
// returns them. Running it as one script keeps two workers from leasing the
// same member.
static LEASE_SCRIPT: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
        local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
        for _, member in ipairs(due) do
            redis.call('ZADD', KEYS[1], 'XX', ARGV[3], member)
        end
        return due
        ",
    )
});

/// Dispatch queue stored in a Redis sorted set.
///
/// The score of a member is the unix time in milliseconds at which it becomes
/// visible. Leasing pushes the score into the future; acking removes the
/// member.
#[derive(Debug, Clone)]
pub struct RedisDispatchQueue {
    redis: RedisClient,
    queue_key: String,
}

impl RedisDispatchQueue {
    #[must_use]
    pub const fn new(redis: RedisClient, queue_key: String) -> Self {
        Self { redis, queue_key }
    }

    fn now_millis() -> i64 {
        i64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
    }
}

#[async_trait]
impl DispatchQueue for RedisDispatchQueue {
    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn enqueue(&self, task_id: Uuid) -> anyhow::Result<()> {
        let mut conn = self.redis.connection();
        // NX: a task already queued or leased keeps its current visibility
        let _: i64 = redis::cmd("ZADD")
            .arg(&self.queue_key)
            .arg("NX")
            .arg(Self::now_millis())
            .arg(task_id.to_string())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn lease(&self, limit: usize, visibility_timeout: Duration) -> anyhow::Result<Vec<Uuid>> {
        let now = Self::now_millis();
        let hidden_until = now.saturating_add(i64::try_from(visibility_timeout.as_millis()).unwrap_or(i64::MAX));

        let mut conn = self.redis.connection();
        let members: Vec<String> = LEASE_SCRIPT
            .key(&self.queue_key)
            .arg(now)
            .arg(limit)
            .arg(hidden_until)
            .invoke_async(&mut conn)
            .await?;

        let mut leased = Vec::with_capacity(members.len());
        for member in members {
            match Uuid::parse_str(&member) {
                Ok(id) => leased.push(id),
                Err(e) => {
                    tracing::error!(member = %member, error = %e, "Dropping malformed queue member");
                    let _: i64 = conn.zrem(&self.queue_key, &member).await?;
                }
            }
        }
        Ok(leased)
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn ack(&self, task_id: Uuid) -> anyhow::Result<()> {
        let mut conn = self.redis.connection();
        let _: i64 = conn.zrem(&self.queue_key, task_id.to_string()).await?;
        Ok(())
    }
}
