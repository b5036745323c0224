use crate::adapters::database::DbPool;
use crate::adapters::database::records::RelayRecord;
use crate::core::relay_registry::RelayRegistry;
use crate::domain::RelayEndpoint;
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Relay registry over the `smtp_relays` table.
///
/// Rows that fail validation are skipped with an error log instead of failing
/// every selection.
#[derive(Clone, Debug)]
pub struct RelayRepository {
    pool: DbPool,
}

impl RelayRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn decode(record: RelayRecord) -> Option<RelayEndpoint> {
        let id = record.id;
        RelayEndpoint::try_from(record)
            .inspect_err(|e| tracing::error!(relay_id = %id, error = %e, "Ignoring misconfigured relay"))
            .ok()
    }
}

#[async_trait]
impl RelayRegistry for RelayRepository {
    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn find_enabled(&self) -> Result<Vec<RelayEndpoint>> {
        let records = sqlx::query_as::<_, RelayRecord>(
            r#"
            SELECT id, name, host, port, username, password, encryption, timeout_secs, auth_mode, weight, priority, enabled
            FROM smtp_relays
            WHERE enabled = TRUE
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().filter_map(Self::decode).collect())
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<RelayEndpoint>> {
        let record = sqlx::query_as::<_, RelayRecord>(
            r#"
            SELECT id, name, host, port, username, password, encryption, timeout_secs, auth_mode, weight, priority, enabled
            FROM smtp_relays
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.and_then(Self::decode))
    }
}
