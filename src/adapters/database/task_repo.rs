use crate::adapters::database::DbPool;
use crate::adapters::database::records::{AttachmentRecord, MailTaskRecord};
use crate::core::task_store::TaskStore;
use crate::domain::{MailStatus, MailTask};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

const TASK_COLUMNS: &str = "id, from_address, from_name, to_address, to_name, cc, bcc, subject, body, is_html, \
     attachments, scheduled_at, status, status_message, relay_id, strategy, created_at, updated_at, sent_at";

/// Postgres-backed task store over the `mail_tasks` table.
#[derive(Clone, Debug)]
pub struct MailTaskRepository {
    pool: DbPool,
}

impl MailTaskRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn decode(record: MailTaskRecord) -> Result<MailTask> {
        MailTask::try_from(record).map_err(|e| AppError::Database(sqlx::Error::Decode(e.into())))
    }

    fn decode_all(records: Vec<MailTaskRecord>) -> Result<Vec<MailTask>> {
        records.into_iter().map(Self::decode).collect()
    }
}

#[async_trait]
impl TaskStore for MailTaskRepository {
    #[tracing::instrument(level = "debug", skip(self, task), fields(task_id = %task.id, status = %task.status), err)]
    async fn save(&self, task: &MailTask) -> Result<()> {
        let attachments: Vec<AttachmentRecord> = task.attachments.iter().map(AttachmentRecord::from).collect();

        sqlx::query(
            r#"
            INSERT INTO mail_tasks (
                id, from_address, from_name, to_address, to_name, cc, bcc, subject, body, is_html,
                attachments, scheduled_at, status, status_message, relay_id, strategy, created_at, updated_at, sent_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            ON CONFLICT (id) DO UPDATE
            SET scheduled_at = $12,
                status = $13,
                status_message = $14,
                relay_id = $15,
                strategy = $16,
                updated_at = $18,
                sent_at = $19
            "#,
        )
        .bind(task.id)
        .bind(&task.from.address)
        .bind(&task.from.name)
        .bind(&task.to.address)
        .bind(&task.to.name)
        .bind(&task.cc)
        .bind(&task.bcc)
        .bind(&task.subject)
        .bind(&task.body)
        .bind(task.html)
        .bind(Json(attachments))
        .bind(task.scheduled_at)
        .bind(task.status.as_str())
        .bind(&task.status_message)
        .bind(task.relay_id)
        .bind(&task.strategy)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.sent_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<MailTask>> {
        let record = sqlx::query_as::<_, MailTaskRecord>(&format!("SELECT {TASK_COLUMNS} FROM mail_tasks WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        record.map(Self::decode).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn find_pending(&self) -> Result<Vec<MailTask>> {
        let records = sqlx::query_as::<_, MailTaskRecord>(&format!(
            "SELECT {TASK_COLUMNS} FROM mail_tasks WHERE status = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(MailStatus::Pending.as_str())
        .fetch_all(&self.pool)
        .await?;

        Self::decode_all(records)
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    async fn find_due_pending_scheduled(&self, now: OffsetDateTime, limit: i64) -> Result<Vec<MailTask>> {
        let records = sqlx::query_as::<_, MailTaskRecord>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM mail_tasks
            WHERE status = $1
              AND scheduled_at IS NOT NULL
              AND scheduled_at <= $2
            ORDER BY scheduled_at ASC, id ASC
            LIMIT $3
            "#
        ))
        .bind(MailStatus::Pending.as_str())
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Self::decode_all(records)
    }

    #[tracing::instrument(level = "debug", skip(self, task), fields(task_id = %task.id), err)]
    async fn claim_for_processing(&self, task: &MailTask) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE mail_tasks
            SET status = $2, status_message = $3, updated_at = $4
            WHERE id = $1 AND status = $5
            "#,
        )
        .bind(task.id)
        .bind(task.status.as_str())
        .bind(&task.status_message)
        .bind(task.updated_at)
        .bind(MailStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(level = "debug", skip(self, task), fields(task_id = %task.id), err)]
    async fn reset_for_resend(&self, task: &MailTask, stale_before: OffsetDateTime) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE mail_tasks
            SET status = $2, updated_at = $3
            WHERE id = $1
              AND (status = $4 OR (status = $5 AND COALESCE(updated_at, created_at) < $6))
            "#,
        )
        .bind(task.id)
        .bind(task.status.as_str())
        .bind(task.updated_at)
        .bind(MailStatus::Failed.as_str())
        .bind(MailStatus::Processing.as_str())
        .bind(stale_before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
