use crate::domain::{Attachment, AttachmentSource, MailTask, Mailbox};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::path::PathBuf;
use time::OffsetDateTime;
use uuid::Uuid;

/// Attachment as stored in the `attachments` JSONB column. Exactly one of
/// `content` (base64) and `path` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub(crate) name: String,
    pub(crate) mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) path: Option<String>,
}

impl From<&Attachment> for AttachmentRecord {
    fn from(attachment: &Attachment) -> Self {
        let (content, path) = match &attachment.source {
            AttachmentSource::Inline(bytes) => (Some(BASE64.encode(bytes)), None),
            AttachmentSource::Path(path) => (None, Some(path.to_string_lossy().into_owned())),
        };
        Self { name: attachment.name.clone(), mime_type: attachment.mime_type.clone(), content, path }
    }
}

impl TryFrom<AttachmentRecord> for Attachment {
    type Error = String;
    fn try_from(record: AttachmentRecord) -> Result<Self, Self::Error> {
        let source = match (record.content, record.path) {
            (Some(content), None) => AttachmentSource::Inline(
                BASE64.decode(content).map_err(|e| format!("attachment '{}' is not valid base64: {e}", record.name))?,
            ),
            (None, Some(path)) => AttachmentSource::Path(PathBuf::from(path)),
            _ => return Err(format!("attachment '{}' must have exactly one of content or path", record.name)),
        };
        Ok(Self { name: record.name, mime_type: record.mime_type, source })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct MailTaskRecord {
    pub(crate) id: Uuid,
    pub(crate) from_address: String,
    pub(crate) from_name: Option<String>,
    pub(crate) to_address: String,
    pub(crate) to_name: Option<String>,
    pub(crate) cc: Vec<String>,
    pub(crate) bcc: Vec<String>,
    pub(crate) subject: String,
    pub(crate) body: String,
    pub(crate) is_html: bool,
    pub(crate) attachments: Json<Vec<AttachmentRecord>>,
    pub(crate) scheduled_at: Option<OffsetDateTime>,
    pub(crate) status: String,
    pub(crate) status_message: Option<String>,
    pub(crate) relay_id: Option<Uuid>,
    pub(crate) strategy: Option<String>,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: Option<OffsetDateTime>,
    pub(crate) sent_at: Option<OffsetDateTime>,
}

impl TryFrom<MailTaskRecord> for MailTask {
    type Error = String;
    fn try_from(record: MailTaskRecord) -> Result<Self, Self::Error> {
        let attachments =
            record.attachments.0.into_iter().map(Attachment::try_from).collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: record.id,
            from: Mailbox::new(record.from_address, record.from_name),
            to: Mailbox::new(record.to_address, record.to_name),
            cc: record.cc,
            bcc: record.bcc,
            subject: record.subject,
            body: record.body,
            html: record.is_html,
            attachments,
            scheduled_at: record.scheduled_at,
            status: record.status.parse()?,
            status_message: record.status_message,
            relay_id: record.relay_id,
            strategy: record.strategy,
            created_at: record.created_at,
            updated_at: record.updated_at,
            sent_at: record.sent_at,
        })
    }
}
