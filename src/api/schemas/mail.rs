use crate::domain::mail_task::{self, AttachmentSource};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::OffsetDateTime;
use uuid::Uuid;

/// An attachment in a send request. Exactly one of `content` (base64) and
/// `path` must be set; a `path` is resolved inside the attachment directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentPayload {
    pub name: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl TryFrom<AttachmentPayload> for mail_task::Attachment {
    type Error = String;
    fn try_from(payload: AttachmentPayload) -> Result<Self, Self::Error> {
        let source = match (payload.content, payload.path) {
            (Some(content), None) => AttachmentSource::Inline(
                BASE64
                    .decode(content)
                    .map_err(|e| format!("attachment '{}' content is not valid base64: {e}", payload.name))?,
            ),
            (None, Some(path)) => AttachmentSource::Path(PathBuf::from(path)),
            _ => return Err(format!("attachment '{}' must set exactly one of content or path", payload.name)),
        };
        Ok(Self { name: payload.name, mime_type: payload.mime_type, source })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMailRequest {
    pub to: String,
    #[serde(default)]
    pub to_name: Option<String>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub html: bool,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub scheduled_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub relay_id: Option<Uuid>,
}

impl SendMailRequest {
    /// Splits the request into the positional send arguments and the options.
    ///
    /// # Errors
    /// Returns a description of the first malformed attachment.
    pub fn into_parts(self) -> Result<(SendMailParts, mail_task::SendOptions), String> {
        let attachments =
            self.attachments.into_iter().map(mail_task::Attachment::try_from).collect::<Result<Vec<_>, _>>()?;

        let options = mail_task::SendOptions {
            from: self.from,
            from_name: self.from_name,
            to_name: self.to_name,
            cc: self.cc,
            bcc: self.bcc,
            html: self.html,
            attachments,
            scheduled_at: self.scheduled_at,
            strategy: self.strategy,
        };
        let parts = SendMailParts { relay_id: self.relay_id, to: self.to, subject: self.subject, body: self.body };
        Ok((parts, options))
    }
}

#[derive(Debug)]
pub struct SendMailParts {
    pub relay_id: Option<Uuid>,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMailResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendResponse {
    pub id: Uuid,
    pub dispatched: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentSummary {
    pub name: String,
    pub mime_type: String,
    pub inline: bool,
}

/// A task as reported to clients. Attachment payloads are not echoed back.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailTaskResponse {
    pub id: Uuid,
    pub from: String,
    pub from_name: Option<String>,
    pub to: String,
    pub to_name: Option<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub html: bool,
    pub attachments: Vec<AttachmentSummary>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub scheduled_at: Option<OffsetDateTime>,
    pub status: mail_task::MailStatus,
    pub status_message: Option<String>,
    pub relay_id: Option<Uuid>,
    pub strategy: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub sent_at: Option<OffsetDateTime>,
}

impl From<mail_task::MailTask> for MailTaskResponse {
    fn from(task: mail_task::MailTask) -> Self {
        Self {
            id: task.id,
            from: task.from.address,
            from_name: task.from.name,
            to: task.to.address,
            to_name: task.to.name,
            cc: task.cc,
            bcc: task.bcc,
            subject: task.subject,
            body: task.body,
            html: task.html,
            attachments: task
                .attachments
                .into_iter()
                .map(|a| AttachmentSummary {
                    inline: matches!(a.source, AttachmentSource::Inline(_)),
                    name: a.name,
                    mime_type: a.mime_type,
                })
                .collect(),
            scheduled_at: task.scheduled_at,
            status: task.status,
            status_message: task.status_message,
            relay_id: task.relay_id,
            strategy: task.strategy,
            created_at: task.created_at,
            updated_at: task.updated_at,
            sent_at: task.sent_at,
        }
    }
}
