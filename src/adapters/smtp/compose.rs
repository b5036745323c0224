use crate::core::transport::TransportError;
use crate::domain::{AttachmentSource, MailTask};
use lettre::Message;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};

/// Builds the MIME message for a task.
///
/// Path attachments are read from disk here, at send time, so a file that
/// disappeared after the task was accepted fails this attempt only.
///
/// # Errors
/// Returns `TransportError::Address` for an unparsable address,
/// `TransportError::Attachment` for an unreadable file or bad mime type, and
/// `TransportError::Compose` if the message cannot be assembled.
pub async fn compose(task: &MailTask) -> Result<Message, TransportError> {
    let mut builder = Message::builder()
        .from(mailbox(&task.from.address, task.from.name.as_deref())?)
        .to(mailbox(&task.to.address, task.to.name.as_deref())?)
        .subject(task.subject.as_str());

    for cc in &task.cc {
        builder = builder.cc(mailbox(cc, None)?);
    }
    for bcc in &task.bcc {
        builder = builder.bcc(mailbox(bcc, None)?);
    }

    let content_type = if task.html { ContentType::TEXT_HTML } else { ContentType::TEXT_PLAIN };
    let text = SinglePart::builder().header(content_type).body(task.body.clone());

    let message = if task.attachments.is_empty() {
        builder.singlepart(text)
    } else {
        let mut parts = MultiPart::mixed().singlepart(text);
        for attachment in &task.attachments {
            let mime = ContentType::parse(&attachment.mime_type).map_err(|e| {
                TransportError::Attachment(format!("{}: invalid mime type '{}': {e}", attachment.name, attachment.mime_type))
            })?;
            let bytes = match &attachment.source {
                AttachmentSource::Inline(bytes) => bytes.clone(),
                AttachmentSource::Path(path) => tokio::fs::read(path)
                    .await
                    .map_err(|e| TransportError::Attachment(format!("{}: {}: {e}", attachment.name, path.display())))?,
            };
            parts = parts.singlepart(Attachment::new(attachment.name.clone()).body(bytes, mime));
        }
        builder.multipart(parts)
    };

    message.map_err(|e| TransportError::Compose(e.to_string()))
}

fn mailbox(address: &str, name: Option<&str>) -> Result<Mailbox, TransportError> {
    let address = address.parse().map_err(|e| TransportError::Address(format!("{address}: {e}")))?;
    Ok(Mailbox::new(name.map(str::to_string), address))
}
