use lettre::message::header::ContentType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Message recorded when the transport rejects a mail without reporting why.
pub const DELIVERY_FAILED_MESSAGE: &str = "mail delivery failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MailStatus {
    Pending,
    Processing,
    Sent,
    Failed,
}

impl MailStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for MailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MailStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown mail status '{other}'")),
        }
    }
}

/// An address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub address: String,
    pub name: Option<String>,
}

impl Mailbox {
    #[must_use]
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self { address: address.into(), name: name.filter(|n| !n.trim().is_empty()) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    Inline(Vec<u8>),
    Path(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub source: AttachmentSource,
}

/// Optional parts of a mail request. Everything defaults to "not given".
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub from: Option<String>,
    pub from_name: Option<String>,
    pub to_name: Option<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub html: bool,
    pub attachments: Vec<Attachment>,
    pub scheduled_at: Option<OffsetDateTime>,
    pub strategy: Option<String>,
}

/// One outbound email and its delivery state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailTask {
    pub id: Uuid,
    pub from: Mailbox,
    pub to: Mailbox,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub html: bool,
    pub attachments: Vec<Attachment>,
    pub scheduled_at: Option<OffsetDateTime>,
    pub status: MailStatus,
    pub status_message: Option<String>,
    pub relay_id: Option<Uuid>,
    pub strategy: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: Option<OffsetDateTime>,
    pub sent_at: Option<OffsetDateTime>,
}

impl MailTask {
    #[must_use]
    pub fn new(from: Mailbox, to: Mailbox, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            from,
            to,
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.into(),
            body: body.into(),
            html: false,
            attachments: Vec::new(),
            scheduled_at: None,
            status: MailStatus::Pending,
            status_message: None,
            relay_id: None,
            strategy: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
            sent_at: None,
        }
    }

    /// Copies the optional request fields onto the task. The sender is not
    /// touched here because its default comes from configuration.
    #[must_use]
    pub fn with_options(mut self, options: SendOptions) -> Self {
        self.to.name = options.to_name.filter(|n| !n.trim().is_empty());
        self.cc = options.cc;
        self.bcc = options.bcc;
        self.html = options.html;
        self.attachments = options.attachments;
        self.scheduled_at = options.scheduled_at;
        self.strategy = options.strategy.filter(|s| !s.trim().is_empty());
        self
    }

    /// True while the task is pending and its schedule, if any, has come due.
    /// A schedule equal to `now` is due.
    #[must_use]
    pub fn is_ready_to_send(&self, now: OffsetDateTime) -> bool {
        self.status == MailStatus::Pending && self.scheduled_at.is_none_or(|at| at <= now)
    }

    pub const fn mark_processing(&mut self, now: OffsetDateTime) {
        self.status = MailStatus::Processing;
        self.updated_at = Some(now);
    }

    pub fn mark_sent(&mut self, now: OffsetDateTime) {
        self.status = MailStatus::Sent;
        self.status_message = None;
        self.sent_at = Some(now);
        self.updated_at = Some(now);
    }

    pub fn mark_failed(&mut self, message: impl Into<String>, now: OffsetDateTime) {
        let message = message.into();
        self.status = MailStatus::Failed;
        self.status_message = Some(if message.trim().is_empty() { DELIVERY_FAILED_MESSAGE.to_string() } else { message });
        self.sent_at = None;
        self.updated_at = Some(now);
    }

    /// Whether a resend may reset this task: it failed, or it has sat in
    /// `PROCESSING` since before `stale_before` (an attempt that never
    /// finished).
    #[must_use]
    pub fn is_resendable(&self, stale_before: OffsetDateTime) -> bool {
        match self.status {
            MailStatus::Failed => true,
            MailStatus::Processing => self.updated_at.unwrap_or(self.created_at) < stale_before,
            MailStatus::Pending | MailStatus::Sent => false,
        }
    }

    /// Puts the task back in the queue for a new attempt. The previous status
    /// message and bound relay stay until the next attempt overwrites them.
    pub const fn reset_for_resend(&mut self, now: OffsetDateTime) {
        self.status = MailStatus::Pending;
        self.updated_at = Some(now);
    }

    /// Field rules checked before a task is first persisted.
    ///
    /// # Errors
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        check_address("sender", &self.from.address)?;
        check_address("recipient", &self.to.address)?;
        for cc in &self.cc {
            check_address("cc", cc)?;
        }
        for bcc in &self.bcc {
            check_address("bcc", bcc)?;
        }
        if self.subject.trim().is_empty() {
            return Err("subject must not be blank".to_string());
        }
        if self.subject.contains(['\r', '\n']) {
            return Err("subject must be a single line".to_string());
        }
        for attachment in &self.attachments {
            if attachment.name.trim().is_empty() {
                return Err("attachment name must not be blank".to_string());
            }
            if ContentType::parse(&attachment.mime_type).is_err() {
                return Err(format!("attachment '{}' has invalid mime type '{}'", attachment.name, attachment.mime_type));
            }
            if matches!(&attachment.source, AttachmentSource::Path(path) if path.as_os_str().is_empty()) {
                return Err(format!("attachment '{}' has an empty path", attachment.name));
            }
        }
        if self.strategy.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err("strategy must not be blank".to_string());
        }
        Ok(())
    }
}

fn check_address(field: &str, address: &str) -> Result<(), String> {
    address.parse::<lettre::Address>().map(|_| ()).map_err(|e| format!("invalid {field} address '{address}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn task() -> MailTask {
        MailTask::new(Mailbox::new("from@example.com", None), Mailbox::new("to@example.com", None), "Hi", "Body")
    }

    #[test]
    fn test_ready_when_pending_and_unscheduled() {
        let now = OffsetDateTime::now_utc();
        assert!(task().is_ready_to_send(now));
    }

    #[test]
    fn test_schedule_equal_to_now_is_due() {
        let now = OffsetDateTime::now_utc();
        let mut t = task();
        t.scheduled_at = Some(now);
        assert!(t.is_ready_to_send(now));

        t.scheduled_at = Some(now + Duration::seconds(1));
        assert!(!t.is_ready_to_send(now));
    }

    #[test]
    fn test_not_ready_outside_pending() {
        let now = OffsetDateTime::now_utc();
        let mut t = task();
        t.mark_processing(now);
        assert!(!t.is_ready_to_send(now));
        t.mark_failed("boom", now);
        assert!(!t.is_ready_to_send(now));
    }

    #[test]
    fn test_sent_timestamp_follows_last_terminal_state() {
        let now = OffsetDateTime::now_utc();
        let mut t = task();
        t.mark_processing(now);
        t.mark_sent(now);
        assert_eq!(t.status, MailStatus::Sent);
        assert_eq!(t.sent_at, Some(now));

        t.reset_for_resend(now);
        t.mark_processing(now);
        t.mark_failed("relay refused", now);
        assert_eq!(t.sent_at, None);
        assert_eq!(t.status_message.as_deref(), Some("relay refused"));
    }

    #[test]
    fn test_resend_keeps_failure_context_and_relay() {
        let now = OffsetDateTime::now_utc();
        let relay_id = Uuid::new_v4();
        let mut t = task();
        t.relay_id = Some(relay_id);
        t.mark_processing(now);
        t.mark_failed("connection reset", now);

        t.reset_for_resend(now);
        assert_eq!(t.status, MailStatus::Pending);
        assert_eq!(t.status_message.as_deref(), Some("connection reset"));
        assert_eq!(t.relay_id, Some(relay_id));
    }

    #[test]
    fn test_only_failed_or_stale_processing_is_resendable() {
        let now = OffsetDateTime::now_utc();
        let stale_before = now - Duration::minutes(15);

        let mut t = task();
        assert!(!t.is_resendable(stale_before));

        t.mark_processing(now);
        assert!(!t.is_resendable(stale_before));
        t.mark_processing(now - Duration::hours(1));
        assert!(t.is_resendable(stale_before));

        t.mark_sent(now);
        assert!(!t.is_resendable(stale_before));

        t.mark_failed("relay refused", now);
        assert!(t.is_resendable(stale_before));
    }

    #[test]
    fn test_blank_failure_message_falls_back_to_generic() {
        let now = OffsetDateTime::now_utc();
        let mut t = task();
        t.mark_failed("  ", now);
        assert_eq!(t.status_message.as_deref(), Some(DELIVERY_FAILED_MESSAGE));
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let mut t = task();
        t.subject = "   ".to_string();
        assert!(t.validate().is_err());

        let mut t = task();
        t.to.address = "not-an-address".to_string();
        assert!(t.validate().unwrap_err().contains("recipient"));

        let mut t = task();
        t.cc = vec!["ok@example.com".to_string(), "broken@".to_string()];
        assert!(t.validate().unwrap_err().contains("cc"));

        let mut t = task();
        t.attachments.push(Attachment {
            name: "a.txt".to_string(),
            mime_type: "not a mime".to_string(),
            source: AttachmentSource::Inline(b"x".to_vec()),
        });
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_full_task() {
        let mut t = task();
        t.cc = vec!["cc@example.com".to_string()];
        t.bcc = vec!["bcc@example.com".to_string()];
        t.attachments.push(Attachment {
            name: "report.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            source: AttachmentSource::Path(PathBuf::from("/tmp/report.pdf")),
        });
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_status_round_trips_through_strings() {
        for status in [MailStatus::Pending, MailStatus::Processing, MailStatus::Sent, MailStatus::Failed] {
            assert_eq!(status.as_str().parse::<MailStatus>(), Ok(status));
        }
        assert!("DONE".parse::<MailStatus>().is_err());
    }
}
