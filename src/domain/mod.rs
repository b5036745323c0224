pub mod mail_task;
pub mod relay;

pub use mail_task::{Attachment, AttachmentSource, MailStatus, MailTask, Mailbox, SendOptions};
pub use relay::{AuthMode, Encryption, RelayEndpoint};
