pub mod mail_task;
pub mod relay;

pub use mail_task::{AttachmentRecord, MailTaskRecord};
pub use relay::RelayRecord;
