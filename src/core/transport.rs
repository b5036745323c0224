use crate::domain::{MailTask, RelayEndpoint};
use async_trait::async_trait;
use thiserror::Error;

/// A delivery fault: the transport could not complete the attempt at all.
///
/// A relay that answers and refuses the mail is not a fault; that is reported
/// as `Ok(false)`.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("SMTP connection failed: {0}")]
    Connection(String),
    #[error("Invalid address: {0}")]
    Address(String),
    #[error("Attachment could not be read: {0}")]
    Attachment(String),
    #[error("Message could not be composed: {0}")]
    Compose(String),
}

#[async_trait]
pub trait MailTransport: Send + Sync + std::fmt::Debug {
    /// Sends through the system transport configured for the process.
    ///
    /// # Errors
    /// Returns a `TransportError` when the attempt could not be made.
    async fn send_default(&self, task: &MailTask) -> Result<bool, TransportError>;

    /// Sends through the given relay.
    ///
    /// # Errors
    /// Returns a `TransportError` when the attempt could not be made.
    async fn send_via(&self, task: &MailTask, relay: &RelayEndpoint) -> Result<bool, TransportError>;
}
