use crate::config::DefaultSmtpConfig;
use crate::core::transport::{MailTransport, TransportError};
use crate::domain::{AuthMode, Encryption, MailTask, RelayEndpoint};
use async_trait::async_trait;
use dashmap::DashMap;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::time::Duration;
use uuid::Uuid;

pub mod compose;

type SmtpTransport = AsyncSmtpTransport<Tokio1Executor>;

/// Connection settings shared by the system transport and relays.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    host: String,
    port: u16,
    encryption: Encryption,
    credentials: Option<(String, String)>,
    timeout_secs: u64,
    auth_mode: Option<AuthMode>,
}

impl From<&RelayEndpoint> for Endpoint {
    fn from(relay: &RelayEndpoint) -> Self {
        Self {
            host: relay.host.clone(),
            port: relay.port,
            encryption: relay.encryption,
            credentials: relay.username.clone().zip(relay.password.clone()),
            timeout_secs: relay.timeout_secs,
            auth_mode: relay.auth_mode,
        }
    }
}

impl From<&DefaultSmtpConfig> for Endpoint {
    fn from(config: &DefaultSmtpConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            encryption: config.encryption,
            credentials: config.username.clone().zip(config.password.clone()),
            timeout_secs: config.timeout_secs,
            auth_mode: None,
        }
    }
}

impl Endpoint {
    fn build(&self) -> Result<SmtpTransport, TransportError> {
        let builder = match self.encryption {
            Encryption::Ssl => SmtpTransport::relay(&self.host),
            Encryption::Tls => SmtpTransport::starttls_relay(&self.host),
            Encryption::None => Ok(SmtpTransport::builder_dangerous(&self.host)),
        }
        .map_err(|e| TransportError::Connection(format!("{}: {e}", self.host)))?;

        let mut builder = builder.port(self.port).timeout(Some(Duration::from_secs(self.timeout_secs)));
        if let Some((username, password)) = &self.credentials {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        if let Some(mode) = self.auth_mode {
            let mechanism = match mode {
                AuthMode::Plain => Mechanism::Plain,
                AuthMode::Login => Mechanism::Login,
                AuthMode::Xoauth2 => Mechanism::Xoauth2,
            };
            builder = builder.authentication(vec![mechanism]);
        }
        Ok(builder.build())
    }
}

/// `MailTransport` over lettre's pooled async SMTP client.
///
/// One transport is built per relay and reused while the relay's connection
/// settings stay the same.
#[derive(Debug)]
pub struct SmtpMailTransport {
    system: SmtpTransport,
    relays: DashMap<Uuid, (Endpoint, SmtpTransport)>,
}

impl SmtpMailTransport {
    /// Builds the system transport from configuration.
    ///
    /// # Errors
    /// Returns an error if the TLS parameters for the host cannot be built.
    pub fn new(config: &DefaultSmtpConfig) -> Result<Self, TransportError> {
        let system = Endpoint::from(config).build()?;
        Ok(Self { system, relays: DashMap::new() })
    }

    fn relay_transport(&self, relay: &RelayEndpoint) -> Result<SmtpTransport, TransportError> {
        let endpoint = Endpoint::from(relay);
        if let Some(cached) = self.relays.get(&relay.id).filter(|entry| entry.0 == endpoint) {
            return Ok(cached.1.clone());
        }

        let transport = endpoint.build()?;
        self.relays.insert(relay.id, (endpoint, transport.clone()));
        Ok(transport)
    }

    async fn deliver(transport: &SmtpTransport, task: &MailTask) -> Result<bool, TransportError> {
        let message = compose::compose(task).await?;
        match transport.send(message).await {
            Ok(response) => {
                tracing::debug!(code = %response.code(), "Relay accepted mail");
                Ok(true)
            }
            Err(e) if e.is_permanent() || e.is_transient() => {
                tracing::warn!(error = %e, "Relay rejected mail");
                Ok(false)
            }
            Err(e) => Err(TransportError::Connection(e.to_string())),
        }
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    #[tracing::instrument(level = "debug", skip(self, task), fields(task_id = %task.id))]
    async fn send_default(&self, task: &MailTask) -> Result<bool, TransportError> {
        Self::deliver(&self.system, task).await
    }

    #[tracing::instrument(level = "debug", skip(self, task, relay), fields(task_id = %task.id, relay = %relay.name))]
    async fn send_via(&self, task: &MailTask, relay: &RelayEndpoint) -> Result<bool, TransportError> {
        let transport = self.relay_transport(relay)?;
        Self::deliver(&transport, task).await
    }
}
