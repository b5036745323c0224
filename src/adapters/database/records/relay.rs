use crate::domain::{AuthMode, Encryption, RelayEndpoint};
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct RelayRecord {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) host: String,
    pub(crate) port: i32,
    pub(crate) username: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) encryption: String,
    pub(crate) timeout_secs: i32,
    pub(crate) auth_mode: Option<String>,
    pub(crate) weight: i32,
    pub(crate) priority: i32,
    pub(crate) enabled: bool,
}

impl TryFrom<RelayRecord> for RelayEndpoint {
    type Error = String;
    fn try_from(record: RelayRecord) -> Result<Self, Self::Error> {
        let port = u16::try_from(record.port)
            .map_err(|_| format!("relay '{}' has invalid port {}", record.name, record.port))?;
        let weight = u32::try_from(record.weight)
            .map_err(|_| format!("relay '{}' has negative weight {}", record.name, record.weight))?;
        let timeout_secs = u64::try_from(record.timeout_secs)
            .map_err(|_| format!("relay '{}' has negative timeout {}", record.name, record.timeout_secs))?;

        let relay = Self {
            id: record.id,
            encryption: record.encryption.parse::<Encryption>()?,
            auth_mode: record.auth_mode.as_deref().map(str::parse::<AuthMode>).transpose()?,
            name: record.name,
            host: record.host,
            port,
            username: record.username,
            password: record.password,
            timeout_secs,
            weight,
            priority: record.priority,
            enabled: record.enabled,
        };
        relay.validate()?;
        Ok(relay)
    }
}
