use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// How the connection to a relay is secured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Encryption {
    /// Plain SMTP, no TLS at all.
    #[default]
    None,
    /// Implicit TLS from the first byte (SMTPS, usually port 465).
    Ssl,
    /// STARTTLS upgrade of a plain connection (usually port 587).
    Tls,
}

impl Encryption {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ssl => "ssl",
            Self::Tls => "tls",
        }
    }
}

impl fmt::Display for Encryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encryption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "ssl" => Ok(Self::Ssl),
            "tls" | "starttls" => Ok(Self::Tls),
            other => Err(format!("unknown encryption mode '{other}'")),
        }
    }
}

/// SASL mechanism forced for a relay. When unset the transport negotiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Plain,
    Login,
    Xoauth2,
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "login" => Ok(Self::Login),
            "xoauth2" => Ok(Self::Xoauth2),
            other => Err(format!("unknown auth mode '{other}'")),
        }
    }
}

/// One configured outbound SMTP relay.
///
/// `weight` drives the weighted strategy and `priority` the priority strategy;
/// the two are unrelated. A negative weight cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoint {
    pub id: Uuid,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub encryption: Encryption,
    pub timeout_secs: u64,
    pub auth_mode: Option<AuthMode>,
    pub weight: u32,
    pub priority: i32,
    pub enabled: bool,
}

impl RelayEndpoint {
    /// Builds an enabled relay with neutral weight and priority.
    #[must_use]
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            host: host.into(),
            port,
            username: None,
            password: None,
            encryption: Encryption::None,
            timeout_secs: 30,
            auth_mode: None,
            weight: 1,
            priority: 0,
            enabled: true,
        }
    }

    #[must_use]
    pub const fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Checks the configuration rules a relay must satisfy before it is used.
    ///
    /// # Errors
    /// Returns a description of the first violated rule.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err(format!("relay '{}' has an empty host", self.name));
        }
        if self.port == 0 {
            return Err(format!("relay '{}' has port 0", self.name));
        }
        if self.timeout_secs == 0 {
            return Err(format!("relay '{}' has a zero timeout", self.name));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(format!("relay '{}' must set both username and password or neither", self.name));
        }
        Ok(())
    }
}
