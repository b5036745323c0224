use crate::domain::relay::Encryption;
use clap::{Args, Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Clone, Debug, Default, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub mail: MailConfig,

    #[command(flatten)]
    pub smtp: DefaultSmtpConfig,

    #[command(flatten)]
    pub queue: QueueConfig,

    #[command(flatten)]
    pub health: HealthConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[arg(long = "database-url", env = "COURIER_DATABASE_URL")]
    pub url: String,

    /// Maximum number of pooled connections
    #[arg(long, env = "COURIER_DB_MAX_CONNECTIONS", default_value_t = 20)]
    pub max_connections: u32,

    /// Minimum number of idle connections kept open
    #[arg(long, env = "COURIER_DB_MIN_CONNECTIONS", default_value_t = 2)]
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    #[arg(long, env = "COURIER_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,

    /// Seconds before an idle connection is closed
    #[arg(long, env = "COURIER_DB_IDLE_TIMEOUT_SECS", default_value_t = 600)]
    pub idle_timeout_secs: u64,

    /// Maximum lifetime of a connection in seconds
    #[arg(long, env = "COURIER_DB_MAX_LIFETIME_SECS", default_value_t = 1800)]
    pub max_lifetime_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/courier".to_string(),
            max_connections: 20,
            min_connections: 2,
            acquire_timeout_secs: 5,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "COURIER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "COURIER_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for the management server (health probes)
    #[arg(long, env = "COURIER_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Seconds to wait for background workers during shutdown
    #[arg(long, env = "COURIER_SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 3000, mgmt_port: 9090, shutdown_timeout_secs: 10 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct MailConfig {
    /// Sender address used when a request does not name one
    #[arg(long, env = "COURIER_DEFAULT_SENDER", default_value = "noreply@localhost")]
    pub default_sender: String,

    /// Display name paired with the default sender
    #[arg(long, env = "COURIER_DEFAULT_SENDER_NAME")]
    pub default_sender_name: Option<String>,

    /// Hand due mail to the work queue instead of sending inline
    #[arg(long, env = "COURIER_ASYNC_ENABLED", default_value_t = false)]
    pub async_enabled: bool,

    /// Relay selection strategy used when a task carries no override
    #[arg(long, env = "COURIER_DEFAULT_STRATEGY", default_value = "round_robin")]
    pub default_strategy: String,

    /// How often the scheduled-mail sweep runs
    #[arg(long, env = "COURIER_SWEEP_INTERVAL_SECS", default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub sweep_interval_secs: u64,

    /// Maximum number of due tasks dispatched per sweep
    #[arg(long, env = "COURIER_SWEEP_BATCH_SIZE", default_value_t = 500, value_parser = clap::value_parser!(i64).range(1..))]
    pub sweep_batch_size: i64,

    /// Seconds after which a task stuck in PROCESSING may be resent
    #[arg(long, env = "COURIER_STALE_PROCESSING_SECS", default_value_t = 900, value_parser = clap::value_parser!(u64).range(1..))]
    pub stale_processing_secs: u64,

    /// Directory that file attachments are resolved in; file attachments are refused when unset
    #[arg(long, env = "COURIER_ATTACHMENT_DIR")]
    pub attachment_dir: Option<PathBuf>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            default_sender: "noreply@localhost".to_string(),
            default_sender_name: None,
            async_enabled: false,
            default_strategy: "round_robin".to_string(),
            sweep_interval_secs: 60,
            sweep_batch_size: 500,
            stale_processing_secs: 900,
            attachment_dir: None,
        }
    }
}

/// The system transport used when no relay is bound or selected.
#[derive(Clone, Debug, Args)]
pub struct DefaultSmtpConfig {
    /// SMTP host of the system transport
    #[arg(id = "smtp-host", long = "smtp-host", env = "COURIER_SMTP_HOST", default_value = "localhost")]
    pub host: String,

    /// SMTP port of the system transport
    #[arg(id = "smtp-port", long = "smtp-port", env = "COURIER_SMTP_PORT", default_value_t = 25)]
    pub port: u16,

    /// Encryption mode of the system transport
    #[arg(id = "smtp-encryption", long = "smtp-encryption", env = "COURIER_SMTP_ENCRYPTION", value_enum, default_value_t = Encryption::None)]
    pub encryption: Encryption,

    /// SMTP username
    #[arg(id = "smtp-username", long = "smtp-username", env = "COURIER_SMTP_USERNAME")]
    pub username: Option<String>,

    /// SMTP password
    #[arg(id = "smtp-password", long = "smtp-password", env = "COURIER_SMTP_PASSWORD")]
    pub password: Option<String>,

    /// Command timeout in seconds
    #[arg(id = "smtp-timeout-secs", long = "smtp-timeout-secs", env = "COURIER_SMTP_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}

impl Default for DefaultSmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            encryption: Encryption::None,
            username: None,
            password: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct QueueConfig {
    /// Redis URL for the dispatch queue; an in-process queue is used when unset
    #[arg(long = "redis-url", env = "COURIER_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Sorted-set key holding queued task ids
    #[arg(long, env = "COURIER_QUEUE_KEY", default_value = "courier:dispatch")]
    pub queue_key: String,

    /// Maximum number of tasks delivered concurrently by the worker
    #[arg(
        long,
        env = "COURIER_WORKER_CONCURRENCY",
        default_value_t = 8,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub worker_concurrency: usize,

    /// How often the worker polls the queue
    #[arg(long, env = "COURIER_WORKER_POLL_INTERVAL_MS", default_value_t = 500, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_ms: u64,

    /// Seconds a leased task stays hidden before it is redelivered
    #[arg(long, env = "COURIER_VISIBILITY_TIMEOUT_SECS", default_value_t = 120, value_parser = clap::value_parser!(u64).range(1..))]
    pub visibility_timeout_secs: u64,

    /// Minimum backoff when connecting to Redis
    #[arg(long, env = "COURIER_REDIS_MIN_BACKOFF_SECS", default_value_t = 1)]
    pub min_backoff_secs: u64,

    /// Maximum backoff when connecting to Redis
    #[arg(long, env = "COURIER_REDIS_MAX_BACKOFF_SECS", default_value_t = 30)]
    pub max_backoff_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            queue_key: "courier:dispatch".to_string(),
            worker_concurrency: 8,
            poll_interval_ms: 500,
            visibility_timeout_secs: 120,
            min_backoff_secs: 1,
            max_backoff_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct HealthConfig {
    /// Timeout for the database readiness check in milliseconds
    #[arg(long, env = "COURIER_HEALTH_DB_TIMEOUT_MS", default_value_t = 2000)]
    pub db_timeout_ms: u64,

    /// Timeout for the queue readiness check in milliseconds
    #[arg(long, env = "COURIER_HEALTH_QUEUE_TIMEOUT_MS", default_value_t = 2000)]
    pub queue_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { db_timeout_ms: 2000, queue_timeout_ms: 2000 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "COURIER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint; export is disabled when unset
    #[arg(long, env = "COURIER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
