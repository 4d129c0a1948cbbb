use std::{collections::HashMap, net::SocketAddr, time::Duration};

use clap::Parser;
use url::Url;

use crate::error::ConfigError;

pub const CONNECTION_STRING_ENV: &str = "AzureSignalRConnectionString";
pub const DEFAULT_HUB: &str = "chat";
pub const DEFAULT_CLIENT_PORT: u16 = 5001;

const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;
const MAX_SESSION_SECS: u64 = 60 * 60 * 24 * 365;

#[derive(Parser, Debug, Clone)]
#[command(name = "signalr-perf", about = "Connection and message load generator for a SignalR hub")]
pub struct Settings {
    /// Service connection string, e.g. `Endpoint=https://host;AccessKey=...;`
    #[arg(long, env = CONNECTION_STRING_ENV, hide_env_values = true)]
    pub connection_string: Option<String>,

    /// Hub every client connects to
    #[arg(long, default_value = DEFAULT_HUB)]
    pub hub: String,

    /// Client port on the service endpoint; a `Port=` entry in the connection string wins
    #[arg(long, default_value_t = DEFAULT_CLIENT_PORT)]
    pub port: u16,

    /// Total connections to attempt
    #[arg(long, default_value_t = 1000)]
    pub connections: usize,

    /// Connection attempts launched per burst
    #[arg(long, default_value_t = 200)]
    pub concurrency: usize,

    /// Pause between connection bursts
    #[arg(long, default_value_t = 1000)]
    pub burst_interval_ms: u64,

    /// How long each connection keeps sending
    #[arg(long, default_value_t = 60)]
    pub session_secs: u64,

    /// Pause between two sends on one connection
    #[arg(long, default_value_t = 1000)]
    pub send_interval_ms: u64,

    /// Upper bound (exclusive) of the random delay before a session's first send
    #[arg(long, default_value_t = 1000)]
    pub max_jitter_ms: u64,

    /// Extra wait after the workload so in-flight echoes are counted
    #[arg(long, default_value_t = 10)]
    pub drain_secs: u64,

    #[arg(long, default_value_t = 15)]
    pub handshake_timeout_secs: u64,

    #[arg(long, default_value_t = 15)]
    pub send_timeout_secs: u64,

    /// Lifetime of each minted access token
    #[arg(long, default_value_t = 24)]
    pub token_ttl_hours: u64,

    /// Log a counter snapshot at this interval while the run is in progress
    #[arg(long)]
    pub report_interval_secs: Option<u64>,

    /// Serve live counters in Prometheus format on this address
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,
}

impl Settings {
    pub fn connection_string(&self) -> Result<ConnectionString, ConfigError> {
        match self.connection_string.as_deref() {
            Some(s) if !s.trim().is_empty() => s.parse(),
            _ => Err(ConfigError::Missing("service connection string")),
        }
    }

    pub fn harness_config(&self) -> Result<HarnessConfig, ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "concurrency",
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.send_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "send-interval-ms",
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.session_secs > MAX_SESSION_SECS {
            return Err(ConfigError::Invalid {
                name: "session-secs",
                reason: format!("{} exceeds the maximum of {}", self.session_secs, MAX_SESSION_SECS),
            });
        }

        if let Some(0) = self.report_interval_secs {
            return Err(ConfigError::Invalid {
                name: "report-interval-secs",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(HarnessConfig {
            total_connections: self.connections,
            concurrency: self.concurrency,
            burst_interval: Duration::from_millis(self.burst_interval_ms),
            session_duration: Duration::from_secs(self.session_secs),
            send_interval: Duration::from_millis(self.send_interval_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
            drain_wait: Duration::from_secs(self.drain_secs),
            report_interval: self.report_interval_secs.map(Duration::from_secs),
        })
    }

    pub fn token_ttl(&self) -> Result<chrono::Duration, ConfigError> {
        let hours = i64::try_from(self.token_ttl_hours)
            .ok()
            .filter(|h| (1..=MAX_TOKEN_TTL_HOURS).contains(h))
            .ok_or_else(|| ConfigError::Invalid {
                name: "token-ttl-hours",
                reason: format!("{} is out of range", self.token_ttl_hours),
            })?;

        Ok(chrono::Duration::hours(hours))
    }
}

#[derive(Clone)]
pub struct ConnectionString {
    pub endpoint: String,
    pub access_key: String,
    pub port: Option<u16>,
}

impl std::fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionString")
            .field("endpoint", &self.endpoint)
            .field("access_key", &"<redacted>")
            .field("port", &self.port)
            .finish()
    }
}

impl std::str::FromStr for ConnectionString {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entries = HashMap::new();

        for entry in s.split(';').filter(|e| !e.trim().is_empty()) {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::Malformed(format!("entry `{}` has no value", entry.trim())))?;

            let key = key.trim().to_ascii_lowercase();
            if entries.insert(key.clone(), value.trim().to_string()).is_some() {
                return Err(ConfigError::Malformed(format!("duplicate key `{}`", key)));
            }
        }

        let endpoint = entries
            .remove("endpoint")
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ConfigError::Malformed("missing `Endpoint`".to_string()))?;

        let access_key = entries
            .remove("accesskey")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::Malformed("missing `AccessKey`".to_string()))?;

        let port = entries
            .remove("port")
            .map(|p| {
                p.parse::<u16>()
                    .map_err(|_| ConfigError::Malformed(format!("invalid port `{}`", p)))
            })
            .transpose()?;

        Ok(ConnectionString {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            access_key,
            port,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEndpoint {
    pub base_url: String,
    pub hub: String,
    pub client_url: String,
}

impl TargetEndpoint {
    pub fn new(base_url: &str, port: u16, hub: &str) -> Result<Self, ConfigError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| ConfigError::Malformed(format!("endpoint `{}`: {}", base_url, e)))?;

        if !matches!(parsed.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(ConfigError::Malformed(format!(
                "endpoint `{}` must use http, https, ws or wss",
                base_url
            )));
        }

        if hub.is_empty() {
            return Err(ConfigError::Invalid {
                name: "hub",
                reason: "must not be empty".to_string(),
            });
        }

        let base_url = base_url.trim_end_matches('/').to_string();
        let client_url = format!("{}:{}/client/?hub={}", base_url, port, hub);

        Ok(Self {
            base_url,
            hub: hub.to_string(),
            client_url,
        })
    }

    pub fn from_settings(settings: &Settings, conn: &ConnectionString) -> Result<Self, ConfigError> {
        Self::new(&conn.endpoint, conn.port.unwrap_or(settings.port), &settings.hub)
    }
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub total_connections: usize,
    pub concurrency: usize,
    pub burst_interval: Duration,
    pub session_duration: Duration,
    pub send_interval: Duration,
    pub max_jitter: Duration,
    pub drain_wait: Duration,
    pub report_interval: Option<Duration>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            total_connections: 1000,
            concurrency: 200,
            burst_interval: Duration::from_secs(1),
            session_duration: Duration::from_secs(60),
            send_interval: Duration::from_secs(1),
            max_jitter: Duration::from_millis(1000),
            drain_wait: Duration::from_secs(10),
            report_interval: None,
        }
    }
}
