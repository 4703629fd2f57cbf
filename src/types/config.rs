//! Configuration structures.
//!
//! Configuration is loaded from a JSON file or built in code; every field has
//! a default so partial documents are accepted.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use super::{Error, Result, ServiceKind};

/// Global host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Bind address of every hosted service.
    #[serde(default)]
    pub services: ServiceAddresses,

    /// Number of history shards handed to every service context.
    #[serde(default = "default_num_history_shards")]
    pub num_history_shards: u32,

    /// Fixed wait after all services report serving.
    #[serde(default = "default_settle_period", with = "humantime_serde")]
    pub settle_period: Duration,

    /// Upper bound on waiting for slot workers to exit during stop.
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Readiness probing performed before the settle wait.
    #[serde(default)]
    pub readiness: ReadinessConfig,

    /// Transport configuration shared by all services.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_num_history_shards() -> u32 {
    4
}

fn default_settle_period() -> Duration {
    Duration::from_secs(5)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            services: ServiceAddresses::default(),
            num_history_shards: default_num_history_shards(),
            settle_period: default_settle_period(),
            shutdown_timeout: default_shutdown_timeout(),
            readiness: ReadinessConfig::default(),
            transport: TransportConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl HostConfig {
    /// Parse a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: HostConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Reject configurations the host cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.num_history_shards == 0 {
            return Err(Error::validation("num_history_shards must be at least 1"));
        }
        let mut seen = HashSet::new();
        for kind in ServiceKind::ALL {
            let address = self.services.address_of(kind);
            address.parse::<SocketAddr>().map_err(|e| {
                Error::validation(format!("{} address {:?}: {}", kind.as_str(), address, e))
            })?;
            if !seen.insert(address) {
                return Err(Error::validation(format!(
                    "{} address {} is shared with another service",
                    kind.as_str(),
                    address
                )));
            }
        }
        if self.transport.max_connections == 0 {
            return Err(Error::validation("transport.max_connections must be at least 1"));
        }
        Ok(())
    }
}

/// `host:port` of each hosted service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAddresses {
    pub frontend: String,
    pub history: String,
    pub matching: String,
}

impl Default for ServiceAddresses {
    fn default() -> Self {
        Self {
            frontend: "127.0.0.1:7104".to_string(),
            history: "127.0.0.1:7105".to_string(),
            matching: "127.0.0.1:7106".to_string(),
        }
    }
}

impl ServiceAddresses {
    /// Address assigned to a service. Pure; valid before anything is bound.
    pub fn address_of(&self, kind: ServiceKind) -> &str {
        match kind {
            ServiceKind::Frontend => &self.frontend,
            ServiceKind::History => &self.history,
            ServiceKind::Matching => &self.matching,
        }
    }
}

/// Readiness probing of every member before the settle wait.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Probe members with the health RPC before settling.
    pub enabled: bool,

    /// Probe attempts per member before startup is aborted.
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles on every retry.
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,

    /// Cap on the retry delay.
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl ReadinessConfig {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Maximum frame payload size in bytes.
    pub max_frame_bytes: u32,

    /// Maximum concurrent connections per service. Connections beyond this
    /// limit are dropped on accept.
    pub max_connections: usize,

    /// Read timeout in seconds per frame. Idle connections are dropped.
    pub read_timeout_secs: u64,

    /// Write timeout in seconds per frame.
    pub write_timeout_secs: u64,

    /// Client connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 4 * 1024 * 1024,
            max_connections: 256,
            read_timeout_secs: 30,
            write_timeout_secs: 10,
            connect_timeout_ms: 1_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
