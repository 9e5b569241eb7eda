//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_STRIPES;
use crate::http::MessageLimits;

/// Placeholder admin key; validation rejects it when the admin API is on.
pub const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

/// Root configuration for the forward proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Worker pool sizing.
    pub scheduler: SchedulerConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// CONNECT tunnel settings.
    pub tunnel: TunnelConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Message size limits.
    pub limits: LimitsConfig,

    /// Host blocklist source.
    pub blocklist: BlocklistConfig,

    /// Next-hop proxy; requests go straight to origins when absent.
    pub upstream: Option<UpstreamConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of worker tasks serving connections.
    pub workers: usize,

    /// Accepted connections that may wait for a worker before accepting stalls.
    pub queue_depth: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 64,
            queue_depth: 1024,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Serve and store cacheable responses.
    pub enabled: bool,

    /// Number of stripe locks; must be prime.
    pub stripes: usize,

    /// Ceiling on entry TTL in seconds; none means the origin's max-age wins.
    pub max_age_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stripes: DEFAULT_STRIPES,
            max_age_secs: None,
        }
    }
}

/// CONNECT tunnel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Tear the tunnel down after this long without traffic in either direction.
    pub idle_timeout_secs: u64,

    /// Largest single read while draining a ready socket.
    pub buffer_size: usize,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 5,
            buffer_size: 64 * 1024,
        }
    }
}

impl TunnelConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Origin (or upstream) connect timeout in seconds.
    pub connect_secs: u64,

    /// Timeout for reading a whole request from the client or a whole
    /// response from the origin, in seconds.
    pub read_secs: u64,

    /// Timeout for writing a whole response to the client, in seconds.
    pub write_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            read_secs: 30,
            write_secs: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }
}

/// Message size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Longest request, status or header line in bytes.
    pub max_line_bytes: usize,

    /// Maximum number of header lines per message.
    pub max_headers: usize,

    /// Maximum payload size in bytes.
    pub max_payload_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let limits = MessageLimits::default();
        Self {
            max_line_bytes: limits.max_line_bytes,
            max_headers: limits.max_headers,
            max_payload_bytes: limits.max_payload_bytes,
        }
    }
}

impl LimitsConfig {
    pub fn message_limits(&self) -> MessageLimits {
        MessageLimits {
            max_line_bytes: self.max_line_bytes,
            max_headers: self.max_headers,
            max_payload_bytes: self.max_payload_bytes,
        }
    }
}

/// Blocklist configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BlocklistConfig {
    /// File with one host pattern per line. No file means nothing is blocked.
    pub path: Option<String>,
}

/// Upstream proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UpstreamConfig {
    pub host: String,
    pub port: u16,
}

impl std::str::FromStr for UpstreamConfig {
    type Err = String;

    /// Parse `host:port`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (host, port) = value
            .rsplit_once(':')
            .ok_or_else(|| format!("expected host:port, got {value:?}"))?;
        let port = port
            .parse()
            .map_err(|_| format!("invalid port in {value:?}"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(format!("missing host in {value:?}"));
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_API_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
