//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid, stripes prime)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use super::schema::{ProxyConfig, PLACEHOLDER_API_KEY};

/// One rejected setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `cache.stripes`.
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check every semantic constraint, collecting all failures.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut reject = |field: &'static str, message: String| {
        errors.push(ValidationError { field, message });
    };

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        reject(
            "listener.bind_address",
            format!("{:?} is not a socket address", config.listener.bind_address),
        );
    }

    if config.scheduler.workers == 0 {
        reject("scheduler.workers", "must be greater than zero".into());
    }
    if config.scheduler.queue_depth == 0 {
        reject("scheduler.queue_depth", "must be greater than zero".into());
    }

    if !is_prime(config.cache.stripes) {
        reject(
            "cache.stripes",
            format!("{} is not a prime number", config.cache.stripes),
        );
    }

    if config.tunnel.idle_timeout_secs == 0 {
        reject("tunnel.idle_timeout_secs", "must be greater than zero".into());
    }
    if config.tunnel.buffer_size == 0 {
        reject("tunnel.buffer_size", "must be greater than zero".into());
    }

    if config.timeouts.connect_secs == 0 {
        reject("timeouts.connect_secs", "must be greater than zero".into());
    }
    if config.timeouts.read_secs == 0 {
        reject("timeouts.read_secs", "must be greater than zero".into());
    }
    if config.timeouts.write_secs == 0 {
        reject("timeouts.write_secs", "must be greater than zero".into());
    }

    if config.limits.max_line_bytes == 0 {
        reject("limits.max_line_bytes", "must be greater than zero".into());
    }
    if config.limits.max_headers == 0 {
        reject("limits.max_headers", "must be greater than zero".into());
    }

    if let Some(upstream) = &config.upstream {
        if upstream.host.is_empty() {
            reject("upstream.host", "must not be empty".into());
        }
        if upstream.port == 0 {
            reject("upstream.port", "must be a valid port".into());
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        reject(
            "observability.metrics_address",
            format!("{:?} is not a socket address", config.observability.metrics_address),
        );
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            reject(
                "admin.bind_address",
                format!("{:?} is not a socket address", config.admin.bind_address),
            );
        }
        if config.admin.api_key.is_empty() || config.admin.api_key == PLACEHOLDER_API_KEY {
            reject("admin.api_key", "must be set when the admin API is enabled".into());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    (2..).take_while(|d| d * d <= n).all(|d| n % d != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::UpstreamConfig;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn primes() {
        assert!(is_prime(2));
        assert!(is_prime(997));
        assert!(!is_prime(1));
        assert!(!is_prime(1000));
        assert!(!is_prime(961));
    }

    #[test]
    fn reports_every_error() {
        let mut config = ProxyConfig::default();
        config.scheduler.workers = 0;
        config.cache.stripes = 1000;
        config.timeouts.read_secs = 0;
        config.timeouts.write_secs = 0;
        config.upstream = Some(UpstreamConfig {
            host: "parent.example".into(),
            port: 0,
        });

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "scheduler.workers",
                "cache.stripes",
                "timeouts.read_secs",
                "timeouts.write_secs",
                "upstream.port"
            ]
        );
    }

    #[test]
    fn admin_requires_real_key() {
        let mut config = ProxyConfig::default();
        config.admin.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "admin.api_key");

        config.admin.api_key = "s3cret".into();
        assert!(validate_config(&config).is_ok());
    }
}
