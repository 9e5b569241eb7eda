//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → command-line overrides applied by the binary
//!     → handed to the handler, scheduler and admin API
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the cache ceiling is the only
//!   setting changed at runtime, through the admin API
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, BlocklistConfig, CacheConfig, LimitsConfig, ListenerConfig, ObservabilityConfig,
    ProxyConfig, SchedulerConfig, TimeoutConfig, TunnelConfig, UpstreamConfig,
};
pub use validation::{validate_config, ValidationError};
