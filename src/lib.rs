//! Caching forward HTTP proxy library.

pub mod admin;
pub mod cache;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod scheduler;
pub mod security;

pub use config::schema::ProxyConfig;
pub use lifecycle::Shutdown;
pub use proxy::{ProxyServer, RequestHandler};
pub use scheduler::Scheduler;
