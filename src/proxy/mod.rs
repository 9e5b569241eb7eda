//! Proxy core.
//!
//! # Data Flow
//! ```text
//! server.rs (accept) → scheduler → handler.rs
//!     → read request (http)
//!     → blocklist / loop check (security)
//!     → RequestKind::Forward → cache stripe → origin → cache insert → client
//!     → RequestKind::Tunnel  → connect target → 200 → tunnel.rs relay
//!     → failures → error.rs status → synthesized response
//! ```

pub mod error;
pub mod handler;
pub mod server;
pub mod tunnel;

pub use error::ProxyError;
pub use handler::{RequestHandler, RequestKind};
pub use server::ProxyServer;
pub use tunnel::{TunnelBridge, TunnelStats};
