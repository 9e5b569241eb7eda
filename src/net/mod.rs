//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, client address)
//!     → connection.rs (id, lifecycle tracking)
//!     → Hand off to the scheduler
//!
//! Outgoing
//!     handler → connector.rs (origin or upstream proxy, bounded by timeout)
//! ```

pub mod connection;
pub mod connector;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use connector::{FixedConnector, OriginConnector, TcpConnector};
pub use listener::{Listener, ListenerError};
