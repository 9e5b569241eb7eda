//! Per-connection spans.
//!
//! Every event logged while serving a connection carries its
//! `connection_id` and `client` fields.

use tracing::Span;

use crate::net::ConnectionId;

/// Span covering the life of one client connection.
pub fn connection_span(id: ConnectionId, client: &str) -> Span {
    tracing::info_span!("connection", connection_id = %id, client = %client)
}
