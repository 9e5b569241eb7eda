//! HTTP message model.
//!
//! # Data Flow
//! ```text
//! Client socket
//!     → request.rs (request line, target resolution)
//!     → header.rs (header lines until the blank line)
//!     → payload.rs (Content-Length or chunked framing, raw wire bytes)
//!     → [handler decides: cache, origin or tunnel]
//!
//! Origin socket
//!     → response.rs (status line, header, payload)
//!     → response.rs rendering → client socket
//! ```
//!
//! # Design Decisions
//! - Messages are relayed, not interpreted: header order and payload bytes
//!   survive a parse/render cycle unchanged
//! - Chunked payloads are stored in wire form so cached entries replay exactly
//! - Every read is bounded by [`MessageLimits`]

pub mod header;
pub mod payload;
pub mod request;
pub mod response;
pub mod status;
mod wire;

pub use header::Header;
pub use payload::Payload;
pub use request::{Fingerprint, Method, Request, TargetForm, HOST};
pub use response::Response;
pub use status::StatusCode;

use thiserror::Error;

/// Errors raised while reading an HTTP message off a socket.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The peer closed the connection before a message started.
    #[error("connection closed before a message was received")]
    Closed,

    /// Reading from the socket failed or ended mid-message.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Request line, status line or header line could not be parsed.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Payload framing is missing or inconsistent.
    #[error("framing error: {0}")]
    Framing(String),

    /// A configured size limit was exceeded.
    #[error("{0} exceeds the configured limit")]
    TooLarge(&'static str),
}

impl MessageError {
    /// True when the failure is on the transport rather than in the message.
    pub fn is_transport(&self) -> bool {
        matches!(self, MessageError::Closed | MessageError::Io(_))
    }
}

/// Upper bounds applied while ingesting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLimits {
    /// Longest accepted start line or header line, in bytes.
    pub max_line_bytes: usize,
    /// Maximum number of header lines.
    pub max_headers: usize,
    /// Maximum payload size in wire bytes.
    pub max_payload_bytes: usize,
}

impl Default for MessageLimits {
    fn default() -> Self {
        Self {
            max_line_bytes: 8 * 1024,
            max_headers: 100,
            max_payload_bytes: 16 * 1024 * 1024,
        }
    }
}
