//! Request handling failures and the responses they turn into.

use thiserror::Error;

use crate::http::{MessageError, StatusCode};

/// Every way serving one request can fail.
///
/// All variants except [`ProxyError::Client`] are answered with a
/// synthesized response; client-side I/O failures close the connection.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0}")]
    MalformedRequest(String),

    #[error("{0} is not supported")]
    MethodNotAllowed(String),

    #[error("Forbidden Content")]
    Forbidden,

    #[error("Loop Detected")]
    LoopDetected,

    #[error("{host}:{port}: {reason}")]
    Origin {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("tunnel to {host}:{port} failed: {reason}")]
    TunnelConnect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("client connection failed: {0}")]
    Client(#[source] std::io::Error),
}

impl ProxyError {
    /// Status of the synthesized response for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MalformedRequest(_) | ProxyError::LoopDetected => StatusCode::BAD_REQUEST,
            ProxyError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::Forbidden => StatusCode::FORBIDDEN,
            ProxyError::Origin { .. } | ProxyError::TunnelConnect { .. } | ProxyError::Client(_) => {
                StatusCode::GENERAL_PROXY_FAILURE
            }
        }
    }

    /// True when the client connection is unusable and no response is sent.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProxyError::Client(_))
    }

    pub(crate) fn origin(host: &str, port: u16, reason: impl ToString) -> Self {
        ProxyError::Origin {
            host: host.to_string(),
            port,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn tunnel(host: &str, port: u16, reason: impl ToString) -> Self {
        ProxyError::TunnelConnect {
            host: host.to_string(),
            port,
            reason: reason.to_string(),
        }
    }
}

impl From<MessageError> for ProxyError {
    /// Classify a failure to read the client's request.
    fn from(err: MessageError) -> Self {
        if !err.is_transport() {
            return ProxyError::MalformedRequest(err.to_string());
        }
        match err {
            MessageError::Io(io) => ProxyError::Client(io),
            _ => ProxyError::Client(std::io::ErrorKind::UnexpectedEof.into()),
        }
    }
}
