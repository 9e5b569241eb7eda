//! TCP listener.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Yield `(stream, client address)` pairs for the scheduler

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to accept: {0}")]
    Accept(#[source] std::io::Error),
}

/// Accepts client connections.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Bind to `address` (`host:port`).
    pub async fn bind(address: &str) -> Result<Self, ListenerError> {
        let inner = TcpListener::bind(address)
            .await
            .map_err(|source| ListenerError::Bind {
                address: address.to_string(),
                source,
            })?;
        let listener = Self { inner };
        if let Ok(local_addr) = listener.local_addr() {
            tracing::info!(address = %local_addr, "Listener bound");
        }
        Ok(listener)
    }

    /// Wrap an already-bound listener.
    pub fn from_tokio(inner: TcpListener) -> Self {
        Self { inner }
    }

    /// Accept one connection. The client address is the peer IP without port,
    /// the form recorded in `X-Forwarded-For`.
    pub async fn accept(&self) -> Result<(TcpStream, String), ListenerError> {
        let (stream, peer) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        tracing::debug!(peer_addr = %peer, "Connection accepted");
        Ok((stream, peer.ip().to_string()))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_client_ip() {
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let _client = TcpStream::connect(addr).await.unwrap();
        let (_stream, client_addr) = listener.accept().await.unwrap();
        assert_eq!(client_addr, "127.0.0.1");
    }

    #[tokio::test]
    async fn bind_failure_names_the_address() {
        let err = Listener::bind("not-an-address").await.unwrap_err();
        assert!(err.to_string().contains("not-an-address"));
    }
}
