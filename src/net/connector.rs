//! Outbound connections to origin servers.
//!
//! The handler is generic over [`OriginConnector`] so that tests (and
//! deployments behind a fixed next hop) can route connections without DNS.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens TCP connections to `host:port`.
pub trait OriginConnector: Send + Sync + 'static {
    fn connect(&self, host: &str, port: u16) -> impl Future<Output = io::Result<TcpStream>> + Send;
}

/// Resolves `host` and connects, bounded by a timeout.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl OriginConnector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let authority = if host.contains(':') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        within(
            self.connect_timeout,
            &authority,
            TcpStream::connect(authority.as_str()),
        )
        .await
    }
}

/// Sends every connection to one address, whatever host was asked for.
#[derive(Debug, Clone, Copy)]
pub struct FixedConnector {
    addr: SocketAddr,
    connect_timeout: Duration,
}

impl FixedConnector {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

impl OriginConnector for FixedConnector {
    async fn connect(&self, _host: &str, _port: u16) -> io::Result<TcpStream> {
        let authority = self.addr.to_string();
        within(self.connect_timeout, &authority, TcpStream::connect(self.addr)).await
    }
}

/// Resolve `connect`, failing with `TimedOut` once `limit` elapses.
async fn within<F>(limit: Duration, authority: &str, connect: F) -> io::Result<TcpStream>
where
    F: Future<Output = io::Result<TcpStream>>,
{
    match tokio::time::timeout(limit, connect).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect to {authority} timed out"),
        )),
    }
}
