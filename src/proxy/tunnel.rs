//! Bidirectional byte relay for CONNECT tunnels.
//!
//! # Responsibilities
//! - Wait for either socket to become readable, bounded by an idle timeout
//! - Relay whatever is available to the other side, immediately
//! - Half-close the peer when one side reaches end of stream
//!
//! # Design Decisions
//! - A one-byte read distinguishes "data available" from end of stream
//!   before draining the rest with non-blocking reads
//! - One buffer per bridge; each drain read is at most `buffer_size` bytes
//! - The bridge never inspects the bytes (TLS passes through untouched)

use std::io;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Byte counts for one finished tunnel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TunnelStats {
    pub client_to_origin: u64,
    pub origin_to_client: u64,
    /// Ended by the idle timeout rather than by both sides closing.
    pub timed_out: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Client,
    Origin,
}

/// Relays bytes between a client and its CONNECT target.
#[derive(Debug, Clone)]
pub struct TunnelBridge {
    idle_timeout: Duration,
    buffer_size: usize,
}

impl TunnelBridge {
    pub fn new(idle_timeout: Duration, buffer_size: usize) -> Self {
        Self {
            idle_timeout,
            buffer_size: buffer_size.max(1),
        }
    }

    /// Relay until both directions reach end of stream or nothing moves for
    /// the idle timeout. Both sockets are closed on return.
    pub async fn run(&self, client: TcpStream, origin: TcpStream) -> TunnelStats {
        let (client_rd, mut client_wr) = client.into_split();
        let (origin_rd, mut origin_wr) = origin.into_split();
        let mut client_open = true;
        let mut origin_open = true;
        let mut stats = TunnelStats::default();
        let mut buf = vec![0u8; self.buffer_size];

        tracing::debug!("Establishing tunnel");
        while client_open || origin_open {
            let ready = tokio::time::timeout(self.idle_timeout, async {
                tokio::select! {
                    ready = client_rd.readable(), if client_open => (Side::Client, ready),
                    ready = origin_rd.readable(), if origin_open => (Side::Origin, ready),
                }
            })
            .await;

            let (side, readiness) = match ready {
                Ok(event) => event,
                Err(_) => {
                    tracing::debug!(idle_secs = self.idle_timeout.as_secs_f64(), "Tunnel idle, closing");
                    stats.timed_out = true;
                    break;
                }
            };

            let still_open = readiness.is_ok()
                && match side {
                    Side::Client => {
                        relay(&client_rd, &mut origin_wr, &mut buf, &mut stats.client_to_origin)
                            .await
                    }
                    Side::Origin => {
                        relay(&origin_rd, &mut client_wr, &mut buf, &mut stats.origin_to_client)
                            .await
                    }
                };
            if still_open {
                continue;
            }

            match side {
                Side::Client => {
                    client_open = false;
                    let _ = origin_wr.shutdown().await;
                }
                Side::Origin => {
                    origin_open = false;
                    let _ = client_wr.shutdown().await;
                }
            }
            tracing::trace!(side = ?side, "Tunnel direction closed");
        }

        tracing::debug!(
            client_to_origin = stats.client_to_origin,
            origin_to_client = stats.origin_to_client,
            timed_out = stats.timed_out,
            "Tearing down tunnel"
        );
        stats
    }
}

/// Move everything `from` has ready into `to`.
///
/// Returns `false` once `from` has reached end of stream or either side failed.
async fn relay(
    from: &OwnedReadHalf,
    to: &mut OwnedWriteHalf,
    buf: &mut [u8],
    moved: &mut u64,
) -> bool {
    match from.try_read(&mut buf[..1]) {
        Ok(0) => return false,
        Ok(_) => {}
        // Spurious readiness.
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return true,
        Err(_) => return false,
    }
    if to.write_all(&buf[..1]).await.is_err() {
        return false;
    }
    *moved += 1;

    let mut open = true;
    loop {
        match from.try_read(buf) {
            Ok(0) => {
                open = false;
                break;
            }
            Ok(n) => {
                if to.write_all(&buf[..n]).await.is_err() {
                    return false;
                }
                *moved += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(_) => {
                open = false;
                break;
            }
        }
    }
    to.flush().await.is_ok() && open
}
