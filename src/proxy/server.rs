//! Accept loop.

use std::net::SocketAddr;
use std::time::Duration;

use crate::lifecycle::ShutdownSignal;
use crate::net::{Listener, OriginConnector, TcpConnector};
use crate::scheduler::Scheduler;

/// Grace period for in-flight connections once shutdown starts.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepts connections and feeds them to the scheduler until shutdown.
pub struct ProxyServer<C = TcpConnector> {
    listener: Listener,
    scheduler: Scheduler<C>,
}

impl<C: OriginConnector> ProxyServer<C> {
    pub fn new(listener: Listener, scheduler: Scheduler<C>) -> Self {
        Self {
            listener,
            scheduler,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn scheduler(&self) -> &Scheduler<C> {
        &self.scheduler
    }

    /// Run until `shutdown` fires, then drain the scheduler.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        if let Ok(addr) = self.local_addr() {
            tracing::info!(address = %addr, "Listening for proxy traffic");
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, client_addr)) => {
                        if self.scheduler.schedule(stream, client_addr).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        // Typically descriptor exhaustion; back off instead of spinning.
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
            }
        }

        tracing::info!("Stopped accepting connections");
        self.scheduler.shutdown(DRAIN_TIMEOUT).await;
    }
}
