//! Fixed-size worker pool for accepted connections.
//!
//! # Data Flow
//! ```text
//! accept loop
//!     → schedule() (bounded queue; waits when full)
//!     → one of N workers
//!     → RequestHandler::service (inside a per-connection span)
//! ```
//!
//! # Design Decisions
//! - Worker count is fixed at startup; no per-connection task spawning
//! - A panic while serving one connection is caught and logged; the worker
//!   moves on to the next connection
//! - Cache administration goes through the scheduler to the shared handler

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::SchedulerConfig;
use crate::net::{ConnectionTracker, OriginConnector, TcpConnector};
use crate::observability::tracing::connection_span;
use crate::proxy::RequestHandler;

type Job = (TcpStream, String);

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler is shut down")]
    Closed,
}

/// Hands accepted connections to a fixed set of workers.
pub struct Scheduler<C = TcpConnector> {
    handler: Arc<RequestHandler<C>>,
    queue: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    tracker: ConnectionTracker,
}

impl<C: OriginConnector> Scheduler<C> {
    /// Start `config.workers` workers sharing `handler`.
    pub fn new(handler: Arc<RequestHandler<C>>, config: &SchedulerConfig) -> Self {
        let (queue, rx) = mpsc::channel(config.queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let tracker = ConnectionTracker::new();

        let workers = (0..config.workers.max(1))
            .map(|worker| {
                tokio::spawn(work(
                    worker,
                    Arc::clone(&handler),
                    Arc::clone(&rx),
                    tracker.clone(),
                ))
            })
            .collect();

        tracing::info!(
            workers = config.workers.max(1),
            queue_depth = config.queue_depth.max(1),
            "Scheduler started"
        );
        Self {
            handler,
            queue,
            workers,
            tracker,
        }
    }

    /// Queue a connection for service. Waits while the queue is full.
    pub async fn schedule(&self, stream: TcpStream, client_addr: String) -> Result<(), SchedulerError> {
        self.queue
            .send((stream, client_addr))
            .await
            .map_err(|_| SchedulerError::Closed)
    }

    pub fn clear_cache(&self) {
        self.handler.clear_cache();
    }

    pub fn set_cache_max_age(&self, seconds: u64) {
        self.handler.set_cache_max_age(seconds);
    }

    pub fn handler(&self) -> &Arc<RequestHandler<C>> {
        &self.handler
    }

    /// Tracks connections currently being served.
    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting work and let workers finish what is queued.
    /// Workers still busy after `grace` are aborted.
    pub async fn shutdown(self, grace: Duration) {
        drop(self.queue);
        let mut workers = self.workers;
        let drained = tokio::time::timeout(grace, async {
            for worker in workers.iter_mut() {
                let _ = worker.await;
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                active = self.tracker.active_count(),
                "Grace period elapsed, aborting busy workers"
            );
            for worker in &workers {
                worker.abort();
            }
        }
        tracing::info!("Scheduler stopped");
    }
}

async fn work<C: OriginConnector>(
    worker: usize,
    handler: Arc<RequestHandler<C>>,
    queue: Arc<Mutex<mpsc::Receiver<Job>>>,
    tracker: ConnectionTracker,
) {
    loop {
        let job = queue.lock().await.recv().await;
        let Some((stream, client_addr)) = job else {
            break;
        };

        let guard = tracker.track();
        let span = connection_span(guard.id(), &client_addr);
        let served = AssertUnwindSafe(handler.service(stream, &client_addr))
            .catch_unwind()
            .instrument(span)
            .await;
        if served.is_err() {
            tracing::error!(worker, client = %client_addr, "Connection handler panicked");
        }
        drop(guard);
    }
    tracing::trace!(worker, "Worker exiting");
}
