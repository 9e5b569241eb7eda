//! Caching forward HTTP proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::Listener ──▶ proxy::ProxyServer (accept loop)
//!                                        │
//!                                        ▼
//!                               scheduler::Scheduler (fixed worker pool)
//!                                        │
//!                                        ▼
//!                               proxy::RequestHandler
//!                                │               │
//!                 GET/HEAD/POST  │               │  CONNECT
//!                                ▼               ▼
//!                     cache::HttpCache     proxy::TunnelBridge
//!                     + StripeLocks              │
//!                                │               │
//!                                ▼               ▼
//!                       origin or upstream proxy (net::connector)
//!
//!     Cross-cutting: config, security (blocklist, loop check),
//!     observability (tracing, metrics), lifecycle (signals, shutdown),
//!     admin API (axum)
//! ```

use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use forward_proxy::admin::{self, AdminState};
use forward_proxy::config::{load_config, validate_config, ProxyConfig, UpstreamConfig};
use forward_proxy::lifecycle::{wait_for_signal, Shutdown};
use forward_proxy::net::Listener;
use forward_proxy::observability::{logging, metrics};
use forward_proxy::proxy::{ProxyServer, RequestHandler};
use forward_proxy::scheduler::Scheduler;
use forward_proxy::security::Blocklist;

#[derive(Parser)]
#[command(name = "forward-proxy")]
#[command(about = "Caching forward HTTP proxy with CONNECT tunneling", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port, overriding the configured bind address's port
    #[arg(short, long)]
    port: Option<u16>,

    /// File of blocked host patterns, one per line
    #[arg(short, long)]
    blocklist: Option<String>,

    /// Forward everything through another proxy (host:port)
    #[arg(short, long)]
    upstream: Option<UpstreamConfig>,

    /// Ceiling in seconds on how long responses stay cached
    #[arg(short, long)]
    max_age: Option<u64>,
}

impl Args {
    fn apply(self, config: &mut ProxyConfig) {
        if let Some(port) = self.port {
            let host = config
                .listener
                .bind_address
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            config.listener.bind_address = format!("{host}:{port}");
        }
        if self.blocklist.is_some() {
            config.blocklist.path = self.blocklist;
        }
        if self.upstream.is_some() {
            config.upstream = self.upstream;
        }
        if self.max_age.is_some() {
            config.cache.max_age_secs = self.max_age;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let mut args = Args::parse();

    let mut config = match args.config.take() {
        Some(path) => load_config(&path)?,
        None => ProxyConfig::default(),
    };
    args.apply(&mut config);
    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("invalid configuration: {error}");
        }
        return Err(format!("{} invalid setting(s)", errors.len()).into());
    }

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "forward-proxy starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        workers = config.scheduler.workers,
        cache_enabled = config.cache.enabled,
        max_age_secs = ?config.cache.max_age_secs,
        upstream = ?config.upstream,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let blocklist = match &config.blocklist.path {
        Some(path) => Blocklist::from_file(path)?,
        None => Blocklist::empty(),
    };

    let handler = Arc::new(RequestHandler::new(&config, blocklist));
    let scheduler = Scheduler::new(handler.clone(), &config.scheduler);

    let listener = Listener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState::new(
            handler.cache().clone(),
            scheduler.tracker().clone(),
            &config.admin.api_key,
        );
        let signal = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = admin::serve(admin_listener, state, signal).await {
                tracing::error!(error = %e, "Admin API stopped");
            }
        });
    }

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.trigger();
    });

    ProxyServer::new(listener, scheduler)
        .run(shutdown.subscribe())
        .await;

    tracing::info!("Shutdown complete");
    Ok(())
}
