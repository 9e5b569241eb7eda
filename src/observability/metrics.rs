//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, cache, tunnels, connections)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_cache_lookups_total` (counter): lookups by result (hit, miss, expired)
//! - `proxy_cache_entries` (gauge): entries currently held
//! - `proxy_tunnels_total` (counter): tunnels by outcome
//! - `proxy_tunnel_bytes_total` (counter): relayed bytes by direction
//! - `proxy_active_connections` (gauge): current connection count
//! - `proxy_blocked_total` (counter): requests refused by the blocklist
//!
//! # Design Decisions
//! - Updates go through the `metrics` facade; with no recorder installed
//!   they are no-ops, so tests need no setup

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(result: &'static str) {
    counter!("proxy_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_entries(entries: usize) {
    gauge!("proxy_cache_entries").set(entries as f64);
}

pub fn record_tunnel(outcome: &'static str, client_to_origin: u64, origin_to_client: u64) {
    counter!("proxy_tunnels_total", "outcome" => outcome).increment(1);
    counter!("proxy_tunnel_bytes_total", "direction" => "client_to_origin")
        .increment(client_to_origin);
    counter!("proxy_tunnel_bytes_total", "direction" => "origin_to_client")
        .increment(origin_to_client);
}

pub fn record_blocked() {
    counter!("proxy_blocked_total").increment(1);
}

pub fn connection_opened() {
    gauge!("proxy_active_connections").increment(1.0);
}

pub fn connection_closed() {
    gauge!("proxy_active_connections").decrement(1.0);
}
