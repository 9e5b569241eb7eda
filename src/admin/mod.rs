//! Admin API.
//!
//! # Endpoints
//! - `GET /admin/status`: version, uptime, active connections
//! - `GET /admin/cache`: entry count and TTL ceiling
//! - `POST /admin/cache/clear`: drop every cached response
//! - `PUT /admin/cache/max-age`: install a TTL ceiling, `{"seconds": n}`
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::cache::HttpCache;
use crate::lifecycle::ShutdownSignal;
use crate::net::ConnectionTracker;

/// Shared state behind the admin routes.
#[derive(Clone)]
pub struct AdminState {
    pub cache: Arc<HttpCache>,
    pub tracker: ConnectionTracker,
    pub api_key: Arc<str>,
    pub started: Instant,
}

impl AdminState {
    pub fn new(cache: Arc<HttpCache>, tracker: ConnectionTracker, api_key: &str) -> Self {
        Self {
            cache,
            tracker,
            api_key: Arc::from(api_key),
            started: Instant::now(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/cache", get(get_cache))
        .route("/admin/cache/clear", post(clear_cache))
        .route("/admin/cache/max-age", put(set_max_age))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: ShutdownSignal,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "Admin API listening");
    }
    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move { shutdown.recv().await })
        .await
}
