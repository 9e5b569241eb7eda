use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::AdminState;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub uptime_secs: u64,
    pub active_connections: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheStatus {
    pub entries: usize,
    /// Ceiling on entry TTL; `None` when origins' max-age applies unchanged.
    pub max_age_secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearedCache {
    pub cleared: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MaxAgeRequest {
    pub seconds: u64,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        uptime_secs: state.started.elapsed().as_secs(),
        active_connections: state.tracker.active_count(),
    })
}

pub async fn get_cache(State(state): State<AdminState>) -> Json<CacheStatus> {
    Json(CacheStatus {
        entries: state.cache.len(),
        max_age_secs: state.cache.max_age(),
    })
}

pub async fn clear_cache(State(state): State<AdminState>) -> Json<ClearedCache> {
    let cleared = state.cache.len();
    state.cache.clear();
    Json(ClearedCache { cleared })
}

pub async fn set_max_age(
    State(state): State<AdminState>,
    Json(body): Json<MaxAgeRequest>,
) -> Json<CacheStatus> {
    state.cache.set_max_age(body.seconds);
    Json(CacheStatus {
        entries: state.cache.len(),
        max_age_secs: state.cache.max_age(),
    })
}
