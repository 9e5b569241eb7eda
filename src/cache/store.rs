//! Response store with TTL expiry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use super::policy::CacheControl;
use crate::http::{Fingerprint, Request, Response};
use crate::observability::metrics;

const NO_CEILING: u64 = u64::MAX;

#[derive(Debug)]
struct CacheEntry {
    response: Response,
    inserted: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.inserted.elapsed() > self.ttl
    }
}

/// Map from request fingerprint to a snapshot of the origin's response.
///
/// Callers receive clones; stored entries are never handed out by reference.
/// The store does not serialize lookup → fetch → insert for a fingerprint;
/// see [`super::StripeLocks`].
#[derive(Debug)]
pub struct HttpCache {
    entries: DashMap<Fingerprint, CacheEntry>,
    ceiling_secs: AtomicU64,
}

impl HttpCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            ceiling_secs: AtomicU64::new(NO_CEILING),
        }
    }

    /// Cached response for `request`, unless absent or expired.
    ///
    /// An expired entry is removed on the way out.
    pub fn lookup(&self, request: &Request) -> Option<Response> {
        let fingerprint = request.fingerprint();
        {
            let Some(entry) = self.entries.get(&fingerprint) else {
                metrics::record_cache_lookup("miss");
                return None;
            };
            if !entry.is_expired() {
                metrics::record_cache_lookup("hit");
                return Some(entry.response.clone());
            }
        }

        if self
            .entries
            .remove_if(&fingerprint, |_, entry| entry.is_expired())
            .is_some()
        {
            tracing::debug!(fingerprint = %fingerprint, "Expired cache entry removed");
            metrics::record_cache_entries(self.entries.len());
        }
        metrics::record_cache_lookup("expired");
        None
    }

    /// Whether `response` (to `request`) may be stored.
    pub fn should_cache(&self, request: &Request, response: &Response) -> bool {
        let cacheable = self.effective_ttl(response).is_some();
        tracing::trace!(
            fingerprint = %request.fingerprint(),
            cacheable,
            "Cacheability decided"
        );
        cacheable
    }

    /// Store a snapshot of `response` under `request`'s fingerprint,
    /// replacing any previous entry. Non-cacheable responses are ignored.
    pub fn insert(&self, request: &Request, response: &Response) {
        let Some(ttl) = self.effective_ttl(response) else {
            return;
        };
        let fingerprint = request.fingerprint();
        tracing::debug!(fingerprint = %fingerprint, ttl_secs = ttl, "Caching response");
        self.entries.insert(
            fingerprint,
            CacheEntry {
                response: response.clone(),
                inserted: Instant::now(),
                ttl: Duration::from_secs(ttl),
            },
        );
        metrics::record_cache_entries(self.entries.len());
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
        metrics::record_cache_entries(0);
        tracing::info!("Cache cleared");
    }

    /// Cap the TTL of entries inserted from now on at `seconds`.
    pub fn set_max_age(&self, seconds: u64) {
        self.ceiling_secs.store(seconds, Ordering::Relaxed);
        tracing::info!(max_age_secs = seconds, "Cache max age set");
    }

    /// Current ceiling, if one is installed.
    pub fn max_age(&self) -> Option<u64> {
        match self.ceiling_secs.load(Ordering::Relaxed) {
            NO_CEILING => None,
            secs => Some(secs),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn effective_ttl(&self, response: &Response) -> Option<u64> {
        CacheControl::from_header(response.header())?.ttl(self.max_age())
    }
}

impl Default for HttpCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Method, StatusCode};
    use std::sync::Arc;

    fn request(path: &str) -> Request {
        Request::new(Method::Get, "example.com", 80, path)
    }

    fn response(cache_control: Option<&str>, body: &str) -> Response {
        let mut response = Response::new("HTTP/1.1", StatusCode::OK);
        if let Some(value) = cache_control {
            response.header_mut().set("Cache-Control", value);
        }
        response.set_payload(body);
        response
    }

    #[tokio::test]
    async fn round_trip_returns_a_copy() {
        let cache = HttpCache::new();
        let req = request("/a");
        let resp = response(Some("max-age=60"), "hello");

        assert!(cache.should_cache(&req, &resp));
        cache.insert(&req, &resp);

        let hit = cache.lookup(&req).unwrap();
        assert_eq!(hit.to_bytes(), resp.to_bytes());
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(&request("/b")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_miss_and_are_removed() {
        let cache = HttpCache::new();
        let req = request("/a");
        cache.insert(&req, &response(Some("max-age=60"), "hello"));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.lookup(&req).is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.lookup(&req).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn cacheability_predicate() {
        let cache = HttpCache::new();
        let req = request("/");
        assert!(!cache.should_cache(&req, &response(Some("no-store"), "x")));
        assert!(!cache.should_cache(&req, &response(Some("max-age=0"), "x")));
        assert!(!cache.should_cache(&req, &response(Some("private, max-age=60"), "x")));
        assert!(!cache.should_cache(&req, &response(None, "x")));
        assert!(cache.should_cache(&req, &response(Some("max-age=60"), "x")));
    }

    #[test]
    fn uncacheable_insert_is_ignored() {
        let cache = HttpCache::new();
        cache.insert(&request("/"), &response(Some("no-store"), "x"));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn ceiling_caps_ttl() {
        let cache = HttpCache::new();
        assert_eq!(cache.max_age(), None);
        cache.set_max_age(30);
        assert_eq!(cache.max_age(), Some(30));

        let req = request("/capped");
        cache.insert(&req, &response(Some("max-age=300"), "x"));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cache.lookup(&req).is_some());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.lookup(&req).is_none());
    }

    #[test]
    fn zero_ceiling_disables_caching() {
        let cache = HttpCache::new();
        cache.set_max_age(0);
        assert!(!cache.should_cache(&request("/"), &response(Some("max-age=60"), "x")));
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = HttpCache::new();
        cache.insert(&request("/a"), &response(Some("max-age=60"), "a"));
        cache.insert(&request("/b"), &response(Some("max-age=60"), "b"));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.lookup(&request("/a")).is_none());
    }

    #[tokio::test]
    async fn concurrent_inserts_leave_one_complete_entry() {
        let cache = Arc::new(HttpCache::new());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move {
                let body = format!("body-{i}");
                cache.insert(&request("/same"), &response(Some("max-age=60"), &body));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(cache.len(), 1);
        let hit = cache.lookup(&request("/same")).unwrap();
        let body = String::from_utf8(hit.payload().as_bytes().to_vec()).unwrap();
        assert!(body.starts_with("body-"));
        assert_eq!(
            hit.header().get("Content-Length"),
            Some(body.len().to_string().as_str())
        );
    }
}
