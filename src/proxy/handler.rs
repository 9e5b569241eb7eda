//! Per-connection request handling.
//!
//! # Responsibilities
//! - Read one request from the client, bounded by the read timeout
//! - Refuse blocked hosts and forwarding loops before touching the network
//! - Serve GET/POST/HEAD through the cache, CONNECT through a tunnel
//! - Turn every [`ProxyError`] into a synthesized response, except client
//!   I/O failures, which close the connection
//!
//! # Design Decisions
//! - One request per client connection; the connection closes after the
//!   response (or when the tunnel ends)
//! - Origin failures are answered with 510 and never retried
//! - With an upstream proxy configured, requests and tunnels go through it

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::error::ProxyError;
use super::tunnel::TunnelBridge;
use crate::cache::{HttpCache, StripeLocks};
use crate::config::{ProxyConfig, UpstreamConfig};
use crate::http::{MessageLimits, Method, Request, Response, StatusCode, TargetForm, HOST};
use crate::net::{OriginConnector, TcpConnector};
use crate::observability::metrics;
use crate::security::{add_forwarding_headers, contains_loop, Blocklist};

/// How a request is served, decided by its method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Relay to the origin, through the cache.
    Forward,
    /// Open a byte tunnel to the target.
    Tunnel,
}

impl RequestKind {
    pub fn of(method: &Method) -> Result<Self, ProxyError> {
        match method {
            Method::Get | Method::Post | Method::Head => Ok(RequestKind::Forward),
            Method::Connect => Ok(RequestKind::Tunnel),
            other => Err(ProxyError::MethodNotAllowed(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheStatus {
    Hit,
    Miss,
    Bypass,
}

impl CacheStatus {
    fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Bypass => "bypass",
        }
    }
}

enum Outcome {
    Responded(StatusCode, CacheStatus),
    Tunnel { origin: TcpStream, pending: Vec<u8> },
}

/// Serves client connections.
///
/// Shared by every worker; all state it mutates (the cache) is internally
/// synchronized.
pub struct RequestHandler<C = TcpConnector> {
    connector: C,
    blocklist: Blocklist,
    cache: Arc<HttpCache>,
    stripes: StripeLocks,
    cache_enabled: bool,
    upstream: Option<UpstreamConfig>,
    limits: MessageLimits,
    read_timeout: Duration,
    write_timeout: Duration,
    tunnel: TunnelBridge,
}

impl RequestHandler<TcpConnector> {
    /// Handler that resolves and dials origins directly.
    pub fn new(config: &ProxyConfig, blocklist: Blocklist) -> Self {
        Self::with_connector(config, blocklist, TcpConnector::new(config.timeouts.connect()))
    }
}

impl<C: OriginConnector> RequestHandler<C> {
    pub fn with_connector(config: &ProxyConfig, blocklist: Blocklist, connector: C) -> Self {
        let cache = Arc::new(HttpCache::new());
        if let Some(max_age) = config.cache.max_age_secs {
            cache.set_max_age(max_age);
        }
        Self {
            connector,
            blocklist,
            cache,
            stripes: StripeLocks::new(config.cache.stripes),
            cache_enabled: config.cache.enabled,
            upstream: config.upstream.clone(),
            limits: config.limits.message_limits(),
            read_timeout: config.timeouts.read(),
            write_timeout: config.timeouts.write(),
            tunnel: TunnelBridge::new(config.tunnel.idle_timeout(), config.tunnel.buffer_size),
        }
    }

    /// Serve one client connection to completion. Never fails: every error is
    /// answered or logged here.
    pub async fn service(&self, stream: TcpStream, client_addr: &str) {
        let start = Instant::now();
        let mut client = BufReader::new(stream);

        let request = match self.read_request(&mut client, client_addr).await {
            Ok(request) => request,
            Err(err) => {
                self.finish(&mut client, "-", Err(err), start).await;
                return;
            }
        };
        let method = request.method().to_string();
        tracing::debug!(
            method = %method,
            target = %request.authority(),
            path = %request.path(),
            "Request received"
        );

        match self.dispatch(&mut client, request).await {
            Ok(Outcome::Tunnel { origin, pending }) => {
                self.bridge(client, origin, pending, start).await;
            }
            Ok(Outcome::Responded(status, cache)) => {
                self.finish(&mut client, &method, Ok((status, cache)), start).await;
            }
            Err(err) => self.finish(&mut client, &method, Err(err), start).await,
        }
    }

    /// Drop every cached response.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Cap the TTL of responses cached from now on.
    pub fn set_cache_max_age(&self, seconds: u64) {
        self.cache.set_max_age(seconds);
    }

    pub fn cache(&self) -> &Arc<HttpCache> {
        &self.cache
    }

    async fn read_request(
        &self,
        client: &mut BufReader<TcpStream>,
        client_addr: &str,
    ) -> Result<Request, ProxyError> {
        match tokio::time::timeout(
            self.read_timeout,
            Request::ingest(client, client_addr, &self.limits),
        )
        .await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(ProxyError::Client(std::io::ErrorKind::TimedOut.into())),
        }
    }

    async fn dispatch(
        &self,
        client: &mut BufReader<TcpStream>,
        request: Request,
    ) -> Result<Outcome, ProxyError> {
        if self.blocklist.contains(request.host()) {
            metrics::record_blocked();
            return Err(ProxyError::Forbidden);
        }
        if contains_loop(&request) {
            return Err(ProxyError::LoopDetected);
        }

        match RequestKind::of(request.method())? {
            RequestKind::Forward => self.forward(client.get_mut(), request).await,
            RequestKind::Tunnel => {
                let (origin, pending) = self.open_tunnel(&request).await?;
                Ok(Outcome::Tunnel { origin, pending })
            }
        }
    }

    /// Cache-aware forward. The stripe lock covers the lookup (and the write
    /// of a hit) and the insert, never the origin round trip.
    async fn forward(&self, client: &mut TcpStream, mut request: Request) -> Result<Outcome, ProxyError> {
        if !self.cache_enabled {
            let response = self.fetch(&mut request).await?;
            self.write_response(client, &response).await?;
            return Ok(Outcome::Responded(response.status(), CacheStatus::Bypass));
        }

        let fingerprint = request.fingerprint();
        {
            let _stripe = self.stripes.lock(&fingerprint).await;
            if let Some(cached) = self.cache.lookup(&request) {
                tracing::debug!(fingerprint = %fingerprint, "Serving from cache");
                self.write_response(client, &cached).await?;
                return Ok(Outcome::Responded(cached.status(), CacheStatus::Hit));
            }
        }

        let response = self.fetch(&mut request).await?;

        {
            let _stripe = self.stripes.lock(&fingerprint).await;
            if self.cache.should_cache(&request, &response) {
                self.cache.insert(&request, &response);
            }
        }

        self.write_response(client, &response).await?;
        Ok(Outcome::Responded(response.status(), CacheStatus::Miss))
    }

    /// Write `response` to the client, bounded by the write timeout. A client
    /// that stops reading must not pin a worker or a cache stripe.
    async fn write_response(&self, client: &mut TcpStream, response: &Response) -> Result<(), ProxyError> {
        match tokio::time::timeout(self.write_timeout, response.write_to(client)).await {
            Ok(result) => result.map_err(ProxyError::Client),
            Err(_) => Err(ProxyError::Client(std::io::ErrorKind::TimedOut.into())),
        }
    }

    /// Send the augmented request to the origin (or upstream) and read the
    /// complete response.
    async fn fetch(&self, request: &mut Request) -> Result<Response, ProxyError> {
        add_forwarding_headers(request);
        let host_header = request.host_header();
        request.header_mut().set(HOST, host_header);
        let (host, port, form) = match &self.upstream {
            Some(upstream) => (upstream.host.clone(), upstream.port, TargetForm::Absolute),
            None => (request.host().to_string(), request.port(), TargetForm::Origin),
        };
        let fail = |reason: String| ProxyError::origin(request.host(), request.port(), reason);

        let stream = self
            .connector
            .connect(&host, port)
            .await
            .map_err(|e| fail(format!("connect to {host}:{port} failed: {e}")))?;
        let mut origin = BufReader::new(stream);

        send(origin.get_mut(), &request.to_bytes(form))
            .await
            .map_err(|e| fail(format!("send failed: {e}")))?;

        match tokio::time::timeout(
            self.read_timeout,
            Response::ingest(&mut origin, request.method(), &self.limits),
        )
        .await
        {
            Ok(Ok(response)) => {
                tracing::trace!(status = %response.status(), "Origin responded");
                Ok(response)
            }
            Ok(Err(e)) => Err(fail(format!("bad response: {e}"))),
            Err(_) => Err(fail("timed out waiting for response".into())),
        }
    }

    /// Connect to the CONNECT target, directly or through the upstream proxy.
    /// Returns the stream and any bytes the upstream sent past its reply.
    async fn open_tunnel(&self, request: &Request) -> Result<(TcpStream, Vec<u8>), ProxyError> {
        let fail = |reason: String| ProxyError::tunnel(request.host(), request.port(), reason);

        let Some(upstream) = &self.upstream else {
            let origin = self
                .connector
                .connect(request.host(), request.port())
                .await
                .map_err(|e| fail(e.to_string()))?;
            return Ok((origin, Vec::new()));
        };

        let stream = self
            .connector
            .connect(&upstream.host, upstream.port)
            .await
            .map_err(|e| fail(format!("upstream {}:{}: {e}", upstream.host, upstream.port)))?;
        let mut origin = BufReader::new(stream);

        let mut connect = Request::new(Method::Connect, request.host(), request.port(), "");
        connect.header_mut().set(HOST, request.authority());
        send(origin.get_mut(), &connect.to_bytes(TargetForm::Absolute))
            .await
            .map_err(|e| fail(format!("upstream send failed: {e}")))?;

        let reply = match tokio::time::timeout(
            self.read_timeout,
            Response::ingest_head(&mut origin, &self.limits),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(fail(format!("bad upstream reply: {e}"))),
            Err(_) => return Err(fail("timed out waiting for upstream".into())),
        };
        if !reply.status().is_success() {
            return Err(fail(format!("upstream answered {}", reply.status())));
        }

        let pending = origin.buffer().to_vec();
        Ok((origin.into_inner(), pending))
    }

    async fn bridge(
        &self,
        client: BufReader<TcpStream>,
        mut origin: TcpStream,
        origin_pending: Vec<u8>,
        start: Instant,
    ) {
        let client_pending = client.buffer().to_vec();
        let mut client = client.into_inner();

        let handshake = async {
            Response::tunnel_established().write_to(&mut client).await?;
            if !origin_pending.is_empty() {
                client.write_all(&origin_pending).await?;
            }
            if !client_pending.is_empty() {
                origin.write_all(&client_pending).await?;
            }
            Ok::<_, std::io::Error>(())
        };
        if let Err(e) = handshake.await {
            tracing::debug!(error = %e, "Tunnel handshake failed");
            metrics::record_tunnel("failed", 0, 0);
            return;
        }
        metrics::record_request("CONNECT", StatusCode::OK.as_u16(), start);

        let stats = self.tunnel.run(client, origin).await;
        let client_to_origin = stats.client_to_origin + client_pending.len() as u64;
        let origin_to_client = stats.origin_to_client + origin_pending.len() as u64;
        metrics::record_tunnel(
            if stats.timed_out { "idle_timeout" } else { "closed" },
            client_to_origin,
            origin_to_client,
        );
        tracing::info!(
            client_to_origin,
            origin_to_client,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tunnel closed"
        );
    }

    async fn finish(
        &self,
        client: &mut BufReader<TcpStream>,
        method: &str,
        result: Result<(StatusCode, CacheStatus), ProxyError>,
        start: Instant,
    ) {
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok((status, cache)) => {
                tracing::info!(
                    method = %method,
                    status = status.as_u16(),
                    cache = cache.as_str(),
                    elapsed_ms,
                    "Request served"
                );
                metrics::record_request(method, status.as_u16(), start);
            }
            Err(err) if err.is_fatal() => {
                tracing::debug!(method = %method, error = %err, "Closing connection without response");
            }
            Err(err) => {
                let status = err.status();
                tracing::info!(
                    method = %method,
                    status = status.as_u16(),
                    error = %err,
                    elapsed_ms,
                    "Request refused"
                );
                let response = Response::with_message(status, &err.to_string());
                if let Err(e) = self.write_response(client.get_mut(), &response).await {
                    tracing::debug!(error = %e, "Failed to send error response");
                }
                metrics::record_request(method, status.as_u16(), start);
            }
        }
    }
}

async fn send(stream: &mut TcpStream, bytes: &[u8]) -> std::io::Result<()> {
    stream.write_all(bytes).await?;
    stream.flush().await
}
