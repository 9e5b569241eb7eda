//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use forward_proxy::config::ProxyConfig;
use forward_proxy::lifecycle::Shutdown;
use forward_proxy::net::{FixedConnector, Listener};
use forward_proxy::proxy::{ProxyServer, RequestHandler};
use forward_proxy::scheduler::Scheduler;
use forward_proxy::security::Blocklist;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Origin server that answers every request with the same bytes and records
/// what it was sent.
pub struct MockOrigin {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockOrigin {
    pub async fn start(response: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let (counter, log) = (hits.clone(), requests.clone());
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let (counter, log) = (counter.clone(), log.clone());
                tokio::spawn(async move {
                    let mut socket = BufReader::new(socket);
                    let raw = read_request(&mut socket).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    log.lock().unwrap().push(raw);
                    let socket = socket.get_mut();
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            addr,
            hits,
            requests,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Read one request head plus a Content-Length body, as text.
async fn read_request(socket: &mut BufReader<TcpStream>) -> String {
    let mut raw = String::new();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if socket.read_line(&mut line).await.unwrap_or(0) == 0 {
            return raw;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
        raw.push_str(&line);
        if line == "\r\n" {
            break;
        }
    }
    let mut body = vec![0u8; content_length];
    if socket.read_exact(&mut body).await.is_ok() {
        raw.push_str(&String::from_utf8_lossy(&body));
    }
    raw
}

/// A proxy whose connector sends every origin connection to `target`.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub handler: Arc<RequestHandler<FixedConnector>>,
    pub shutdown: Shutdown,
}

impl TestProxy {
    pub async fn start(config: ProxyConfig, blocklist: Blocklist, target: SocketAddr) -> Self {
        let handler = Arc::new(RequestHandler::with_connector(
            &config,
            blocklist,
            FixedConnector::new(target).with_connect_timeout(config.timeouts.connect()),
        ));
        let scheduler = Scheduler::new(handler.clone(), &config.scheduler);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = ProxyServer::new(Listener::from_tokio(listener), scheduler);

        let shutdown = Shutdown::new();
        tokio::spawn(server.run(shutdown.subscribe()));

        Self {
            addr,
            handler,
            shutdown,
        }
    }

    pub async fn with_origin(target: SocketAddr) -> Self {
        Self::start(test_config(), Blocklist::empty(), target).await
    }
}

/// Small pool and short timeouts so failures show up quickly.
pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.scheduler.workers = 4;
    config.scheduler.queue_depth = 16;
    config.timeouts.connect_secs = 2;
    config.timeouts.read_secs = 2;
    config.tunnel.idle_timeout_secs = 1;
    config
}

/// Address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Send raw bytes to the proxy and read until it closes the connection.
pub async fn exchange(proxy: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut response))
        .await
        .expect("proxy did not close the connection")
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

pub fn get(url: &str) -> String {
    format!("GET {url} HTTP/1.1\r\nUser-Agent: integration-test\r\n\r\n")
}

/// Status code of a raw response.
pub fn status_of(response: &str) -> u16 {
    response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or(0)
}

pub fn body_of(response: &str) -> &str {
    response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or("")
}
