//! End-to-end tests for CONNECT tunnels.

use std::net::SocketAddr;
use std::time::Duration;

use forward_proxy::config::UpstreamConfig;
use forward_proxy::security::Blocklist;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

mod common;
use common::{closed_port, exchange, status_of, test_config, TestProxy};

const ESTABLISHED: &[u8] = b"HTTP/1.0 200 OK\r\n\r\n";

/// Echo server: returns every byte it receives, closes on EOF.
async fn echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
                let _ = writer.shutdown().await;
            });
        }
    });
    addr
}

async fn open_tunnel(proxy: SocketAddr, extra: &[u8]) -> TcpStream {
    let mut client = TcpStream::connect(proxy).await.unwrap();
    let mut request = b"CONNECT secure.test:443 HTTP/1.1\r\nHost: secure.test:443\r\n\r\n".to_vec();
    request.extend_from_slice(extra);
    client.write_all(&request).await.unwrap();

    let mut reply = vec![0u8; ESTABLISHED.len()];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, ESTABLISHED);
    client
}

async fn read_n(client: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut buf))
        .await
        .expect("tunnel stalled")
        .unwrap();
    buf
}

#[tokio::test]
async fn tunnel_relays_both_directions() {
    let proxy = TestProxy::with_origin(echo_server().await).await;
    let mut client = open_tunnel(proxy.addr, b"").await;

    client.write_all(b"ping").await.unwrap();
    assert_eq!(read_n(&mut client, 4).await, b"ping");

    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    let (mut reader, mut writer) = client.split();
    let mut echoed = vec![0u8; payload.len()];
    let (written, read) = tokio::join!(writer.write_all(&payload), reader.read_exact(&mut echoed));
    written.unwrap();
    read.unwrap();
    assert_eq!(echoed, payload);
}

#[tokio::test]
async fn bytes_sent_with_the_connect_are_forwarded() {
    let proxy = TestProxy::with_origin(echo_server().await).await;
    let mut client = open_tunnel(proxy.addr, b"early").await;

    assert_eq!(read_n(&mut client, 5).await, b"early");
}

#[tokio::test]
async fn half_close_tears_tunnel_down() {
    let proxy = TestProxy::with_origin(echo_server().await).await;
    let mut client = open_tunnel(proxy.addr, b"").await;

    client.write_all(b"last words").await.unwrap();
    client.shutdown().await.unwrap();

    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut rest))
        .await
        .expect("tunnel was not torn down")
        .unwrap();
    assert_eq!(rest, b"last words");
}

#[tokio::test]
async fn idle_tunnel_times_out() {
    let proxy = TestProxy::with_origin(echo_server().await).await;
    let mut client = open_tunnel(proxy.addr, b"").await;

    let mut rest = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut rest)).await;
    assert!(read.is_ok(), "idle tunnel stayed open");
    assert!(rest.is_empty());
}

#[tokio::test]
async fn unreachable_target_is_510() {
    let proxy = TestProxy::with_origin(closed_port().await).await;

    let response = exchange(proxy.addr, "CONNECT secure.test:443 HTTP/1.1\r\n\r\n").await;

    assert_eq!(status_of(&response), 510);
}

#[tokio::test]
async fn blocked_tunnel_target_is_forbidden() {
    let blocklist = Blocklist::new(["secure\\.test"]).unwrap();
    let proxy = TestProxy::start(test_config(), blocklist, echo_server().await).await;

    let response = exchange(proxy.addr, "CONNECT secure.test:443 HTTP/1.1\r\n\r\n").await;

    assert_eq!(status_of(&response), 403);
}

#[tokio::test]
async fn tunnel_through_upstream_proxy() {
    // Upstream that accepts the CONNECT, then echoes.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            socket.read_exact(&mut byte).await.unwrap();
            head.push(byte[0]);
        }
        let _ = seen_tx.send(String::from_utf8(head).unwrap());
        socket
            .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
            .await
            .unwrap();
        let (mut reader, mut writer) = socket.split();
        let _ = tokio::io::copy(&mut reader, &mut writer).await;
    });

    let mut config = test_config();
    config.upstream = Some(UpstreamConfig {
        host: "parent.test".into(),
        port: 3128,
    });
    let proxy = TestProxy::start(config, Blocklist::empty(), upstream_addr).await;
    let mut client = open_tunnel(proxy.addr, b"").await;

    let seen = seen_rx.await.unwrap();
    assert!(seen.starts_with("CONNECT secure.test:443 HTTP/1.1\r\n"), "{seen}");

    client.write_all(b"via parent").await.unwrap();
    assert_eq!(read_n(&mut client, 10).await, b"via parent");
}

#[tokio::test]
async fn upstream_refusal_is_510() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        let _ = socket
            .write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n")
            .await;
    });

    let mut config = test_config();
    config.upstream = Some(UpstreamConfig {
        host: "parent.test".into(),
        port: 3128,
    });
    let proxy = TestProxy::start(config, Blocklist::empty(), upstream_addr).await;

    let response = exchange(proxy.addr, "CONNECT secure.test:443 HTTP/1.1\r\n\r\n").await;

    assert_eq!(status_of(&response), 510);
}
