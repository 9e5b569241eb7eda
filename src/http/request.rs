//! Client request parsing and re-serialization.
//!
//! # Responsibilities
//! - Parse the request line and resolve the target to host, port and path
//! - Ingest header and payload
//! - Render the request for an origin server or an upstream proxy
//! - Derive the cache fingerprint
//!
//! # Design Decisions
//! - Target forms: absolute (`http://host:port/path`), authority (CONNECT
//!   only) and origin (`/path` plus `Host`)
//! - The path is kept as sent; only host and port are normalised
//! - A request without `Content-Length` or chunked encoding has no payload

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use tokio::io::AsyncBufRead;
use url::{Host, Url};

use super::payload::CONTENT_LENGTH;
use super::wire::{line_str, read_line};
use super::{Header, MessageError, MessageLimits, Payload};

pub const HOST: &str = "Host";

const DEFAULT_HTTP_PORT: u16 = 80;
const DEFAULT_TUNNEL_PORT: u16 = 443;

/// Request method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Trace,
    Patch,
    Connect,
    /// Any other syntactically valid method token.
    Extension(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
            Method::Connect => "CONNECT",
            Method::Extension(token) => token,
        }
    }
}

impl FromStr for Method {
    type Err = MessageError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let method = match token {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "OPTIONS" => Method::Options,
            "TRACE" => Method::Trace,
            "PATCH" => Method::Patch,
            "CONNECT" => Method::Connect,
            other => {
                let valid = !other.is_empty()
                    && other
                        .bytes()
                        .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
                if !valid {
                    return Err(MessageError::Malformed(format!("invalid method {other:?}")));
                }
                Method::Extension(other.to_string())
            }
        };
        Ok(method)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the request target is written when the request is relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetForm {
    /// `GET /path HTTP/1.1`, sent straight to the origin.
    Origin,
    /// `GET http://host:port/path HTTP/1.1`, sent to another proxy.
    Absolute,
}

/// Cache key: method, host, port and path. Headers and body never take part.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    method: Method,
    host: String,
    port: u16,
    path: String,
}

impl Fingerprint {
    /// Deterministic hash, stable for the life of the process.
    pub fn hash_value(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}{}", self.method, self.host, self.port, self.path)
    }
}

/// A client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    host: String,
    port: u16,
    path: String,
    protocol: String,
    header: Header,
    payload: Payload,
    client_addr: String,
}

impl Request {
    /// Build a request with an empty header and payload.
    pub fn new(method: Method, host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            method,
            host: host.into(),
            port,
            path: path.into(),
            protocol: "HTTP/1.1".to_string(),
            header: Header::new(),
            payload: Payload::empty(),
            client_addr: String::new(),
        }
    }

    /// Read a complete request: request line, header and payload.
    pub async fn ingest<R>(
        reader: &mut R,
        client_addr: impl Into<String>,
        limits: &MessageLimits,
    ) -> Result<Self, MessageError>
    where
        R: AsyncBufRead + Unpin,
    {
        let line = read_line(reader, limits.max_line_bytes, "request line")
            .await?
            .ok_or(MessageError::Closed)?;
        let line = line_str(&line, "request line")?;
        let mut parts = line.split_whitespace();
        let (method, target, protocol) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(method), Some(target), Some(protocol), None) => (method, target, protocol),
            _ => return Err(MessageError::Malformed(format!("bad request line {line:?}"))),
        };
        if !protocol.starts_with("HTTP/") {
            return Err(MessageError::Malformed(format!("unknown protocol {protocol:?}")));
        }
        let method: Method = method.parse()?;

        let header = Header::ingest(reader, limits).await?;
        let (host, port, path) = resolve_target(&method, target, &header)?;

        let payload = if Payload::is_chunked(&header) || header.contains(CONTENT_LENGTH) {
            Payload::ingest(&header, reader, limits).await?
        } else {
            Payload::empty()
        };

        Ok(Self {
            method,
            host,
            port,
            path,
            protocol: protocol.to_string(),
            header,
            payload,
            client_addr: client_addr.into(),
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target host, lowercased, IPv6 literals without brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path and query as sent by the client.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: Payload) {
        self.payload = payload;
    }

    /// Address of the client that sent this request.
    pub fn client_addr(&self) -> &str {
        &self.client_addr
    }

    pub fn set_client_addr(&mut self, addr: impl Into<String>) {
        self.client_addr = addr.into();
    }

    /// `host:port`, with IPv6 literals bracketed.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Value for the `Host` header sent onward: the resolved target, with
    /// the port left out when it is the HTTP default.
    pub fn host_header(&self) -> String {
        if self.port == DEFAULT_HTTP_PORT && !self.host.contains(':') {
            self.host.clone()
        } else if self.port == DEFAULT_HTTP_PORT {
            format!("[{}]", self.host)
        } else {
            self.authority()
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            method: self.method.clone(),
            host: self.host.clone(),
            port: self.port,
            path: self.path.clone(),
        }
    }

    /// Serialize the request line, header, blank line and payload.
    pub fn to_bytes(&self, form: TargetForm) -> Vec<u8> {
        let target = match (&self.method, form) {
            (Method::Connect, _) => self.authority(),
            (_, TargetForm::Origin) => self.path.clone(),
            (_, TargetForm::Absolute) => format!("http://{}{}", self.authority(), self.path),
        };

        let mut out = Vec::with_capacity(256 + self.payload.len());
        out.extend_from_slice(
            format!("{} {} {}\r\n", self.method, target, self.protocol).as_bytes(),
        );
        self.header.write_to(&mut out);
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(self.payload.as_bytes());
        out
    }
}

/// Resolve a request target into `(host, port, path)`.
fn resolve_target(
    method: &Method,
    target: &str,
    header: &Header,
) -> Result<(String, u16, String), MessageError> {
    if *method == Method::Connect {
        let (host, port) = parse_authority(target, DEFAULT_TUNNEL_PORT)?;
        return Ok((host, port, String::new()));
    }

    if target.starts_with('/') {
        let host_header = header
            .get(HOST)
            .ok_or_else(|| MessageError::Malformed("origin-form target without Host".into()))?;
        let (host, port) = parse_authority(host_header, DEFAULT_HTTP_PORT)?;
        return Ok((host, port, target.to_string()));
    }

    let (scheme, rest) = target
        .split_once("://")
        .ok_or_else(|| MessageError::Malformed(format!("unsupported target {target:?}")))?;
    if !scheme.eq_ignore_ascii_case("http") {
        return Err(MessageError::Malformed(format!("unsupported scheme {scheme:?}")));
    }
    let url = Url::parse(target)
        .map_err(|e| MessageError::Malformed(format!("invalid target {target:?}: {e}")))?;
    let host = url
        .host()
        .map(host_string)
        .ok_or_else(|| MessageError::Malformed(format!("target without host {target:?}")))?;
    let port = url.port_or_known_default().unwrap_or(DEFAULT_HTTP_PORT);

    let path = match rest.find(['/', '?']) {
        Some(i) if rest[i..].starts_with('/') => rest[i..].to_string(),
        Some(i) => format!("/{}", &rest[i..]),
        None => "/".to_string(),
    };
    Ok((host, port, path))
}

/// Parse `host[:port]` or `[v6]:port`.
fn parse_authority(authority: &str, default_port: u16) -> Result<(String, u16), MessageError> {
    let malformed = || MessageError::Malformed(format!("invalid authority {authority:?}"));

    let (host, port) = if authority.starts_with('[') {
        let end = authority.find(']').ok_or_else(malformed)?;
        let (host, rest) = authority.split_at(end + 1);
        match rest.strip_prefix(':') {
            Some(port) => (host, Some(port)),
            None if rest.is_empty() => (host, None),
            None => return Err(malformed()),
        }
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    let port = match port {
        Some(port) => port.parse().map_err(|_| malformed())?,
        None => default_port,
    };
    if host.is_empty() || host.contains(['/', '@', ' ']) {
        return Err(malformed());
    }
    let host = Host::parse(host).map_err(|_| malformed())?;
    Ok((host_string(host), port))
}

fn host_string<S: AsRef<str>>(host: Host<S>) -> String {
    match host {
        Host::Domain(domain) => domain.as_ref().to_ascii_lowercase(),
        Host::Ipv4(addr) => addr.to_string(),
        Host::Ipv6(addr) => addr.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(raw: &str) -> Result<Request, MessageError> {
        let mut input = raw.as_bytes();
        Request::ingest(&mut input, "10.0.0.5", &MessageLimits::default()).await
    }

    #[tokio::test]
    async fn absolute_form_target() {
        let request = parse("GET http://Example.com:8080/a/b?q=1 HTTP/1.1\r\nAccept: */*\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(request.method(), &Method::Get);
        assert_eq!(request.host(), "example.com");
        assert_eq!(request.port(), 8080);
        assert_eq!(request.path(), "/a/b?q=1");
        assert_eq!(request.protocol(), "HTTP/1.1");
        assert_eq!(request.client_addr(), "10.0.0.5");
        assert!(request.payload().is_empty());
    }

    #[tokio::test]
    async fn absolute_form_defaults() {
        let request = parse("GET http://example.com HTTP/1.0\r\n\r\n").await.unwrap();
        assert_eq!(request.port(), 80);
        assert_eq!(request.path(), "/");

        let request = parse("GET http://example.com?x HTTP/1.0\r\n\r\n").await.unwrap();
        assert_eq!(request.path(), "/?x");
    }

    #[tokio::test]
    async fn origin_form_uses_host_header() {
        let request = parse("GET /index.html HTTP/1.1\r\nHost: www.example.com:81\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(request.host(), "www.example.com");
        assert_eq!(request.port(), 81);
        assert_eq!(request.path(), "/index.html");
    }

    #[tokio::test]
    async fn origin_form_without_host_is_malformed() {
        let err = parse("GET / HTTP/1.1\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, MessageError::Malformed(_)));
    }

    #[tokio::test]
    async fn connect_authority_form() {
        let request = parse("CONNECT secure.example:8443 HTTP/1.1\r\nHost: secure.example\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(request.method(), &Method::Connect);
        assert_eq!(request.host(), "secure.example");
        assert_eq!(request.port(), 8443);

        let request = parse("CONNECT [::1]:443 HTTP/1.1\r\n\r\n").await.unwrap();
        assert_eq!(request.host(), "::1");
        assert_eq!(request.authority(), "[::1]:443");
    }

    #[tokio::test]
    async fn post_payload_is_ingested() {
        let request = parse("POST http://a.example/form HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc")
            .await
            .unwrap();
        assert_eq!(request.payload().as_bytes(), b"abc");
    }

    #[tokio::test]
    async fn malformed_request_lines() {
        for raw in [
            "GET\r\n\r\n",
            "GET http://a.example/ HTTP/1.1 extra\r\n\r\n",
            "GET http://a.example/ FTP/1.0\r\n\r\n",
            "G(T http://a.example/ HTTP/1.1\r\n\r\n",
            "GET https://a.example/ HTTP/1.1\r\n\r\n",
            "CONNECT a.example:notaport HTTP/1.1\r\n\r\n",
        ] {
            let err = parse(raw).await.unwrap_err();
            assert!(matches!(err, MessageError::Malformed(_)), "{raw:?} gave {err:?}");
        }
    }

    #[tokio::test]
    async fn empty_stream_is_closed() {
        let err = parse("").await.unwrap_err();
        assert!(matches!(err, MessageError::Closed));
    }

    #[tokio::test]
    async fn unknown_methods_still_parse() {
        let request = parse("BREW http://pot.example/ HTTP/1.1\r\n\r\n").await.unwrap();
        assert_eq!(request.method(), &Method::Extension("BREW".into()));
    }

    #[test]
    fn renders_both_target_forms() {
        let mut request = Request::new(Method::Get, "example.com", 8080, "/x?y");
        request.header_mut().set("Host", "example.com:8080");

        assert_eq!(
            request.to_bytes(TargetForm::Origin),
            b"GET /x?y HTTP/1.1\r\nHost: example.com:8080\r\n\r\n"
        );
        assert_eq!(
            request.to_bytes(TargetForm::Absolute),
            b"GET http://example.com:8080/x?y HTTP/1.1\r\nHost: example.com:8080\r\n\r\n"
        );

        let connect = Request::new(Method::Connect, "example.com", 443, "");
        assert_eq!(
            connect.to_bytes(TargetForm::Absolute),
            b"CONNECT example.com:443 HTTP/1.1\r\n\r\n"
        );
    }

    #[test]
    fn host_header_follows_the_target() {
        assert_eq!(Request::new(Method::Get, "example.com", 80, "/").host_header(), "example.com");
        assert_eq!(
            Request::new(Method::Get, "example.com", 8080, "/").host_header(),
            "example.com:8080"
        );
        assert_eq!(Request::new(Method::Get, "::1", 80, "/").host_header(), "[::1]");
        assert_eq!(Request::new(Method::Get, "::1", 8080, "/").host_header(), "[::1]:8080");
    }

    #[test]
    fn fingerprint_ignores_headers_and_body() {
        let mut a = Request::new(Method::Get, "example.com", 80, "/");
        let b = Request::new(Method::Get, "example.com", 80, "/");
        a.header_mut().set("Accept-Language", "fr");
        a.set_payload(Payload::from_bytes("ignored"));

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().hash_value(), b.fingerprint().hash_value());

        let c = Request::new(Method::Head, "example.com", 80, "/");
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
