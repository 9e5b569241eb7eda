//! Response parsing and rendering.
//!
//! # Responsibilities
//! - Parse an origin's status line, header and payload
//! - Synthesize proxy-generated responses (errors, tunnel establishment)
//! - Render status line, header, blank line and payload, always in that order
//!
//! # Design Decisions
//! - The reason phrase is always taken from the status table, never relayed
//! - Interim 1xx responses (other than 101) are consumed while waiting for
//!   the final response

use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};

use super::payload::CONTENT_LENGTH;
use super::wire::{line_str, read_line};
use super::{Header, MessageError, MessageLimits, Method, Payload, StatusCode};

/// Protocol token used for responses the proxy writes itself.
pub const DEFAULT_PROTOCOL: &str = "HTTP/1.0";

/// An HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    protocol: String,
    status: StatusCode,
    header: Header,
    payload: Payload,
}

impl Response {
    /// A response with no header and no payload.
    pub fn new(protocol: impl Into<String>, status: StatusCode) -> Self {
        Self {
            protocol: protocol.into(),
            status,
            header: Header::new(),
            payload: Payload::empty(),
        }
    }

    /// A proxy-generated response carrying `message` as its payload.
    pub fn with_message(status: StatusCode, message: &str) -> Self {
        let mut response = Self::new(DEFAULT_PROTOCOL, status);
        response.set_payload(message);
        response
    }

    /// `200 OK` sent to a client once its CONNECT target is reachable.
    /// No payload: the tunnel starts right after the blank line.
    pub fn tunnel_established() -> Self {
        Self::new(DEFAULT_PROTOCOL, StatusCode::OK)
    }

    /// Read status line and header, leaving the payload on the stream.
    pub async fn ingest_head<R>(reader: &mut R, limits: &MessageLimits) -> Result<Self, MessageError>
    where
        R: AsyncBufRead + Unpin,
    {
        let line = read_line(reader, limits.max_line_bytes, "status line")
            .await?
            .ok_or(MessageError::Closed)?;
        let line = line_str(&line, "status line")?;
        let (protocol, rest) = line
            .split_once(' ')
            .ok_or_else(|| MessageError::Malformed(format!("bad status line {line:?}")))?;
        if !protocol.starts_with("HTTP/") {
            return Err(MessageError::Malformed(format!("unknown protocol {protocol:?}")));
        }
        let code = rest
            .split_whitespace()
            .next()
            .filter(|code| code.len() == 3)
            .and_then(|code| code.parse::<u16>().ok())
            .filter(|code| (100..1000).contains(code))
            .ok_or_else(|| MessageError::Malformed(format!("bad status code in {line:?}")))?;

        let header = Header::ingest(reader, limits).await?;
        Ok(Self {
            protocol: protocol.to_string(),
            status: StatusCode::from_u16(code),
            header,
            payload: Payload::empty(),
        })
    }

    /// Read a complete final response to a request made with `method`.
    pub async fn ingest<R>(
        reader: &mut R,
        method: &Method,
        limits: &MessageLimits,
    ) -> Result<Self, MessageError>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            let mut response = Self::ingest_head(reader, limits).await?;
            if response.status.is_informational() && response.status.as_u16() != 101 {
                tracing::trace!(status = %response.status, "Skipping interim response");
                continue;
            }
            response.ingest_payload(reader, method, limits).await?;
            return Ok(response);
        }
    }

    /// Read the payload that follows an already-ingested head.
    pub async fn ingest_payload<R>(
        &mut self,
        reader: &mut R,
        method: &Method,
        limits: &MessageLimits,
    ) -> Result<(), MessageError>
    where
        R: AsyncBufRead + Unpin,
    {
        if *method == Method::Head || self.status.forbids_payload() {
            self.payload = Payload::empty();
        } else {
            self.payload = Payload::ingest(&self.header, reader, limits).await?;
        }
        Ok(())
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn status(&self) -> StatusCode {
        self.status
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

    /// Replace the payload with `body` and update `Content-Length` to match.
    pub fn set_payload(&mut self, body: impl Into<Vec<u8>>) {
        self.payload = Payload::from_bytes(body);
        self.header
            .set(CONTENT_LENGTH, self.payload.len().to_string());
    }

    /// Status line, header, blank line, payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.payload.len());
        out.extend_from_slice(
            format!(
                "{} {} {}\r\n",
                self.protocol,
                self.status.as_u16(),
                self.status.reason()
            )
            .as_bytes(),
        );
        self.header.write_to(&mut out);
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(self.payload.as_bytes());
        out
    }

    /// Write the rendered response and flush.
    pub async fn write_to<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_bytes()).await?;
        writer.flush().await
    }
}
