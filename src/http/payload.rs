//! Message payload ingestion.
//!
//! # Responsibilities
//! - Length-delimited bodies (`Content-Length`)
//! - Chunked bodies (`Transfer-Encoding: chunked`)
//!
//! # Design Decisions
//! - Chunked bodies are kept in wire form (size lines, data, CRLFs, the
//!   terminating zero chunk) and replayed verbatim; only the logical length is
//!   computed from the chunk sizes
//! - Chunk extensions and trailers are tolerated and preserved

use tokio::io::AsyncBufRead;

use super::wire::{line_str, read_exact_into, read_line};
use super::{Header, MessageError, MessageLimits};

pub const CONTENT_LENGTH: &str = "Content-Length";
pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";

/// Raw payload bytes plus the decoded content length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    bytes: Vec<u8>,
    content_length: usize,
}

impl Payload {
    /// An empty payload.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A payload whose wire bytes are its content.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let content_length = bytes.len();
        Self {
            bytes,
            content_length,
        }
    }

    /// Whether `header` announces a chunked body.
    pub fn is_chunked(header: &Header) -> bool {
        header
            .list(TRANSFER_ENCODING)
            .last()
            .is_some_and(|coding| coding.eq_ignore_ascii_case("chunked"))
    }

    /// Read the payload framed as `header` describes.
    ///
    /// Without chunked encoding, `Content-Length` is required.
    pub async fn ingest<R>(
        header: &Header,
        reader: &mut R,
        limits: &MessageLimits,
    ) -> Result<Self, MessageError>
    where
        R: AsyncBufRead + Unpin,
    {
        if Self::is_chunked(header) {
            Self::ingest_chunked(reader, limits).await
        } else {
            let len = header.get_number(CONTENT_LENGTH)?;
            let len = usize::try_from(len).map_err(|_| MessageError::TooLarge("payload"))?;
            Self::ingest_exact(reader, len, limits).await
        }
    }

    /// Read exactly `len` bytes.
    pub async fn ingest_exact<R>(
        reader: &mut R,
        len: usize,
        limits: &MessageLimits,
    ) -> Result<Self, MessageError>
    where
        R: AsyncBufRead + Unpin,
    {
        if len > limits.max_payload_bytes {
            return Err(MessageError::TooLarge("payload"));
        }
        let mut bytes = Vec::new();
        read_exact_into(reader, len, &mut bytes).await?;
        Ok(Self::from_bytes(bytes))
    }

    /// Read a chunked body, keeping every byte as it appeared on the wire.
    pub async fn ingest_chunked<R>(
        reader: &mut R,
        limits: &MessageLimits,
    ) -> Result<Self, MessageError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut payload = Payload::empty();
        loop {
            let line = read_chunk_line(reader, limits).await?;
            let size = parse_chunk_size(line_str(&line, "chunk size line")?)?;
            payload.push_bounded(&line, limits)?;

            if size == 0 {
                break;
            }
            if size > limits.max_payload_bytes.saturating_sub(payload.bytes.len()) {
                return Err(MessageError::TooLarge("payload"));
            }
            read_exact_into(reader, size, &mut payload.bytes).await?;
            payload.content_length += size;

            let mut crlf = Vec::with_capacity(2);
            read_exact_into(reader, 2, &mut crlf).await?;
            if crlf != b"\r\n" {
                return Err(MessageError::Framing("chunk data not followed by CRLF".into()));
            }
            payload.bytes.extend_from_slice(&crlf);
        }

        // Trailer section: zero or more fields, then the final blank line.
        loop {
            let line = read_chunk_line(reader, limits).await?;
            payload.push_bounded(&line, limits)?;
            if line_str(&line, "trailer line")?.is_empty() {
                return Ok(payload);
            }
        }
    }

    fn push_bounded(&mut self, bytes: &[u8], limits: &MessageLimits) -> Result<(), MessageError> {
        if self.bytes.len() + bytes.len() > limits.max_payload_bytes {
            return Err(MessageError::TooLarge("payload"));
        }
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }

    /// Wire bytes, exactly as they will be replayed.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of wire bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decoded length: the sum of chunk sizes, or the byte count otherwise.
    pub fn content_length(&self) -> usize {
        self.content_length
    }
}

async fn read_chunk_line<R>(reader: &mut R, limits: &MessageLimits) -> Result<Vec<u8>, MessageError>
where
    R: AsyncBufRead + Unpin,
{
    read_line(reader, limits.max_line_bytes, "chunk line")
        .await?
        .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into())
}

fn parse_chunk_size(line: &str) -> Result<usize, MessageError> {
    let digits = line.split(';').next().unwrap_or_default().trim();
    usize::from_str_radix(digits, 16)
        .map_err(|_| MessageError::Framing(format!("invalid chunk size: {line:?}")))
}
