//! Ordered, case-insensitive header collection.
//!
//! # Responsibilities
//! - Parse header lines up to the blank line
//! - Case-insensitive lookup, numeric lookup, upsert
//! - Keep insertion order so a relayed message keeps its header layout
//!
//! # Design Decisions
//! - One entry per logical name; list-valued headers such as
//!   `X-Forwarded-For` are appended to as a `", "`-separated value
//! - Repeated lines on the wire are folded the same way, except `Set-Cookie`

use tokio::io::AsyncBufRead;

use super::wire::{line_str, read_line};
use super::{MessageError, MessageLimits};

/// Separator used when a header value holds a list.
pub const LIST_SEPARATOR: &str = ", ";

/// Header name/value pairs in wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    entries: Vec<(String, String)>,
}

impl Header {
    /// Create an empty header collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read header lines until (and including) the blank line.
    pub async fn ingest<R>(reader: &mut R, limits: &MessageLimits) -> Result<Self, MessageError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut header = Header::new();
        loop {
            let line = read_line(reader, limits.max_line_bytes, "header line")
                .await?
                .ok_or_else(|| {
                    std::io::Error::from(std::io::ErrorKind::UnexpectedEof)
                })?;
            let line = line_str(&line, "header line")?;
            if line.is_empty() {
                return Ok(header);
            }
            if header.entries.len() >= limits.max_headers {
                return Err(MessageError::TooLarge("header count"));
            }

            let (name, value) = line.split_once(':').ok_or_else(|| {
                MessageError::Malformed(format!("header line without ':': {line:?}"))
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(MessageError::Malformed("empty header name".into()));
            }
            header.add_received(name, value.trim());
        }
    }

    fn add_received(&mut self, name: &str, value: &str) {
        // RFC 6265: Set-Cookie lines cannot be folded into one value.
        if name.eq_ignore_ascii_case("set-cookie") {
            self.entries.push((name.to_string(), value.to_string()));
        } else {
            self.append_list(name, value);
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Exact string value of `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1.as_str())
    }

    /// Numeric value of `name`; fails if absent or not a decimal number.
    pub fn get_number(&self, name: &str) -> Result<u64, MessageError> {
        let value = self
            .get(name)
            .ok_or_else(|| MessageError::Framing(format!("missing {name} header")))?;
        value
            .parse()
            .map_err(|_| MessageError::Framing(format!("{name} is not numeric: {value:?}")))
    }

    /// Whether `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Insert `name`, or replace its value in place if it already exists.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Append `value` to the list held by `name`, creating it if absent.
    pub fn append_list(&mut self, name: &str, value: &str) {
        match self.position(name) {
            Some(i) if !self.entries[i].1.is_empty() => {
                let entry = &mut self.entries[i].1;
                entry.push_str(LIST_SEPARATOR);
                entry.push_str(value);
            }
            _ => self.set(name, value),
        }
    }

    /// Items of a comma-separated list value, trimmed.
    pub fn list(&self, name: &str) -> impl Iterator<Item = &str> {
        self.get(name)
            .into_iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|item| !item.is_empty())
    }

    /// Remove `name`, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    /// Iterate over `(name, value)` in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as `name: value\r\n` lines. The blank line is not included.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        for (name, value) in &self.entries {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
    }
}
