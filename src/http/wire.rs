//! Bounded line and block reads shared by the message parsers.

use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::MessageError;

/// Read one line, terminator included.
///
/// Returns `Ok(None)` when the stream is at EOF before the first byte.
pub(crate) async fn read_line<R>(
    reader: &mut R,
    limit: usize,
    what: &'static str,
) -> Result<Option<Vec<u8>>, MessageError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let read = (&mut *reader)
        .take(limit as u64)
        .read_until(b'\n', &mut line)
        .await?;

    if read == 0 {
        return Ok(None);
    }
    if line.last() != Some(&b'\n') {
        if read >= limit {
            return Err(MessageError::TooLarge(what));
        }
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    Ok(Some(line))
}

/// Strip a trailing `\n` or `\r\n`.
pub(crate) fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Decode a start or header line, terminator removed.
pub(crate) fn line_str<'a>(line: &'a [u8], what: &str) -> Result<&'a str, MessageError> {
    std::str::from_utf8(trim_eol(line))
        .map_err(|_| MessageError::Malformed(format!("{what} is not valid UTF-8")))
}

/// Append exactly `len` bytes from `reader` to `out`.
pub(crate) async fn read_exact_into<R>(
    reader: &mut R,
    len: usize,
    out: &mut Vec<u8>,
) -> Result<(), MessageError>
where
    R: AsyncBufRead + Unpin,
{
    out.reserve(len);
    let read = (&mut *reader).take(len as u64).read_to_end(out).await?;
    if read != len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_lines_with_terminators() {
        let mut input: &[u8] = b"GET / HTTP/1.1\r\nHost: a\n";
        let first = read_line(&mut input, 64, "line").await.unwrap().unwrap();
        assert_eq!(first, b"GET / HTTP/1.1\r\n");
        assert_eq!(trim_eol(&first), b"GET / HTTP/1.1");

        let second = read_line(&mut input, 64, "line").await.unwrap().unwrap();
        assert_eq!(trim_eol(&second), b"Host: a");

        assert!(read_line(&mut input, 64, "line").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overlong_line_is_rejected() {
        let mut input: &[u8] = b"aaaaaaaaaaaaaaaaaaaa\r\n";
        let err = read_line(&mut input, 8, "header line").await.unwrap_err();
        assert!(matches!(err, MessageError::TooLarge("header line")));
    }

    #[tokio::test]
    async fn truncated_line_is_a_transport_error() {
        let mut input: &[u8] = b"partial";
        let err = read_line(&mut input, 64, "line").await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn short_block_is_detected() {
        let mut input: &[u8] = b"abc";
        let mut out = Vec::new();
        assert!(read_exact_into(&mut input, 5, &mut out).await.is_err());
    }
}
