//! Newline-delimited frame reader.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Splits a stream into newline-terminated lines of raw bytes.
///
/// Lines are not required to be UTF-8; a bad byte is the frame decoder's
/// problem, not the connection's. [`FrameLines::next_line`] is cancel safe:
/// a partial line stays buffered until the next call completes it.
#[derive(Debug)]
pub struct FrameLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    complete: bool,
}

impl<R: AsyncRead + Unpin> FrameLines<R> {
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
            complete: false,
        }
    }

    /// Next line with surrounding whitespace trimmed, or `None` at end of
    /// stream. A final line without a terminator is still returned.
    ///
    /// # Errors
    ///
    /// Returns the underlying read error.
    pub async fn next_line(&mut self) -> io::Result<Option<&[u8]>> {
        if self.complete {
            self.buf.clear();
            self.complete = false;
        }
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }
        self.complete = true;
        Ok(Some(self.buf.trim_ascii()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn splits_lines_and_keeps_invalid_bytes() {
        let input: &[u8] = b"{\"a\":1}\r\n\n  \xff\xfe \nlast";
        let mut lines = FrameLines::new(input);
        assert_eq!(lines.next_line().await.unwrap(), Some(&b"{\"a\":1}"[..]));
        assert_eq!(lines.next_line().await.unwrap(), Some(&b""[..]));
        assert_eq!(lines.next_line().await.unwrap(), Some(&b"\xff\xfe"[..]));
        assert_eq!(lines.next_line().await.unwrap(), Some(&b"last"[..]));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn partial_line_survives_cancellation() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut lines = FrameLines::new(rx);

        tx.write_all(b"par").await.unwrap();
        let pending =
            tokio::time::timeout(std::time::Duration::from_millis(20), lines.next_line()).await;
        assert!(pending.is_err());

        tx.write_all(b"tial\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap(), Some(&b"partial"[..]));
    }
}
