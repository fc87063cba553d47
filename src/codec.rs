use std::fmt;
use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::CharsetError;

/// Line terminator used in both directions.
pub const CRLF: &[u8] = b"\r\n";

/// Longest line accepted before it is discarded.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

/// Text encoding applied to the lines of one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Ascii,
    Utf8,
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Charset::Ascii => f.write_str("US-ASCII"),
            Charset::Utf8 => f.write_str("UTF-8"),
        }
    }
}

impl Charset {
    pub fn decode(self, bytes: Vec<u8>) -> Result<String, CharsetError> {
        match self {
            Charset::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(position) => Err(CharsetError { charset: self, position }),
                // All bytes are ASCII, which is always valid UTF-8.
                None => String::from_utf8(bytes).map_err(|e| CharsetError {
                    charset: self,
                    position: e.utf8_error().valid_up_to(),
                }),
            },
            Charset::Utf8 => String::from_utf8(bytes).map_err(|e| CharsetError {
                charset: self,
                position: e.utf8_error().valid_up_to(),
            }),
        }
    }

    /// Encodes a line and appends the terminator.
    pub fn encode_line(self, line: &str) -> Result<Vec<u8>, CharsetError> {
        if self == Charset::Ascii {
            if let Some(position) = line.bytes().position(|b| !b.is_ascii()) {
                return Err(CharsetError { charset: self, position });
            }
        }

        let mut out = Vec::with_capacity(line.len() + CRLF.len());
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(CRLF);
        Ok(out)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    Line(Vec<u8>),
    /// A line longer than the limit went by; its content was dropped.
    Overlong,
}

/// Splits a byte stream into CRLF terminated lines.
///
/// A bare LF is ordinary line content. Bytes left over when the stream ends
/// without a terminator are dropped.
pub struct LineReader<R> {
    inner: R,
    max_len: usize,
    buf: Vec<u8>,
    overflowed: bool,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(inner: R, max_len: usize) -> Self {
        Self {
            inner,
            max_len,
            buf: Vec::new(),
            overflowed: false,
        }
    }

    /// Returns `Ok(None)` on end of stream.
    pub async fn next_frame(&mut self) -> io::Result<Option<Frame>> {
        loop {
            let chunk = self.inner.fill_buf().await?;
            if chunk.is_empty() {
                self.buf.clear();
                return Ok(None);
            }

            let (take, found_lf) = match chunk.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (chunk.len(), false),
            };
            self.buf.extend_from_slice(&chunk[..take]);
            self.inner.consume(take);

            if found_lf && self.buf.ends_with(CRLF) {
                self.buf.truncate(self.buf.len() - CRLF.len());
                let line = std::mem::take(&mut self.buf);
                let overflowed = std::mem::take(&mut self.overflowed);

                if overflowed || line.len() > self.max_len {
                    return Ok(Some(Frame::Overlong));
                }
                return Ok(Some(Frame::Line(line)));
            }

            if self.buf.len() > self.max_len + 1 {
                // Keep the last byte: it may be the CR of a split terminator.
                let last = self.buf.pop();
                self.buf.clear();
                self.buf.extend(last);
                self.overflowed = true;
            }
        }
    }
}
