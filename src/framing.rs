//! Content-Length framing for the analysis process streams.
//!
//! The language server speaks `Content-Length: N\r\n\r\n{json}` framing over
//! stdin/stdout. [`FrameReader`] and [`FrameWriter`] are generic over the
//! underlying stream so they work against child-process pipes in production
//! and in-memory buffers in tests.

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::protocol::ProtocolMessage;

/// Maximum frame size (4 MiB) to prevent unbounded memory allocation.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// A single frame could not be read or written.
///
/// Fatal to the one read that produced it; the caller decides whether the
/// stream is still usable (for the outbound loop it is not).
#[derive(Error, Debug)]
pub enum FramingError {
    #[error("headers ended without a Content-Length")]
    MissingContentLength,

    #[error("invalid Content-Length value: {0:?}")]
    InvalidContentLength(String),

    #[error("declared body of {0} bytes exceeds the {MAX_FRAME_BYTES} byte cap")]
    Oversized(usize),

    #[error("stream ended in the middle of a frame")]
    UnexpectedEof,

    #[error("frame body is not a valid message: {0}")]
    Body(#[from] serde_json::Error),

    #[error("frame I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads length-prefixed messages from an async byte stream.
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` on EOF before any header byte (clean shutdown).
    pub async fn read_frame(&mut self) -> Result<Option<ProtocolMessage>, FramingError> {
        let content_length = match self.read_headers().await? {
            Some(len) => len,
            None => return Ok(None),
        };

        if content_length > MAX_FRAME_BYTES {
            return Err(FramingError::Oversized(content_length));
        }

        let mut body = vec![0u8; content_length];
        self.reader
            .read_exact(&mut body)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => FramingError::UnexpectedEof,
                _ => FramingError::Io(e),
            })?;

        let msg = serde_json::from_slice(&body)?;
        Ok(Some(msg))
    }

    /// Parse header lines until the blank separator line.
    ///
    /// Returns the declared body length, or `None` on clean EOF.
    async fn read_headers(&mut self) -> Result<Option<usize>, FramingError> {
        let mut content_length: Option<usize> = None;
        let mut line = String::new();
        let mut saw_any_header_bytes = false;

        loop {
            line.clear();
            let bytes_read = self.reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                // EOF is clean only if no header bytes were read at all.
                if !saw_any_header_bytes {
                    return Ok(None);
                }
                return Err(FramingError::UnexpectedEof);
            }
            saw_any_header_bytes = true;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }

            // The protocol writes "Content-Length" but we match case-insensitively.
            if let Some(colon_pos) = trimmed.find(':') {
                let key = &trimmed[..colon_pos];
                if key.eq_ignore_ascii_case("Content-Length") {
                    let value = trimmed[colon_pos + 1..].trim();
                    let len: usize = value
                        .parse()
                        .map_err(|_| FramingError::InvalidContentLength(value.to_string()))?;
                    content_length = Some(len);
                }
            }
            // Unrelated headers (e.g. Content-Type) are ignored.
        }

        match content_length {
            Some(len) => Ok(Some(len)),
            None => Err(FramingError::MissingContentLength),
        }
    }
}

/// Writes length-prefixed messages to an async byte stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialize a message and write it with its `Content-Length` header.
    pub async fn write_frame(&mut self, msg: &ProtocolMessage) -> Result<(), FramingError> {
        let body = serde_json::to_string(msg)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        self.writer.write_all(header.as_bytes()).await?;
        self.writer.write_all(body.as_bytes()).await?;
        self.writer.flush().await?;

        Ok(())
    }
}
