//! Wire framing for the JSON control transport (spec.md §4.6): every message,
//! request or response or event, is a UTF-8 JSON object terminated by
//! `\r\n\r\n`. A client that sends more than [`MAX_FRAME_BYTES`] before a
//! terminator is speaking `invalid_message` and gets disconnected.
//!
//! Grounded on the teacher's line-delimited websocket framing
//! (`examples/plsuwu-pea-fan/src/socket/`), generalized from "one line per
//! message" to "one `\r\n\r\n`-terminated chunk per message".

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const MAX_FRAME_BYTES: usize = 2 * 1024 * 1024;
const TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame exceeded {MAX_FRAME_BYTES} bytes without a terminator")]
    TooLarge,
    #[error("malformed JSON frame: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("connection closed")]
    Eof,
}

/// Buffers bytes off `R` and yields one parsed JSON frame at a time.
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        FrameReader { inner, buf: Vec::new() }
    }

    /// Reads until a `\r\n\r\n`-terminated chunk is available, parses it as
    /// JSON, and leaves any remaining bytes buffered for the next call.
    pub async fn read_frame(&mut self) -> Result<Value, FrameError> {
        loop {
            if let Some(pos) = find_terminator(&self.buf) {
                let frame = self.buf[..pos].to_vec();
                self.buf.drain(..pos + TERMINATOR.len());
                let text = String::from_utf8_lossy(&frame);
                return Ok(serde_json::from_str(&text)?);
            }

            if self.buf.len() > MAX_FRAME_BYTES {
                return Err(FrameError::TooLarge);
            }

            let mut chunk = [0u8; 4096];
            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                return Err(FrameError::Eof);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(TERMINATOR.len()).position(|window| window == TERMINATOR)
}

/// Serializes `value` and appends the frame terminator.
pub fn encode_frame(value: &Value) -> Vec<u8> {
    let mut bytes = serde_json::to_vec(value).unwrap_or_default();
    bytes.extend_from_slice(TERMINATOR);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[tokio::test]
    async fn reads_one_frame_at_a_time() {
        let mut data = Vec::new();
        data.extend_from_slice(b"{\"a\":1}\r\n\r\n");
        data.extend_from_slice(b"{\"a\":2}\r\n\r\n");
        let mut reader = FrameReader::new(Cursor::new(data));

        assert_eq!(reader.read_frame().await.unwrap(), json!({"a": 1}));
        assert_eq!(reader.read_frame().await.unwrap(), json!({"a": 2}));
    }

    #[tokio::test]
    async fn oversized_frame_without_terminator_errors() {
        let mut data = vec![b'x'; MAX_FRAME_BYTES + 1];
        data.extend_from_slice(b"\r\n\r\n");
        let mut reader = FrameReader::new(Cursor::new(data));
        assert!(matches!(reader.read_frame().await, Err(FrameError::TooLarge)));
    }

    #[test]
    fn encode_appends_terminator() {
        let bytes = encode_frame(&json!({"command": "ping"}));
        assert!(bytes.ends_with(b"\r\n\r\n"));
    }
}
