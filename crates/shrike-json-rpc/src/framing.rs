//! Streaming JSON framing over byte streams.
//!
//! One top-level JSON value per logical message. A newline terminator is
//! written after every outgoing value; on input, values may be separated
//! by arbitrary whitespace or by nothing at all, so parsing splits the
//! byte stream with a streaming deserializer rather than by line.

use bytes::{Buf, BytesMut};
use serde::Serialize;
use serde_json::value::RawValue;
use serde_json::Deserializer;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;

const READ_CHUNK: usize = 8 * 1024;

/// Incremental reader splitting a byte stream into top-level JSON values.
pub struct JsonReader<R> {
    inner: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> JsonReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Read the next top-level JSON value, or `None` at end of stream.
    ///
    /// A syntax error leaves the buffered input in place; call
    /// [`skip_line`](Self::skip_line) to resynchronize before reading
    /// again.
    pub async fn next_value(&mut self) -> Result<Option<Box<RawValue>>, FrameError> {
        loop {
            if !self.buf.is_empty() {
                let mut values = Deserializer::from_slice(&self.buf).into_iter::<Box<RawValue>>();
                match values.next() {
                    Some(Ok(value)) => {
                        let consumed = values.byte_offset();
                        self.buf.advance(consumed);
                        return Ok(Some(value));
                    }
                    Some(Err(err)) if !err.is_eof() => return Err(FrameError::Parse(err)),
                    // incomplete value: read more input
                    Some(Err(_)) => {}
                    // only trailing whitespace left
                    None => self.buf.clear(),
                }
            }
            self.buf.reserve(READ_CHUNK);
            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let mut values = Deserializer::from_slice(&self.buf).into_iter::<Box<RawValue>>();
                return match values.next() {
                    Some(Ok(value)) => {
                        let consumed = values.byte_offset();
                        self.buf.advance(consumed);
                        Ok(Some(value))
                    }
                    Some(Err(err)) => Err(FrameError::Parse(err)),
                    None => {
                        self.buf.clear();
                        Ok(None)
                    }
                };
            }
        }
    }

    /// Discard buffered and incoming input through the next newline, or
    /// to end of stream. Regains framing after a syntax error.
    pub async fn skip_line(&mut self) -> std::io::Result<()> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                self.buf.advance(pos + 1);
                return Ok(());
            }
            self.buf.clear();
            self.buf.reserve(READ_CHUNK);
            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Ok(());
            }
        }
    }
}

/// Serialize `value` and write it as one newline-terminated frame.
pub async fn write_json_line<W, T>(writer: &mut W, value: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let mut line = serde_json::to_vec(value)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}
