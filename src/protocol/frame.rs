//! Low-level frame codec over an owned transport.
//!
//! Speaks the three wire alphabets: UTF-8 text lines, deflate-wrapped
//! envelope documents, and length-prefixed attachment blocks. All reads go
//! through one accumulation buffer so that a decompressor stopping at its
//! stream-end marker leaves the following attachment bytes available.

use std::path::{Path, PathBuf};

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use crate::codec::{compress, EnvelopeCodec, Inflater};
use crate::error::{MxError, Result};
use crate::message::{DataStream, MessageEnvelope, StreamCapture};

const READ_CHUNK: usize = 16 * 1024;

/// Attachment block header: 16-byte id, 8-byte signed little-endian length.
const ATTACHMENT_HEADER_LEN: usize = 24;

/// Spool file location for a received attachment, derived from its id so
/// concurrent connections can never collide.
pub(crate) fn spool_path(id: Uuid) -> PathBuf {
    std::env::temp_dir().join(format!("mxwire-{}.tmp", id.simple()))
}

/// Reader/writer for the wire format. Owns the transport; callers never
/// touch it between construction and teardown.
pub struct FrameCodec<S> {
    transport: S,
    rbuf: BytesMut,
}

impl<S> FrameCodec<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(transport: S) -> Self {
        FrameCodec {
            transport,
            rbuf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Write one text line followed by a line break.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        self.transport.write_all(line.as_bytes()).await?;
        self.transport.write_all(b"\r\n").await?;
        Ok(())
    }

    /// Read the next non-empty line, or `None` at end of stream.
    ///
    /// Accepts CRLF and bare LF; empty lines are invisible to callers.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(pos) = self.rbuf.iter().position(|&b| b == b'\n') {
                let raw = self.rbuf.split_to(pos + 1);
                match trim_line(&raw[..pos]) {
                    Some(line) => return Ok(Some(decode_line(line)?)),
                    None => continue,
                }
            }
            if !self.fill().await? {
                if self.rbuf.is_empty() {
                    return Ok(None);
                }
                // Final line without a terminator.
                let raw = self.rbuf.split_to(self.rbuf.len());
                return match trim_line(&raw) {
                    Some(line) => Ok(Some(decode_line(line)?)),
                    None => Ok(None),
                };
            }
        }
    }

    /// Serialize and compress one envelope. The deflate stream is closed at
    /// the end of the envelope; the transport stays open.
    pub async fn write_envelope(&mut self, envelope: &MessageEnvelope) -> Result<()> {
        let body = EnvelopeCodec::encode(envelope)?;
        let compressed = compress(&body)?;
        self.transport.write_all(&compressed).await?;
        Ok(())
    }

    /// Decompress and deserialize one envelope, consuming exactly the bytes
    /// of its deflate stream.
    pub async fn read_envelope(&mut self) -> Result<MessageEnvelope> {
        let mut inflater = Inflater::new();
        let mut body = Vec::new();
        loop {
            if self.rbuf.is_empty() && !self.fill().await? {
                return Err(MxError::Protocol(
                    "end of stream inside a message envelope".into(),
                ));
            }
            let (consumed, done) = inflater.feed(&self.rbuf, &mut body)?;
            self.rbuf.advance(consumed);
            if done {
                break;
            }
            if consumed == 0 && !self.rbuf.is_empty() {
                return Err(MxError::Protocol(
                    "deflate stream made no progress".into(),
                ));
            }
        }
        EnvelopeCodec::decode(&body)
    }

    /// Write one attachment block: id, length, then the payload bytes,
    /// uncompressed and back-to-back.
    pub async fn write_attachment(&mut self, stream: &DataStream) -> Result<()> {
        let mut header = [0u8; ATTACHMENT_HEADER_LEN];
        header[..16].copy_from_slice(stream.id().as_bytes());
        header[16..].copy_from_slice(&stream.length().to_le_bytes());
        self.transport.write_all(&header).await?;
        stream.write_content(&mut self.transport).await
    }

    /// Read one attachment block, spool its payload to a temp file, and bind
    /// the matching descriptor from the capture to it.
    pub async fn read_attachment(&mut self, capture: &StreamCapture) -> Result<()> {
        let header = self.require(ATTACHMENT_HEADER_LEN, "attachment header").await?;
        let mut id_bytes = [0u8; 16];
        id_bytes.copy_from_slice(&header[..16]);
        let id = Uuid::from_bytes(id_bytes);
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&header[16..]);
        let length = i64::from_le_bytes(len_bytes);

        if length < 0 {
            return Err(MxError::Protocol(format!(
                "attachment `{id}` announces a negative length {length}"
            )));
        }
        let Some(stream) = capture.find(id) else {
            return Err(MxError::Protocol(format!(
                "attachment block with unknown id `{id}`"
            )));
        };
        if stream.length() != length {
            return Err(MxError::Protocol(format!(
                "attachment `{id}` length mismatch: envelope declares {}, block carries {length}",
                stream.length()
            )));
        }

        let path = spool_path(id);
        match self.spool_payload(&path, length as u64).await {
            Ok(()) => {
                stream.bind_spooled(path);
                Ok(())
            }
            Err(err) => {
                let _ = std::fs::remove_file(&path);
                Err(err)
            }
        }
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.transport.flush().await?;
        Ok(())
    }

    async fn spool_payload(&mut self, path: &Path, mut remaining: u64) -> Result<()> {
        let mut file = tokio::fs::File::create(path).await?;
        while remaining > 0 {
            if self.rbuf.is_empty() && !self.fill().await? {
                return Err(MxError::Protocol(format!(
                    "attachment truncated with {remaining} bytes outstanding"
                )));
            }
            let take = (self.rbuf.len() as u64).min(remaining) as usize;
            let chunk = self.rbuf.split_to(take);
            file.write_all(&chunk).await?;
            remaining -= take as u64;
        }
        file.flush().await?;
        Ok(())
    }

    /// Buffer at least `n` bytes and hand them over.
    async fn require(&mut self, n: usize, context: &str) -> Result<Bytes> {
        while self.rbuf.len() < n {
            if !self.fill().await? {
                return Err(MxError::Protocol(format!(
                    "end of stream inside {context}"
                )));
            }
        }
        Ok(self.rbuf.split_to(n).freeze())
    }

    async fn fill(&mut self) -> Result<bool> {
        self.rbuf.reserve(READ_CHUNK);
        let n = self.transport.read_buf(&mut self.rbuf).await?;
        Ok(n > 0)
    }
}

/// Strip the optional trailing CR and report empty lines as `None`.
fn trim_line(raw: &[u8]) -> Option<&[u8]> {
    let line = match raw.last() {
        Some(b'\r') => &raw[..raw.len() - 1],
        _ => raw,
    };
    (!line.is_empty()).then_some(line)
}

fn decode_line(raw: &[u8]) -> Result<String> {
    std::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|_| MxError::Protocol("line is not valid UTF-8".into()))
}
