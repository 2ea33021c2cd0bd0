//! Attachment stream descriptors.
//!
//! A [`DataStream`] is an out-of-band binary blob referenced by id from
//! within an envelope. On the sending side it knows how to emit its bytes
//! (from memory or from a file); on the receiving side it is bound to a
//! spool file and allows exactly one read, deleting the file afterwards.

use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;
use uuid::Uuid;

use crate::error::{MxError, Result};

/// An attachment referenced by id from within an envelope.
///
/// The id and byte length travel inside the envelope document; the payload
/// bytes travel out-of-band as a length-prefixed block after the envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataStream {
    id: Uuid,
    length: i64,
    #[serde(skip)]
    content: ContentCell,
}

/// Shared content slot. Cloning a `DataStream` (including the clones made
/// while walking an envelope graph) shares this slot, so binding a spool
/// file through one clone is visible through all of them.
#[derive(Debug, Clone)]
struct ContentCell(Arc<Mutex<Content>>);

impl Default for ContentCell {
    fn default() -> Self {
        ContentCell(Arc::new(Mutex::new(Content::Detached)))
    }
}

#[derive(Debug)]
enum Content {
    /// Decoded from an envelope but not yet bound to incoming bytes.
    Detached,
    /// Sender side: payload held in memory.
    InMemory(Bytes),
    /// Sender side: payload read from a caller-owned file.
    OnDisk(PathBuf),
    /// Receiver side: payload spooled to a temp file, single use.
    Spooled(SpoolFile),
    /// The single allowed read has happened.
    Consumed,
}

/// Temp file holding a received attachment. Deletion is idempotent and also
/// runs on drop, so an unconsumed stream does not leak its spool file.
#[derive(Debug)]
struct SpoolFile {
    path: PathBuf,
}

impl Drop for SpoolFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// What a single-use take yielded.
enum Taken {
    Memory(Bytes),
    Source(PathBuf),
    Spool(SpoolFile),
}

impl DataStream {
    /// Create a sender-side stream over an in-memory payload.
    pub fn from_bytes(payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        DataStream {
            id: Uuid::new_v4(),
            length: payload.len() as i64,
            content: ContentCell(Arc::new(Mutex::new(Content::InMemory(payload)))),
        }
    }

    /// Create a sender-side stream over a file. The length is taken from the
    /// file's current metadata; the file must not change before the send.
    pub async fn from_file(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let length = tokio::fs::metadata(&path).await?.len() as i64;
        Ok(DataStream {
            id: Uuid::new_v4(),
            length,
            content: ContentCell(Arc::new(Mutex::new(Content::OnDisk(path)))),
        })
    }

    /// 128-bit attachment id, unique within an envelope.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Payload length in bytes.
    pub fn length(&self) -> i64 {
        self.length
    }

    /// Spool file path while the received payload awaits its single read.
    pub fn spool_path(&self) -> Option<PathBuf> {
        match &*self.content.0.lock() {
            Content::Spooled(spool) => Some(spool.path.clone()),
            _ => None,
        }
    }

    /// Bind the receiver-side spool file produced by the frame codec.
    pub(crate) fn bind_spooled(&self, path: PathBuf) {
        *self.content.0.lock() = Content::Spooled(SpoolFile { path });
    }

    /// Read the payload into memory. Single use on the receive side: the
    /// spool file is deleted once this returns, success or not.
    pub async fn consume_bytes(&self) -> Result<Bytes> {
        match self.take_content()? {
            Taken::Memory(payload) => Ok(payload),
            Taken::Source(path) => Ok(Bytes::from(tokio::fs::read(&path).await?)),
            Taken::Spool(spool) => {
                let payload = tokio::fs::read(&spool.path).await?;
                Ok(Bytes::from(payload))
            }
        }
    }

    /// Stream the payload into `writer` without assembling it in memory.
    /// Same single-use and delete-after-read rules as [`consume_bytes`].
    ///
    /// [`consume_bytes`]: DataStream::consume_bytes
    pub async fn consume_into<W>(&self, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        match self.take_content()? {
            Taken::Memory(payload) => {
                use tokio::io::AsyncWriteExt;
                writer.write_all(&payload).await?;
                Ok(payload.len() as u64)
            }
            Taken::Source(path) => copy_file(&path, writer).await,
            Taken::Spool(spool) => copy_file(&spool.path, writer).await,
        }
    }

    /// Emit the payload bytes onto the wire. Sender-side sources stay usable
    /// afterwards; a spooled (received) payload being forwarded is consumed.
    pub(crate) async fn write_content<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        enum Plan {
            Memory(Bytes),
            Source(PathBuf),
            Forward,
        }

        let plan = match &*self.content.0.lock() {
            Content::InMemory(payload) => Plan::Memory(payload.clone()),
            Content::OnDisk(path) => Plan::Source(path.clone()),
            Content::Spooled(_) => Plan::Forward,
            Content::Consumed => return Err(MxError::StreamConsumed(self.id)),
            Content::Detached => return Err(MxError::StreamUnbound(self.id)),
        };

        match plan {
            Plan::Memory(payload) => {
                use tokio::io::AsyncWriteExt;
                writer.write_all(&payload).await?;
            }
            Plan::Source(path) => {
                copy_file(&path, writer).await?;
            }
            Plan::Forward => {
                self.consume_into(writer).await?;
            }
        }
        Ok(())
    }

    fn take_content(&self) -> Result<Taken> {
        let mut guard = self.content.0.lock();
        match mem::replace(&mut *guard, Content::Consumed) {
            Content::InMemory(payload) => Ok(Taken::Memory(payload)),
            Content::OnDisk(path) => Ok(Taken::Source(path)),
            Content::Spooled(spool) => Ok(Taken::Spool(spool)),
            Content::Consumed => Err(MxError::StreamConsumed(self.id)),
            Content::Detached => Err(MxError::StreamUnbound(self.id)),
        }
    }
}

/// Streams are compared by identity and announced length; content location
/// is a transport detail.
impl PartialEq for DataStream {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.length == other.length
    }
}

async fn copy_file<W>(path: &Path, writer: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut file = tokio::fs::File::open(path).await?;
    Ok(tokio::io::copy(&mut file, writer).await?)
}
