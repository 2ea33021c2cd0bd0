//! Per-exchange registry of attachment streams.
//!
//! Exactly one capture is built per send or receive. The sender writes the
//! registered streams after the envelope in registration order; the receiver
//! uses the capture to match incoming attachment blocks to descriptors.

use uuid::Uuid;

use crate::error::{MxError, Result};
use crate::message::{DataStream, MessageEnvelope};

/// Attachments discovered while walking one envelope graph.
#[derive(Debug, Default)]
pub struct StreamCapture {
    streams: Vec<DataStream>,
}

impl StreamCapture {
    /// Walk the envelope and register every attachment descriptor in it, in
    /// the order the serializer will emit them.
    pub fn of(envelope: &MessageEnvelope) -> Result<Self> {
        let mut capture = StreamCapture::default();
        envelope.collect_streams(&mut capture)?;
        Ok(capture)
    }

    pub(crate) fn register(&mut self, stream: DataStream) -> Result<()> {
        if self.find(stream.id()).is_some() {
            return Err(MxError::Protocol(format!(
                "attachment id `{}` appears more than once in one envelope",
                stream.id()
            )));
        }
        self.streams.push(stream);
        Ok(())
    }

    /// Descriptor with the given id, if the envelope referenced one.
    pub fn find(&self, id: Uuid) -> Option<&DataStream> {
        self.streams.iter().find(|s| s.id() == id)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataStream> {
        self.streams.iter()
    }
}
