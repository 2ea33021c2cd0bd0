//! Envelope document codec.
//!
//! Always `to_vec_named`, never `to_vec`: the struct-as-map form puts field
//! names and the payload's variant tag on the wire, which is what lets the
//! receiver pick the concrete message kind without positional guessing.

use crate::error::Result;
use crate::message::MessageEnvelope;

/// Binary document codec for [`MessageEnvelope`].
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    /// Encode an envelope to document bytes (struct-as-map form).
    #[inline]
    pub fn encode(envelope: &MessageEnvelope) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(envelope)?)
    }

    /// Decode document bytes back into an envelope.
    #[inline]
    pub fn decode(bytes: &[u8]) -> Result<MessageEnvelope> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
