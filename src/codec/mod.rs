//! Envelope document encoding and compression framing.

mod deflate;
mod envelope;

pub use deflate::{compress, Inflater};
pub use envelope::EnvelopeCodec;
