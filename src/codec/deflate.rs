//! Raw DEFLATE framing for envelopes.
//!
//! Each envelope travels as one self-terminating raw deflate stream written
//! directly to the transport; attachment blocks follow uncompressed. The
//! inflater therefore has to stop at the stream-end marker and report exactly
//! how many input bytes belonged to the envelope, so the bytes after it stay
//! in the caller's buffer.

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};

use crate::error::{MxError, Result};

const INFLATE_CHUNK: usize = 8 * 1024;

/// Compress one envelope body into a finished raw deflate stream.
pub fn compress(body: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body)?;
    Ok(encoder.finish()?)
}

/// Incremental raw-deflate decompressor for exactly one stream.
pub struct Inflater {
    inner: Decompress,
}

impl Inflater {
    pub fn new() -> Self {
        Inflater {
            inner: Decompress::new(false),
        }
    }

    /// Feed available input, appending decompressed bytes to `out`.
    ///
    /// Returns `(consumed, finished)`: how many input bytes the stream took,
    /// and whether the stream-end marker was reached. Unconsumed input
    /// belongs to whatever follows the envelope.
    pub fn feed(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(usize, bool)> {
        let mut consumed = 0;
        let mut chunk = [0u8; INFLATE_CHUNK];
        loop {
            let in_before = self.inner.total_in();
            let out_before = self.inner.total_out();
            let status = self
                .inner
                .decompress(&input[consumed..], &mut chunk, FlushDecompress::None)
                .map_err(|e| MxError::Protocol(format!("malformed deflate stream: {e}")))?;
            consumed += (self.inner.total_in() - in_before) as usize;
            let produced = (self.inner.total_out() - out_before) as usize;
            out.extend_from_slice(&chunk[..produced]);

            match status {
                Status::StreamEnd => return Ok((consumed, true)),
                Status::Ok | Status::BufError => {
                    if produced == chunk.len() {
                        // Output chunk filled up; drain pending output before
                        // deciding whether more input is needed.
                        continue;
                    }
                    if consumed == input.len() || (self.inner.total_in() - in_before) == 0 {
                        return Ok((consumed, false));
                    }
                }
            }
        }
    }
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_and_stream_boundary() {
        let body = b"the quick brown fox jumps over the lazy dog".repeat(50);
        let mut wire = compress(&body).unwrap();
        let deflate_len = wire.len();
        // Raw attachment bytes follow the stream on the real wire.
        wire.extend_from_slice(b"TRAILER");

        let mut inflater = Inflater::new();
        let mut out = Vec::new();
        let (consumed, done) = inflater.feed(&wire, &mut out).unwrap();
        assert!(done);
        assert_eq!(consumed, deflate_len);
        assert_eq!(out, body);
        assert_eq!(&wire[consumed..], b"TRAILER");
    }

    #[test]
    fn feed_accepts_arbitrarily_split_input() {
        let body = vec![42u8; 100_000];
        let wire = compress(&body).unwrap();

        let mut inflater = Inflater::new();
        let mut out = Vec::new();
        let mut offset = 0;
        let mut done = false;
        for chunk in wire.chunks(7) {
            let (consumed, finished) = inflater.feed(chunk, &mut out).unwrap();
            offset += consumed;
            if finished {
                done = true;
                break;
            }
        }
        assert!(done);
        assert_eq!(offset, wire.len());
        assert_eq!(out, body);
    }

    #[test]
    fn empty_body_still_forms_a_terminated_stream() {
        let wire = compress(&[]).unwrap();
        let mut inflater = Inflater::new();
        let mut out = Vec::new();
        let (consumed, done) = inflater.feed(&wire, &mut out).unwrap();
        assert!(done);
        assert_eq!(consumed, wire.len());
        assert!(out.is_empty());
    }

    #[test]
    fn garbage_input_is_a_protocol_error() {
        let mut inflater = Inflater::new();
        let mut out = Vec::new();
        let result = inflater.feed(&[0xFF; 64], &mut out);
        assert!(matches!(result, Err(MxError::Protocol(_))));
    }
}
