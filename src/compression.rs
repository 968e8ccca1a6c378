//! `permessage-deflate` compression (component C).
//!
//! Wraps raw DEFLATE (flate2) on both directions of one connection. RSV1 on
//! the first frame of a message signals that the assembled payload is
//! compressed; the receive loop strips it off and hands this module the
//! raw frame bytes, the sender asks this module to compress before it
//! fragments the result.
//!
//! The decompress side mirrors
//! `examples/felipemeriga-socket-flow/src/decoder.rs`: append the 4-byte
//! sync-flush trailer DEFLATE needs to terminate the stream, then drain
//! `Decompress::decompress_vec` in a loop, sizing the scratch buffer by
//! payload size to trade CPU for memory on small messages. The compress
//! side follows the same idiom in reverse, using `Compress`/
//! `FlushCompress::Sync`, stripping the trailing `00 00 ff ff` marker
//! before the result goes on the wire — the peer's decompressor expects to
//! add that marker back itself, exactly like this crate's own decompress
//! side does.

use crate::config::{CompressionMode, DeflateParams};
use crate::error::Error;
use bytes::BytesMut;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

const DEFLATE_TRAILER: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

fn scratch_buffer_size(payload_size: usize) -> usize {
    if payload_size <= 4096 {
        4096
    } else if payload_size <= 65536 {
        16384
    } else {
        65536
    }
}

/// Per-connection compression state. `None` when `permessage-deflate` was
/// not negotiated, in which case `compress`/`decompress` are never called
/// (RSV1 on an inbound frame is instead rejected at the frame codec).
pub struct Compressor {
    inner: Option<Inner>,
}

struct Inner {
    compress: Compress,
    decompress: Decompress,
    reset_context: bool,
}

impl Compressor {
    pub fn new(mode: CompressionMode) -> Self {
        let inner = match mode {
            CompressionMode::None => None,
            CompressionMode::Deflate(params) => Some(Inner::new(params)),
        };
        Compressor { inner }
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_some()
    }

    /// Compresses one fully assembled outbound message payload.
    pub fn compress(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| Error::CompressionFailure("compression not negotiated".into()))?;
        inner.compress(payload)
    }

    /// Decompresses one fully assembled inbound message payload.
    pub fn decompress(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| Error::CompressionFailure("compression not negotiated".into()))?;
        inner.decompress(payload)
    }
}

impl Inner {
    fn new(params: DeflateParams) -> Self {
        let compress = Compress::new(Compression::default(), false);
        let decompress = match params.window_bits {
            Some(bits) => Decompress::new_with_window_bits(false, bits),
            None => Decompress::new(false),
        };
        Inner {
            compress,
            decompress,
            reset_context: params.no_context_takeover,
        }
    }

    fn compress(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        if self.reset_context {
            self.compress.reset();
        }

        // `*_vec` variants grow their output buffer themselves when it
        // fills up mid-call, unlike the fixed-slice variants — avoids
        // hand-rolling buffer growth (and the stall that a fixed-size
        // scratch buffer risks if a single call can't make progress).
        let buffer_size = scratch_buffer_size(payload.len());
        let mut out: Vec<u8> = Vec::with_capacity(buffer_size);

        let before_in = self.compress.total_in();
        while (self.compress.total_in() - before_in) < payload.len() as u64 {
            let consumed_so_far = (self.compress.total_in() - before_in) as usize;
            let input = &payload[consumed_so_far..];

            let status = self
                .compress
                .compress_vec(input, &mut out, FlushCompress::Sync)
                .map_err(|e| Error::CompressionFailure(e.to_string()))?;

            if status == Status::StreamEnd {
                break;
            }
        }

        // Strip the 4-byte sync-flush trailer; the peer's decompressor adds
        // it back before decoding, same as this connection's own decompress
        // side does on the way in.
        if out.ends_with(&DEFLATE_TRAILER) {
            let new_len = out.len() - DEFLATE_TRAILER.len();
            out.truncate(new_len);
        }

        Ok(out)
    }

    fn decompress(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        if self.reset_context {
            self.decompress.reset(false);
        }

        let mut input = BytesMut::from(payload);
        input.extend_from_slice(&DEFLATE_TRAILER);

        let buffer_size = scratch_buffer_size(input.len());
        let mut out: Vec<u8> = Vec::with_capacity(buffer_size);

        let before_in = self.decompress.total_in();
        while (self.decompress.total_in() - before_in) < input.len() as u64 {
            let consumed_so_far = (self.decompress.total_in() - before_in) as usize;
            let chunk = &input[consumed_so_far..];

            let status = self
                .decompress
                .decompress_vec(chunk, &mut out, FlushDecompress::Sync)
                .map_err(|e| Error::CompressionFailure(e.to_string()))?;

            if status == Status::StreamEnd {
                break;
            }
        }

        Ok(out)
    }
}
