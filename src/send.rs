//! Lock-serialized outbound path (component W — Sender).
//!
//! All outgoing writes for one connection go through a single
//! [`Writer`], held behind the connection's `send_lock`. A send of opcode
//! `O` and payload length `L` is split into frames by the exact
//! quo/rem-over-[`FRAGMENT_LENGTH`] arithmetic the design calls for, so
//! every non-terminal fragment is exactly [`FRAGMENT_LENGTH`] bytes and
//! the fragment lengths sum back to `L`. Server frames are never masked.

use crate::compression::Compressor;
use crate::config::{CompressionMode, FRAGMENT_LENGTH};
use crate::error::Error;
use crate::frame::{encode_frame, Frame, OpCode};
use tokio::io::{AsyncWrite, AsyncWriteExt, WriteHalf};

pub struct Writer<S> {
    write_half: WriteHalf<S>,
    compressor: Compressor,
}

impl<S: AsyncWrite + Unpin> Writer<S> {
    pub fn new(write_half: WriteHalf<S>, mode: CompressionMode) -> Self {
        Writer {
            write_half,
            compressor: Compressor::new(mode),
        }
    }

    /// Sends one fully assembled application message, fragmenting and
    /// compressing it as configured.
    pub async fn send_message(&mut self, opcode: OpCode, payload: Vec<u8>) -> Result<(), Error> {
        let (payload, rsv1) = if self.compressor.is_active() && !payload.is_empty() {
            (self.compressor.compress(&payload)?, true)
        } else {
            (payload, false)
        };

        let frames = plan_frames(opcode, &payload, rsv1);
        for frame in &frames {
            encode_frame(&mut self.write_half, frame).await?;
        }
        Ok(())
    }

    /// Sends a control frame (Ping, Pong or Close) verbatim: never
    /// fragmented, never compressed, per RFC 6455 §5.5.
    pub async fn send_control(&mut self, opcode: OpCode, payload: Vec<u8>) -> Result<(), Error> {
        debug_assert!(opcode.is_control());
        encode_frame(&mut self.write_half, &Frame::control(opcode, payload)).await
    }

    pub async fn flush(&mut self) -> Result<(), Error> {
        self.write_half.flush().await?;
        Ok(())
    }
}

/// Splits `payload` into the frame sequence a send of `opcode` should
/// produce, per the sender's fragmentation rule. `rsv1` is set on the
/// first frame only, exactly as permessage-deflate requires.
fn plan_frames(opcode: OpCode, payload: &[u8], rsv1: bool) -> Vec<Frame> {
    let len = payload.len();

    if len == 0 {
        let mut frame = Frame::new(true, opcode, Vec::new());
        frame.rsv1 = rsv1;
        return vec![frame];
    }

    let quo = len / FRAGMENT_LENGTH;
    let rem = len % FRAGMENT_LENGTH;

    if quo == 0 {
        let mut frame = Frame::new(true, opcode, payload.to_vec());
        frame.rsv1 = rsv1;
        return vec![frame];
    }

    if quo == 1 && rem == 0 {
        let mut frame = Frame::new(true, opcode, payload[0..FRAGMENT_LENGTH].to_vec());
        frame.rsv1 = rsv1;
        return vec![frame];
    }

    let mut frames = Vec::with_capacity(quo + 1);
    let mut offset = 0;

    let mut first = Frame::new(false, opcode, payload[offset..offset + FRAGMENT_LENGTH].to_vec());
    first.rsv1 = rsv1;
    frames.push(first);
    offset += FRAGMENT_LENGTH;

    let middle_count = if rem == 0 { quo - 2 } else { quo - 1 };
    for _ in 0..middle_count {
        frames.push(Frame::new(
            false,
            OpCode::Continuation,
            payload[offset..offset + FRAGMENT_LENGTH].to_vec(),
        ));
        offset += FRAGMENT_LENGTH;
    }

    let final_payload = if rem != 0 {
        payload[offset..offset + rem].to_vec()
    } else {
        payload[offset..offset + FRAGMENT_LENGTH].to_vec()
    };
    frames.push(Frame::new(true, OpCode::Continuation, final_payload));

    frames
}
