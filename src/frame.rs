//! Wire-level frame type and codec (component F — Frame Codec).
//!
//! Decoding blocks until a complete frame has arrived or the stream
//! ends/errors; encoding is the inverse. Both are plain functions over a
//! generic `AsyncRead`/`AsyncWrite` half rather than methods on a
//! connection struct, so they can be exercised against an in-memory buffer
//! in tests without a live socket.

use crate::error::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Control frames (Close, Ping, Pong) may never carry more than this many
/// payload bytes, per RFC 6455 §5.5.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn from_byte(byte: u8) -> Result<Self, Error> {
        match byte {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(Error::InvalidOpcode(other)),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    pub fn is_data(self) -> bool {
        matches!(self, OpCode::Text | OpCode::Binary)
    }
}

/// A single decoded wire frame. Ephemeral: it never outlives the receive
/// loop iteration that produced it — the receive loop either dispatches it
/// immediately or appends its payload into a fragment-assembly buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub fin: bool,
    /// Set on the first frame of a compressed message; see the
    /// Compressor component. Always `false` on control frames.
    pub rsv1: bool,
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Frame {
            fin,
            rsv1: false,
            opcode,
            payload,
        }
    }

    pub fn control(opcode: OpCode, payload: Vec<u8>) -> Self {
        debug_assert!(opcode.is_control());
        Frame::new(true, opcode, payload)
    }
}

/// Reads and validates one frame from `reader`.
///
/// `require_masked` should be `true` for a server reading from a client
/// (RFC 6455 requires every client-to-server frame to be masked).
/// `compression_negotiated` gates whether RSV1 is legal on this connection.
/// `max_frame_size` bounds the payload length accepted from the wire.
pub async fn decode_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    require_masked: bool,
    compression_negotiated: bool,
    max_frame_size: usize,
) -> Result<Frame, Error> {
    let mut header = [0u8; 2];
    reader.read_exact(&mut header).await?;

    let fin = (header[0] & 0b1000_0000) != 0;
    let rsv1 = (header[0] & 0b0100_0000) != 0;
    let rsv2 = (header[0] & 0b0010_0000) != 0;
    let rsv3 = (header[0] & 0b0001_0000) != 0;
    let opcode = OpCode::from_byte(header[0] & 0b0000_1111)?;

    if rsv2 || rsv3 {
        return Err(Error::RsvNotZero);
    }
    if rsv1 && (!compression_negotiated || opcode.is_control()) {
        return Err(Error::CompressionNotNegotiated);
    }

    if !fin && opcode.is_control() {
        return Err(Error::ControlFrameFragmented);
    }

    let masked = (header[1] & 0b1000_0000) != 0;
    if require_masked && !masked {
        return Err(Error::FrameNotMasked);
    }

    let mut length = (header[1] & 0b0111_1111) as u64;
    if opcode.is_control() && length > MAX_CONTROL_PAYLOAD as u64 {
        return Err(Error::ControlFramePayloadTooLarge);
    }

    if length == 126 {
        let mut ext = [0u8; 2];
        reader.read_exact(&mut ext).await?;
        length = u16::from_be_bytes(ext) as u64;
    } else if length == 127 {
        let mut ext = [0u8; 8];
        reader.read_exact(&mut ext).await?;
        length = u64::from_be_bytes(ext);
    }

    if length > max_frame_size as u64 {
        return Err(Error::MaxFrameSizeExceeded(length as usize, max_frame_size));
    }
    let length = length as usize;

    let mask = if masked {
        let mut key = [0u8; 4];
        reader.read_exact(&mut key).await?;
        Some(key)
    } else {
        None
    };

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    if let Some(key) = mask {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i % 4];
        }
    }

    Ok(Frame {
        fin,
        rsv1,
        opcode,
        payload,
    })
}

/// Encodes `frame` as an unmasked server-to-client wire frame and writes
/// it to `writer`. Server frames are never masked, per RFC 6455 §5.1.
pub async fn encode_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), Error> {
    let mut first_byte = (frame.fin as u8) << 7 | frame.opcode.as_byte();
    if frame.rsv1 {
        first_byte |= 0b0100_0000;
    }

    let len = frame.payload.len();
    let mut header = Vec::with_capacity(10);
    header.push(first_byte);

    if len <= 125 {
        header.push(len as u8);
    } else if len <= u16::MAX as usize {
        header.push(126);
        header.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        header.push(127);
        header.extend_from_slice(&(len as u64).to_be_bytes());
    }

    writer.write_all(&header).await?;
    writer.write_all(&frame.payload).await?;
    Ok(())
}
