//! Error kinds for the connection engine.
//!
//! Four rough categories, per the error-handling design: Protocol
//! (malformed frame, disallowed opcode, bad masking, fragmentation order
//! violations), I/O (stream read/write failure, EOF mid-frame),
//! Application (a callback panicked or returned an error) and Usage (the
//! caller invoked an operation in a disallowed state). [`Error::close_code`]
//! maps the ones that should drive an automatic close to the status code
//! the receive loop should send.

use crate::payload::CloseCode;
use std::string::FromUtf8Error;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("text frame payload was not valid UTF-8: {source}")]
    InvalidUtf8 {
        #[from]
        source: FromUtf8Error,
    },

    // --- Protocol errors -------------------------------------------------
    #[error("reserved RSV bit set without a matching extension negotiated")]
    RsvNotZero,

    #[error("RSV1 set but no compression was negotiated for this connection")]
    CompressionNotNegotiated,

    #[error("control frames must not be fragmented")]
    ControlFrameFragmented,

    #[error("control frame payload exceeds 125 bytes")]
    ControlFramePayloadTooLarge,

    #[error("peer-to-server frame was not masked")]
    FrameNotMasked,

    #[error("unsupported or reserved opcode {0:#x}")]
    InvalidOpcode(u8),

    #[error("a fragmented message is already in progress")]
    FragmentedMessageInProgress,

    #[error("continuation frame received with no fragmented message in progress")]
    UnexpectedContinuation,

    #[error("new data frame received while a fragmented message is in progress")]
    InterleavedDataFrame,

    #[error("frame payload of {0} bytes exceeds max_frame_size of {1} bytes")]
    MaxFrameSizeExceeded(usize, usize),

    #[error("assembled message of {0} bytes exceeds max_message_size of {1} bytes")]
    MaxMessageSizeExceeded(usize, usize),

    #[error("compression failed: {0}")]
    CompressionFailure(String),

    #[error("HTTP upgrade handshake failed: {0}")]
    Handshake(String),

    // --- Usage errors ------------------------------------------------------
    #[error("operation not valid in state {0:?}")]
    InvalidState(crate::state::ConnectionState),

    #[error("close reason of {0} bytes plus the 2-byte code exceeds 125 bytes")]
    CloseReasonTooLarge(usize),

    #[error("event queue closed")]
    QueueClosed,

    #[error("event queue exceeded its soft cap of {0} messages")]
    QueueFull(usize),

    #[error("expected a text message, got binary")]
    NotText,

    // --- Application errors ------------------------------------------------
    #[error("event handler callback panicked: {0}")]
    CallbackPanicked(String),
}

impl Error {
    /// The close status code the receive loop should send when this error
    /// is what ends the connection, per the error-handling policy. `None`
    /// means the error does not by itself justify closing (e.g. a `Usage`
    /// error reported back to the caller of `SendAsync`).
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Error::RsvNotZero
            | Error::ControlFrameFragmented
            | Error::ControlFramePayloadTooLarge
            | Error::FrameNotMasked
            | Error::InvalidOpcode(_)
            | Error::FragmentedMessageInProgress
            | Error::UnexpectedContinuation
            | Error::InterleavedDataFrame => Some(CloseCode::PROTOCOL_ERROR),

            Error::InvalidUtf8 { .. }
            | Error::CompressionFailure(_)
            | Error::CompressionNotNegotiated => Some(CloseCode::INCORRECT_DATA),

            Error::MaxFrameSizeExceeded(..) | Error::MaxMessageSizeExceeded(..) => {
                Some(CloseCode::MESSAGE_TOO_BIG)
            }

            Error::QueueFull(_) => Some(CloseCode::MESSAGE_TOO_BIG),

            Error::CallbackPanicked(_) => Some(CloseCode::INTERNAL_ERROR),

            Error::Io { .. } | Error::Timeout(_) => Some(CloseCode::ABNORMAL),

            Error::InvalidState(_)
            | Error::CloseReasonTooLarge(_)
            | Error::QueueClosed
            | Error::Handshake(_)
            | Error::NotText => None,
        }
    }
}
