//! Tunables and named constants for the connection engine.
//!
//! Every magic number the engine relies on (fragment length, close-handshake
//! timeout, keep-alive interval) is a named constant here rather than an
//! inline literal, per the RFC's own advice on this: implementations should
//! make these values discoverable, not buried.

use std::time::Duration;

/// Maximum payload carried by a single non-final outgoing fragment.
///
/// Messages longer than this are split across multiple frames by the
/// sender; see [`crate::send`].
pub const FRAGMENT_LENGTH: usize = 1016;

/// How long the close handshake waits for the peer's confirming Close
/// frame before giving up and transitioning to `Closed` anyway.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Advisory keep-alive interval. The engine exposes this value but does
/// not itself schedule pings; an enclosing server loop may use it to
/// drive periodic `send_ping` calls.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Per-connection resource limits and compression policy.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Hard cap on a single frame's payload length, inbound or outbound.
    pub max_frame_size: usize,
    /// Hard cap on a fully assembled (defragmented, decompressed) message.
    pub max_message_size: usize,
    /// Soft cap on the number of undelivered [`crate::message::MessageEvent`]s
    /// sitting in the event queue. `None` means unbounded — a slow
    /// consumer can grow the queue without limit. `Some(n)` closes the
    /// connection with code 1009 (Message Too Big) once the queue would
    /// exceed `n` entries.
    pub max_queued_messages: Option<usize>,
    /// Whether `permessage-deflate` was negotiated for this connection.
    pub compression: CompressionMode,
    /// How long to wait for the peer's confirming Close frame.
    pub close_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            max_frame_size: 16 << 20,
            max_message_size: 64 << 20,
            max_queued_messages: None,
            compression: CompressionMode::None,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

/// Negotiated per-message compression mode. Fixed at connection
/// construction time; the core never renegotiates mid-connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMode {
    #[default]
    None,
    Deflate(DeflateParams),
}

/// `permessage-deflate` parameters, as negotiated by the (out of scope)
/// upgrade layer. See `examples/felipemeriga-socket-flow/src/extensions.rs`
/// for the header-parsing/merging side of this negotiation, which this
/// crate deliberately does not reimplement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeflateParams {
    /// Reset the compression context after every message rather than
    /// keeping it across messages on this connection.
    pub no_context_takeover: bool,
    /// LZ77 window size in bits, 8..=15. `None` uses flate2's default (15).
    pub window_bits: Option<u8>,
}

impl Default for DeflateParams {
    fn default() -> Self {
        DeflateParams {
            no_context_takeover: false,
            window_bits: None,
        }
    }
}
