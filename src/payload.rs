//! Close-frame payload helpers (component P).
//!
//! A close payload is an optional 2-byte big-endian status code followed
//! by an optional UTF-8 reason, the whole thing capped at 125 bytes like
//! any other control-frame payload.

use crate::error::Error;

/// A WebSocket close status code, RFC 6455 §7.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseCode(pub u16);

impl CloseCode {
    pub const NORMAL: CloseCode = CloseCode(1000);
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    pub const PROTOCOL_ERROR: CloseCode = CloseCode(1002);
    pub const UNSUPPORTED_DATA: CloseCode = CloseCode(1003);
    pub const NO_STATUS_RECEIVED: CloseCode = CloseCode(1005);
    pub const ABNORMAL: CloseCode = CloseCode(1006);
    pub const INCORRECT_DATA: CloseCode = CloseCode(1007);
    pub const POLICY_VIOLATION: CloseCode = CloseCode(1008);
    pub const MESSAGE_TOO_BIG: CloseCode = CloseCode(1009);
    pub const MANDATORY_EXTENSION: CloseCode = CloseCode(1010);
    pub const INTERNAL_ERROR: CloseCode = CloseCode(1011);
    pub const TLS_HANDSHAKE: CloseCode = CloseCode(1015);

    /// `true` for the three codes RFC 6455 defines but forbids from ever
    /// appearing on the wire (they're only meaningful as in-memory
    /// indicators to an application).
    pub fn is_reserved(self) -> bool {
        matches!(self.0, 1005 | 1006 | 1015)
    }
}

/// `true` for the three RFC 6455 status codes that must never be
/// transmitted on the wire.
pub fn is_reserved(code: u16) -> bool {
    CloseCode(code).is_reserved()
}

/// `true` if `bytes` is small enough to be a legal control-frame payload.
pub fn is_valid_control_data(bytes: &[u8]) -> bool {
    bytes.len() <= crate::frame::MAX_CONTROL_PAYLOAD
}

/// Builds a close-frame payload: a 2-byte big-endian code followed by a
/// UTF-8 reason. Returns an error instead of a payload if the combined
/// length would exceed 125 bytes — the caller should report that locally
/// without ever attempting to send it.
pub fn build_close_payload(code: CloseCode, reason: &str) -> Result<Vec<u8>, Error> {
    let reason_bytes = reason.as_bytes();
    if reason_bytes.len() + 2 > crate::frame::MAX_CONTROL_PAYLOAD {
        return Err(Error::CloseReasonTooLarge(reason_bytes.len()));
    }
    let mut payload = Vec::with_capacity(2 + reason_bytes.len());
    payload.extend_from_slice(&code.0.to_be_bytes());
    payload.extend_from_slice(reason_bytes);
    Ok(payload)
}

/// Parses a received close payload back into its code and reason, if any.
/// An empty payload (no status code at all) yields `None`.
pub fn parse_close_payload(payload: &[u8]) -> Result<Option<(CloseCode, String)>, Error> {
    if payload.is_empty() {
        return Ok(None);
    }
    if payload.len() < 2 {
        return Err(Error::ControlFramePayloadTooLarge);
    }
    let code = CloseCode(u16::from_be_bytes([payload[0], payload[1]]));
    let reason = String::from_utf8(payload[2..].to_vec())?;
    Ok(Some((code, reason)))
}
