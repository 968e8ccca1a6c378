//! HTTP Upgrade handshake (ambient — not one of the named components, but
//! required to get from an accepted TCP connection to something
//! [`crate::connection::Connection`] can take over).
//!
//! Parses the client's upgrade request with `httparse`, validates it's a
//! WebSocket upgrade, and computes `Sec-WebSocket-Accept` the way RFC 6455
//! §4.2.2 requires: append the GUID, SHA-1, base64. Mirrors
//! `examples/felipemeriga-socket-flow/src/handshake.rs` and `utils.rs`.
//! Subprotocol selection and origin policy are deliberately not
//! implemented — the caller gets the raw header list and decides.

use crate::error::Error;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const MAX_REQUEST_BYTES: usize = 8192;

/// The parts of the client's handshake request the caller might care
/// about beyond the bare key exchange.
pub struct HandshakeRequest {
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl HandshakeRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Reads and validates the client's opening HTTP request off `stream`,
/// byte by byte until the blank line terminating the headers, then writes
/// the `101 Switching Protocols` response. Returns the parsed request so
/// the caller can inspect the path or any header it needs.
pub async fn accept<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
) -> Result<HandshakeRequest, Error> {
    let request_bytes = read_request(stream).await?;

    let mut header_storage = [httparse::EMPTY_HEADER; 32];
    let mut parsed = httparse::Request::new(&mut header_storage);
    let parse_result = parsed
        .parse(&request_bytes)
        .map_err(|_| Error::Handshake("malformed HTTP request".into()))?;
    if parse_result.is_partial() {
        return Err(Error::Handshake("incomplete HTTP request".into()));
    }

    let headers: Vec<(String, String)> = parsed
        .headers
        .iter()
        .map(|header| {
            (
                header.name.to_string(),
                String::from_utf8_lossy(header.value).into_owned(),
            )
        })
        .collect();

    let request = HandshakeRequest {
        path: parsed.path.unwrap_or("/").to_string(),
        headers,
    };

    let key = request
        .header("Sec-WebSocket-Key")
        .ok_or_else(|| Error::Handshake("missing Sec-WebSocket-Key".into()))?;
    let accept_value = accept_key(key);

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept_value}\r\n\r\n"
    );
    stream.write_all(response.as_bytes()).await?;

    Ok(request)
}

/// Computes `Sec-WebSocket-Accept` for a client's `Sec-WebSocket-Key`.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

async fn read_request<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(Error::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed during handshake",
                ),
            });
        }
        buf.push(byte[0]);
        if buf.len() > MAX_REQUEST_BYTES {
            return Err(Error::Handshake("handshake request too large".into()));
        }
        if buf.ends_with(b"\r\n\r\n") {
            break;
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_the_rfc6455_worked_example() {
        // RFC 6455 §1.3's worked example.
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[tokio::test]
    async fn accept_parses_path_and_writes_101_response() {
        let (mut server_stream, mut client_stream) = tokio::io::duplex(4096);
        let request = b"GET /chat HTTP/1.1\r\n\
Host: example.com\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\
Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
Sec-WebSocket-Version: 13\r\n\r\n";

        let client_task = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            client_stream.write_all(request).await.unwrap();
            use tokio::io::AsyncReadExt;
            let mut response = vec![0u8; 256];
            let n = client_stream.read(&mut response).await.unwrap();
            response.truncate(n);
            response
        });

        let handshake = accept(&mut server_stream).await.unwrap();
        assert_eq!(handshake.path, "/chat");
        assert_eq!(
            handshake.header("Sec-WebSocket-Key"),
            Some("dGhlIHNhbXBsZSBub25jZQ==")
        );

        let response = client_task.await.unwrap();
        let response = String::from_utf8(response).unwrap();
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols"));
        assert!(response.contains("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));
    }
}
