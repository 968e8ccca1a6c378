//! End-to-end scenario tests exercising a full [`Connection`] lifecycle
//! against a simulated peer, the way
//! `examples/felipemeriga-socket-flow/src/tests.rs` exercises the whole
//! connection rather than one component at a time. Per-component
//! properties (frame round-trips, fragmentation arithmetic, state
//! transitions) live in each module's own `#[cfg(test)]` block; this file
//! is for behavior that only shows up once every component is wired
//! together.

use crate::config::{CompressionMode, DeflateParams, WebSocketConfig};
use crate::connection::Connection;
use crate::event::{EventHandler, NoopEventHandler};
use crate::frame::{decode_frame, encode_frame, Frame, OpCode};
use crate::message::MessageEvent;
use crate::payload::{build_close_payload, parse_close_payload, CloseCode};
use crate::state::ConnectionState;
use std::sync::{Arc, Mutex};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

struct RecordingHandler {
    messages: Mutex<Vec<MessageEvent>>,
}

impl RecordingHandler {
    fn new() -> Self {
        RecordingHandler {
            messages: Mutex::new(Vec::new()),
        }
    }
}

impl EventHandler for RecordingHandler {
    fn on_message(&self, event: MessageEvent) {
        self.messages.lock().unwrap().push(event);
    }
}

/// Masks a client-to-server frame with `key`, the way a real browser
/// client would — `encode_frame` never masks, since this crate only ever
/// plays the server role, so tests that need a masked frame on the wire
/// build one by hand.
async fn send_masked(stream: &mut DuplexStream, fin: bool, opcode: OpCode, payload: &[u8]) {
    let key = [0x12u8, 0x34, 0x56, 0x78];
    let mut masked = payload.to_vec();
    for (i, byte) in masked.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }

    let first_byte = (fin as u8) << 7 | opcode.as_byte();
    let mut header = vec![first_byte];
    let len = masked.len();
    if len <= 125 {
        header.push(0x80 | len as u8);
    } else if len <= u16::MAX as usize {
        header.push(0x80 | 126);
        header.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        header.push(0x80 | 127);
        header.extend_from_slice(&(len as u64).to_be_bytes());
    }
    header.extend_from_slice(&key);

    stream.write_all(&header).await.unwrap();
    stream.write_all(&masked).await.unwrap();
}

#[tokio::test]
async fn scenario_text_echo() {
    let (server_stream, mut client_stream) = duplex(4096);
    let handler = Arc::new(RecordingHandler::new());
    let conn = Connection::new(server_stream, WebSocketConfig::default(), handler);
    conn.connect_as_server().await.unwrap();

    send_masked(&mut client_stream, true, OpCode::Text, b"ping-pong").await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let received = conn.try_recv().expect("message queued");
    assert_eq!(received.as_text().unwrap(), "ping-pong");

    conn.send_text("ping-pong").await.unwrap();
    let reply = decode_frame(&mut client_stream, false, false, 1 << 20)
        .await
        .unwrap();
    assert_eq!(reply.opcode, OpCode::Text);
    assert_eq!(reply.payload, b"ping-pong");
}

#[tokio::test]
async fn scenario_fragmented_binary_message_with_interleaved_ping() {
    let (server_stream, mut client_stream) = duplex(4096);
    let handler = Arc::new(RecordingHandler::new());
    let conn = Connection::new(server_stream, WebSocketConfig::default(), handler);
    conn.connect_as_server().await.unwrap();

    send_masked(&mut client_stream, false, OpCode::Binary, &[0xAA, 0xBB]).await;
    send_masked(&mut client_stream, true, OpCode::Ping, b"alive?").await;
    send_masked(&mut client_stream, true, OpCode::Continuation, &[0xCC]).await;

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    // The Pong reply to the interleaved Ping arrives before the
    // reassembled message is queued, since it's answered inline.
    let pong = decode_frame(&mut client_stream, false, false, 1 << 20)
        .await
        .unwrap();
    assert_eq!(pong.opcode, OpCode::Pong);
    assert_eq!(pong.payload, b"alive?");

    let received = conn.try_recv().expect("message queued");
    match received.message {
        crate::message::Message::Binary(bytes) => assert_eq!(bytes, vec![0xAA, 0xBB, 0xCC]),
        other => panic!("expected binary, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_unmasked_peer_frame_closes_with_protocol_error() {
    let (server_stream, mut client_stream) = duplex(4096);
    let handler = Arc::new(RecordingHandler::new());
    let conn = Connection::new(server_stream, WebSocketConfig::default(), handler);
    conn.connect_as_server().await.unwrap();

    // Deliberately unmasked — encode_frame never masks.
    encode_frame(&mut client_stream, &Frame::new(true, OpCode::Text, b"nope".to_vec()))
        .await
        .unwrap();

    let close_frame = decode_frame(&mut client_stream, false, false, 1 << 20)
        .await
        .unwrap();
    assert_eq!(close_frame.opcode, OpCode::Close);
    let (code, _reason) = parse_close_payload(&close_frame.payload).unwrap().unwrap();
    assert_eq!(code, CloseCode::PROTOCOL_ERROR);

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    assert_eq!(conn.state().await, ConnectionState::Closed);
}

#[tokio::test]
async fn scenario_graceful_close_with_code_and_reason() {
    let (server_stream, mut client_stream) = duplex(4096);
    let handler = Arc::new(NoopEventHandler);
    let conn = Connection::new(server_stream, WebSocketConfig::default(), handler);
    conn.connect_as_server().await.unwrap();

    let close_conn = conn.clone();
    let close_task = tokio::spawn(async move {
        close_conn
            .close_with(CloseCode::NORMAL, "done")
            .await
            .unwrap();
    });

    let close_frame = decode_frame(&mut client_stream, false, false, 1 << 20)
        .await
        .unwrap();
    assert_eq!(close_frame.opcode, OpCode::Close);
    let (code, reason) = parse_close_payload(&close_frame.payload).unwrap().unwrap();
    assert_eq!(code, CloseCode::NORMAL);
    assert_eq!(reason, "done");

    // Acknowledge, as a well-behaved peer would.
    let ack = build_close_payload(CloseCode::NORMAL, "").unwrap();
    send_masked(&mut client_stream, true, OpCode::Close, &ack).await;

    close_task.await.unwrap();
    assert_eq!(conn.state().await, ConnectionState::Closed);
}

#[tokio::test]
async fn scenario_reserved_close_code_sends_no_close_frame() {
    let (server_stream, mut client_stream) = duplex(4096);
    let handler = Arc::new(NoopEventHandler);
    let conn = Connection::new(server_stream, WebSocketConfig::default(), handler);
    conn.connect_as_server().await.unwrap();

    conn.close_with(CloseCode::ABNORMAL, "").await.unwrap();
    assert_eq!(conn.state().await, ConnectionState::Closed);

    let mut buf = [0u8; 8];
    let read = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        client_stream.read(&mut buf),
    )
    .await;
    match read {
        Ok(Ok(0)) | Err(_) => {}
        other => panic!("expected no bytes on the wire, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_compressed_round_trip() {
    let config = WebSocketConfig {
        compression: CompressionMode::Deflate(DeflateParams::default()),
        ..Default::default()
    };
    let (server_stream, mut client_stream) = duplex(8192);
    let handler = Arc::new(RecordingHandler::new());
    let conn = Connection::new(server_stream, config.clone(), handler);
    conn.connect_as_server().await.unwrap();

    let text = "compress me ".repeat(40);
    conn.send_text(text.clone()).await.unwrap();

    let frame = decode_frame(&mut client_stream, false, true, 1 << 20)
        .await
        .unwrap();
    assert!(frame.rsv1);
    assert!(frame.payload.len() < text.len());
}
