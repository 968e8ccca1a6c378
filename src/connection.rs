//! Per-connection state and the public operation surface (component S plus
//! the data-model root the other components hang off of).
//!
//! `Connection<S>` is generic over the underlying byte stream rather than
//! the teacher's concrete `SocketFlowStream` Plain/Secure enum — TLS
//! termination is out of scope here, so the only thing this engine needs
//! from `S` is `AsyncRead + AsyncWrite + Unpin + Send`, the same shape
//! `examples/felipemeriga-socket-flow/src/stream.rs` already generalizes
//! to. Whoever constructs a `Connection` decides what `S` is — a bare
//! `TcpStream`, a TLS-wrapped stream from an outer layer, or, in tests, a
//! `tokio::io::DuplexStream` half.
//!
//! Two locks guard connection-wide state: `send_lock` (the outbound
//! [`Writer`]) and `conn_lock` (state + the close hook). The documented
//! order is `send_lock` before `conn_lock` — [`Connection::close_with`]
//! takes them in that order so a close can check-and-transition state
//! atomically with respect to the frame it sends. `event_lock` (inside
//! [`EventEmitter`]) is never taken while either of those is held. The
//! event queue's lock is a leaf, acquired and released independently.

use crate::config::WebSocketConfig;
use crate::error::Error;
use crate::event::EventEmitter;
use crate::event::EventHandler;
use crate::frame::OpCode;
use crate::message::{Message, MessageEvent};
use crate::payload::{build_close_payload, CloseCode};
use crate::queue::EventQueue;
use crate::recv;
use crate::send::Writer;
use crate::state::ConnectionState;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

/// Runs once, when the connection reaches `Closed`, regardless of whether
/// that happened via a clean handshake or a protocol/I/O error. Typically
/// used by an enclosing server to drop the connection from its registry.
pub type CloseHook = Box<dyn FnOnce() + Send>;

pub(crate) struct ConnState {
    pub(crate) value: ConnectionState,
    pub(crate) close_hook: Option<CloseHook>,
}

pub(crate) struct Shared<S> {
    pub(crate) config: WebSocketConfig,
    pub(crate) state: Mutex<ConnState>,
    pub(crate) writer: Mutex<Writer<S>>,
    pub(crate) read_half: Mutex<Option<ReadHalf<S>>>,
    pub(crate) queue: EventQueue,
    pub(crate) emitter: EventEmitter,
    /// Signaled once by the receive loop when it returns, for any reason.
    /// `close_with` waits on this (bounded by `config.close_timeout`) to
    /// learn the peer's confirming Close frame arrived.
    pub(crate) exit_receiving: Notify,
    /// Signaled every time a Pong frame is received; reserved for a future
    /// keep-alive driver built on top of this engine.
    pub(crate) receive_pong: Notify,
    /// Signaled once the connection reaches `Closed` by any path. The
    /// receive loop races its next frame read against this so a close
    /// initiated against an unresponsive or silent peer still reclaims
    /// the loop's task once `close_timeout` gives up waiting, instead of
    /// leaving it parked on a read that may never return.
    pub(crate) shutdown: Notify,
}

/// One upgraded WebSocket connection.
///
/// Cheap to clone — clones share the same underlying state via `Arc`, the
/// way a socket handle would. `SendAsync` reflects that: it spawns the
/// actual write on a clone of `self` and returns a handle the caller may
/// await or drop.
pub struct Connection<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for Connection<S> {
    fn clone(&self) -> Self {
        Connection {
            shared: self.shared.clone(),
        }
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps `stream` in `Connecting` state. Call [`Connection::connect_as_server`]
    /// to move to `Open` and start the receive loop — this split mirrors
    /// the `SetContext` / `ConnectAsServer` pair in the connection's
    /// public interface.
    pub fn new(stream: S, config: WebSocketConfig, handler: Arc<dyn EventHandler>) -> Self {
        Self::with_close_hook(stream, config, handler, None)
    }

    pub fn with_close_hook(
        stream: S,
        config: WebSocketConfig,
        handler: Arc<dyn EventHandler>,
        close_hook: Option<CloseHook>,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let writer = Writer::new(write_half, config.compression);
        let queue = EventQueue::new(config.max_queued_messages);
        let emitter = EventEmitter::new(handler);

        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(ConnState {
                value: ConnectionState::Connecting,
                close_hook,
            }),
            writer: Mutex::new(writer),
            read_half: Mutex::new(Some(read_half)),
            queue,
            emitter,
            exit_receiving: Notify::new(),
            receive_pong: Notify::new(),
            shutdown: Notify::new(),
        });

        Connection { shared }
    }

    pub async fn state(&self) -> ConnectionState {
        self.shared.state.lock().await.value
    }

    /// Transitions `Connecting -> Open`, emits `OnOpen`, and spawns the
    /// receive loop. Per the design notes, the receive loop is a single
    /// `tokio::spawn`ed task, not a hand-rolled `Stream::poll_next`.
    pub async fn connect_as_server(&self) -> Result<(), Error> {
        {
            let mut guard = self.shared.state.lock().await;
            if guard.value != ConnectionState::Connecting {
                return Err(Error::InvalidState(guard.value));
            }
            guard.value = ConnectionState::Open;
        }

        let read_half = self
            .shared
            .read_half
            .lock()
            .await
            .take()
            .expect("connect_as_server called more than once");

        let shared = self.shared.clone();
        tokio::spawn(async move {
            recv::run(read_half, shared).await;
        });

        if let Err(err) = self.shared.emitter.emit_open().await {
            let _ = self.close_with(CloseCode::INTERNAL_ERROR, "").await;
            return Err(err);
        }
        Ok(())
    }

    /// Removes and returns the oldest message the receive loop has queued
    /// but the application hasn't consumed yet — the pull-based
    /// alternative to waiting on `OnMessage`.
    pub fn try_recv(&self) -> Option<MessageEvent> {
        self.shared.queue.dequeue()
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), Error> {
        self.send_message(Message::Text(text.into())).await
    }

    pub async fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<(), Error> {
        self.send_message(Message::Binary(data.into())).await
    }

    async fn send_message(&self, message: Message) -> Result<(), Error> {
        {
            let guard = self.shared.state.lock().await;
            guard.value.check_open()?;
        }

        let opcode = match &message {
            Message::Text(_) => OpCode::Text,
            Message::Binary(_) => OpCode::Binary,
        };
        let payload = message.as_bytes().to_vec();

        let result = {
            let mut writer = self.shared.writer.lock().await;
            writer.send_message(opcode, payload).await
        };

        if let Err(err) = &result {
            // A failed send does not by itself close the connection — the
            // receive loop owns the decision to close on I/O failure; a
            // one-off write failure is surfaced to the application instead.
            self.shared.emitter.emit_error(err.to_string()).await;
        }

        result
    }

    /// Spawns `message`'s send on a clone of this connection and returns a
    /// handle the caller can await for the result, or drop to fire-and-forget.
    pub fn send_async(&self, message: Message) -> JoinHandle<Result<(), Error>> {
        let this = self.clone();
        tokio::spawn(async move { this.send_message(message).await })
    }

    /// `Close(1000, "")`.
    pub async fn close(&self) -> Result<(), Error> {
        self.close_with(CloseCode::NORMAL, "").await
    }

    /// `Close(1001, "Away")` — the connection's `Dispose` operation.
    pub async fn dispose(&self) {
        let _ = self.close_with(CloseCode::GOING_AWAY, "Away").await;
    }

    /// Initiates (or completes) the close handshake with `code`/`reason`.
    ///
    /// If `code` is one of the three RFC-reserved codes (1005, 1006, 1015)
    /// no Close frame is sent — those codes must never appear on the wire —
    /// but the connection still transitions to `Closed` once the peer's
    /// reply arrives or `close_timeout` elapses, whichever is first.
    pub async fn close_with(&self, code: CloseCode, reason: &str) -> Result<(), Error> {
        let mut writer = self.shared.writer.lock().await; // send_lock
        let should_send = {
            let mut guard = self.shared.state.lock().await; // conn_lock, nested per lock order
            guard.value.check_closable()?;
            let was_open = guard.value == ConnectionState::Open;
            if was_open {
                guard.value = ConnectionState::CloseSent;
            }
            was_open && !code.is_reserved()
        };

        if should_send {
            let payload = build_close_payload(code, reason)?;
            let _ = writer.send_control(OpCode::Close, payload).await;
        }
        drop(writer);

        let _ = tokio::time::timeout(
            self.shared.config.close_timeout,
            self.shared.exit_receiving.notified(),
        )
        .await;

        let hook = {
            let mut guard = self.shared.state.lock().await;
            guard.value = ConnectionState::Closed;
            guard.close_hook.take()
        };
        // Wakes a receive loop still parked on a read the peer never
        // answers — without this it would sit on the stream until a
        // real I/O error arrived, if ever.
        self.shared.shutdown.notify_waiters();
        if let Some(hook) = hook {
            hook();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NoopEventHandler;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::io::{duplex, DuplexStream};

    fn pair() -> (DuplexStream, DuplexStream) {
        duplex(4096)
    }

    fn connection(stream: DuplexStream) -> Connection<DuplexStream> {
        Connection::new(
            stream,
            WebSocketConfig::default(),
            Arc::new(NoopEventHandler),
        )
    }

    #[tokio::test]
    async fn connect_as_server_transitions_to_open_and_emits_open() {
        let (server_stream, _client_stream) = pair();
        let conn = connection(server_stream);
        assert_eq!(conn.state().await, ConnectionState::Connecting);

        conn.connect_as_server().await.unwrap();
        assert_eq!(conn.state().await, ConnectionState::Open);
    }

    #[tokio::test]
    async fn send_before_open_is_rejected() {
        let (server_stream, _client_stream) = pair();
        let conn = connection(server_stream);
        assert!(conn.send_text("too early").await.is_err());
    }

    #[tokio::test]
    async fn reserved_close_code_sends_no_frame_but_still_closes() {
        let (server_stream, mut client_stream) = pair();
        let conn = connection(server_stream);
        conn.connect_as_server().await.unwrap();

        conn.close_with(CloseCode::ABNORMAL, "").await.unwrap();
        assert_eq!(conn.state().await, ConnectionState::Closed);

        // Nothing should have been written to the peer.
        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            client_stream.read(&mut buf),
        )
        .await;
        // Either the read times out (nothing sent) or the peer observed EOF
        // because the server side's write half was dropped on close.
        match read {
            Ok(Ok(0)) => {}
            Err(_) => {}
            other => panic!("expected no close frame bytes, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_hook_runs_exactly_once() {
        let (server_stream, _client_stream) = pair();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        let conn = Connection::with_close_hook(
            server_stream,
            WebSocketConfig::default(),
            Arc::new(NoopEventHandler),
            Some(Box::new(move || {
                ran_clone.store(true, Ordering::SeqCst);
            })),
        );
        conn.connect_as_server().await.unwrap();
        conn.close().await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }
}
