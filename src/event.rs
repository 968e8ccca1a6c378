//! Event notification (component E).
//!
//! Four notification points — `on_open`, `on_message`, `on_error`,
//! `on_close` — invoked synchronously from the receive task (for inbound
//! events) or from the caller's thread (for send errors), always under
//! `event_lock` so no application ever observes a message before open or
//! after close.

use crate::error::Error;
use crate::message::MessageEvent;
use crate::payload::CloseCode;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// The four application notification points named in the connection's
/// public interface. `on_error` exceptions are swallowed by the emitter
/// (per the error-handling policy, an error reporting a second error
/// would recurse); `on_open`/`on_message`/`on_close` are expected not to
/// panic, and if they do, the panic is caught by the emitter and
/// reported through `on_error`, then escalates to a close with code 1011.
pub trait EventHandler: Send + Sync {
    fn on_open(&self) {}
    fn on_message(&self, event: MessageEvent) {
        let _ = event;
    }
    fn on_error(&self, message: String) {
        let _ = message;
    }
    fn on_close(&self, was_clean: bool, code: CloseCode, reason: String) {
        let _ = (was_clean, code, reason);
    }
}

/// An `EventHandler` that does nothing; useful as a default/placeholder.
pub struct NoopEventHandler;
impl EventHandler for NoopEventHandler {}

/// Serializes callback invocation behind `event_lock`, so `OnOpen`,
/// `OnMessage` and `OnClose` for one connection are always observed in
/// that relative order and never interleaved with each other.
pub struct EventEmitter {
    handler: Arc<dyn EventHandler>,
    event_lock: Mutex<()>,
}

impl EventEmitter {
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        EventEmitter {
            handler,
            event_lock: Mutex::new(()),
        }
    }

    pub async fn emit_open(&self) -> Result<(), Error> {
        let panicked = {
            let _guard = self.event_lock.lock().await;
            catch_unwind(AssertUnwindSafe(|| self.handler.on_open())).err()
        };
        match panicked {
            None => Ok(()),
            Some(payload) => Err(self.escalate(payload).await),
        }
    }

    pub async fn emit_message(&self, event: MessageEvent) -> Result<(), Error> {
        let panicked = {
            let _guard = self.event_lock.lock().await;
            catch_unwind(AssertUnwindSafe(|| self.handler.on_message(event))).err()
        };
        match panicked {
            None => Ok(()),
            Some(payload) => Err(self.escalate(payload).await),
        }
    }

    /// `on_error` panics are swallowed, not escalated — an error handler
    /// reporting a second error would recurse.
    pub async fn emit_error(&self, message: String) {
        let _guard = self.event_lock.lock().await;
        let _ = catch_unwind(AssertUnwindSafe(|| self.handler.on_error(message)));
    }

    pub async fn emit_close(
        &self,
        was_clean: bool,
        code: CloseCode,
        reason: String,
    ) -> Result<(), Error> {
        let panicked = {
            let _guard = self.event_lock.lock().await;
            catch_unwind(AssertUnwindSafe(|| self.handler.on_close(was_clean, code, reason)))
                .err()
        };
        match panicked {
            None => Ok(()),
            Some(payload) => Err(self.escalate(payload).await),
        }
    }

    /// Reports a caught callback panic through `on_error` and turns it into
    /// the error that drives the receive loop's close-with-1011 escalation.
    async fn escalate(&self, payload: Box<dyn Any + Send>) -> Error {
        let message = panic_message(payload);
        self.emit_error(message.clone()).await;
        Error::CallbackPanicked(message)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "event handler panicked with a non-string payload".to_string()
    }
}

/// Identifies one connection across a multi-connection server.
pub type ConnectionId = Uuid;

pub fn generate_connection_id() -> ConnectionId {
    Uuid::new_v4()
}

/// A server-wide event, tagged with the connection it came from. Fans
/// multiple connections' notifications into a single `mpsc` stream for a
/// server loop that wants one place to watch all of them, the way
/// `examples/felipemeriga-socket-flow/src/event.rs`'s `Event`/`EventStream`
/// does — an additive alternative to implementing [`EventHandler`]
/// per-connection.
pub enum ServerEvent {
    NewConnection(ConnectionId),
    Message(ConnectionId, MessageEvent),
    Error(ConnectionId, String),
    Disconnect(ConnectionId, bool, CloseCode, String),
}

/// An [`EventHandler`] that forwards every notification into a shared
/// `mpsc` channel, tagged with `id`. Pairs with [`ServerEvent`].
pub struct ChannelEventHandler {
    id: ConnectionId,
    tx: tokio::sync::mpsc::Sender<ServerEvent>,
}

impl ChannelEventHandler {
    pub fn new(id: ConnectionId, tx: tokio::sync::mpsc::Sender<ServerEvent>) -> Self {
        ChannelEventHandler { id, tx }
    }
}

impl EventHandler for ChannelEventHandler {
    fn on_open(&self) {
        let _ = self.tx.try_send(ServerEvent::NewConnection(self.id));
    }

    fn on_message(&self, event: MessageEvent) {
        let _ = self.tx.try_send(ServerEvent::Message(self.id, event));
    }

    fn on_error(&self, message: String) {
        let _ = self.tx.try_send(ServerEvent::Error(self.id, message));
    }

    fn on_close(&self, was_clean: bool, code: CloseCode, reason: String) {
        let _ = self
            .tx
            .try_send(ServerEvent::Disconnect(self.id, was_clean, code, reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        opens: AtomicUsize,
        messages: AtomicUsize,
        closes: AtomicUsize,
    }

    impl EventHandler for CountingHandler {
        fn on_open(&self) {
            self.opens.fetch_add(1, Ordering::SeqCst);
        }
        fn on_message(&self, _event: MessageEvent) {
            self.messages.fetch_add(1, Ordering::SeqCst);
        }
        fn on_close(&self, _was_clean: bool, _code: CloseCode, _reason: String) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn emits_events_in_order() {
        let handler = Arc::new(CountingHandler {
            opens: AtomicUsize::new(0),
            messages: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        });
        let emitter = EventEmitter::new(handler.clone());

        emitter.emit_open().await.unwrap();
        emitter
            .emit_message(MessageEvent::new(Message::Text("hi".into())))
            .await
            .unwrap();
        emitter
            .emit_close(true, CloseCode::NORMAL, String::new())
            .await
            .unwrap();

        assert_eq!(handler.opens.load(Ordering::SeqCst), 1);
        assert_eq!(handler.messages.load(Ordering::SeqCst), 1);
        assert_eq!(handler.closes.load(Ordering::SeqCst), 1);
    }

    struct PanickingHandler;
    impl EventHandler for PanickingHandler {
        fn on_message(&self, _event: MessageEvent) {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn a_panicking_callback_is_caught_and_reported_as_callback_panicked() {
        let emitter = EventEmitter::new(Arc::new(PanickingHandler));
        let err = emitter
            .emit_message(MessageEvent::new(Message::Text("hi".into())))
            .await
            .unwrap_err();
        assert_eq!(
            err.close_code(),
            Some(crate::payload::CloseCode::INTERNAL_ERROR)
        );
    }
}
