//! Application-level message types.
//!
//! A [`Message`] is what the application hands to `SendAsync` or receives
//! from `OnMessage` — opcode-tagged payload, fragmentation and compression
//! already applied or already undone. [`MessageEvent`] is the queued form
//! the receive loop hands off to the event queue; today it's a thin
//! wrapper, kept distinct from `Message` because the data model names it
//! separately (produced by the receive loop, consumed exactly once by the
//! event emitter, then discarded).

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl Message {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(data) => data,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_text(&self) -> Result<&str, Error> {
        match self {
            Message::Text(text) => Ok(text),
            Message::Binary(_) => Err(Error::NotText),
        }
    }
}

/// A fully assembled inbound message, queued for delivery to the
/// application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub message: Message,
}

impl MessageEvent {
    pub fn new(message: Message) -> Self {
        MessageEvent { message }
    }

    pub fn as_text(&self) -> Result<&str, Error> {
        self.message.as_text()
    }
}
