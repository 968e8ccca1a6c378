//! A server-side implementation of the WebSocket wire protocol, [RFC 6455].
//!
//! This crate does not perform the HTTP Upgrade handshake, TLS termination,
//! origin checks or subprotocol negotiation — callers hand it a stream that
//! has already been upgraded (see [`handshake`] for a minimal helper that
//! does exactly that) and [`Connection`] takes over from there: framing,
//! fragmentation, control-frame handling, optional `permessage-deflate`
//! compression and the close handshake.
//!
//! [RFC 6455]: https://datatracker.ietf.org/doc/html/rfc6455

pub mod compression;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod frame;
pub mod handshake;
pub mod message;
pub mod payload;
pub mod queue;
mod recv;
mod send;
pub mod server;
pub mod state;

#[cfg(test)]
mod tests;

pub use config::WebSocketConfig;
pub use connection::Connection;
pub use error::Error;
pub use event::EventHandler;
pub use message::{Message, MessageEvent};
pub use payload::CloseCode;
pub use state::ConnectionState;
