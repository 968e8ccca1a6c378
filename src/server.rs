//! TCP accept loop and multi-connection registry (ambient — built on top
//! of the connection engine, not one of its named components).
//!
//! Grounded in `examples/felipemeriga-socket-flow/src/server.rs`: bind a
//! `TcpListener`, accept in a loop, hand each socket through the
//! handshake and into a fresh [`Connection`], and fan every connection's
//! notifications into one `mpsc` channel tagged by [`ConnectionId`] via
//! [`ChannelEventHandler`] — the same multi-connection pattern the
//! teacher's `Event`/`EventStream` pair gives a caller who wants a single
//! place to watch every connection at once, rather than one
//! [`crate::event::EventHandler`] per connection.

use crate::config::WebSocketConfig;
use crate::connection::Connection;
use crate::error::Error;
use crate::event::{generate_connection_id, ChannelEventHandler, ConnectionId, ServerEvent};
use crate::handshake;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, RwLock};

/// Live connections, keyed by the id handed out at accept time. Entries
/// are removed by the connection's close hook once it reaches `Closed`.
pub type Registry = Arc<RwLock<HashMap<ConnectionId, Connection<TcpStream>>>>;

pub struct Server {
    listener: TcpListener,
    config: WebSocketConfig,
    registry: Registry,
}

impl Server {
    pub async fn bind<A: ToSocketAddrs>(addr: A, config: WebSocketConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Server {
            listener,
            config,
            registry: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Accepts connections forever. Each accepted socket runs the HTTP
    /// upgrade handshake, then `ConnectAsServer`, on its own task; every
    /// connection's events are tagged with its [`ConnectionId`] and sent
    /// to `events`. Returns only if the listener itself errors.
    pub async fn serve(&self, events: mpsc::Sender<ServerEvent>) -> Result<(), Error> {
        loop {
            let (stream, _peer) = self.listener.accept().await?;
            let config = self.config.clone();
            let events = events.clone();
            let registry = self.registry.clone();
            tokio::spawn(accept_connection(stream, config, events, registry));
        }
    }
}

async fn accept_connection(
    mut stream: TcpStream,
    config: WebSocketConfig,
    events: mpsc::Sender<ServerEvent>,
    registry: Registry,
) {
    if let Err(err) = handshake::accept(&mut stream).await {
        log::warn!("handshake failed: {err}");
        let _ = events
            .send(ServerEvent::Error(generate_connection_id(), err.to_string()))
            .await;
        return;
    }

    let id = generate_connection_id();
    log::debug!("{id} upgraded");
    let handler = Arc::new(ChannelEventHandler::new(id, events.clone()));

    let registry_for_hook = registry.clone();
    let close_hook: Box<dyn FnOnce() + Send> = Box::new(move || {
        tokio::spawn(async move {
            registry_for_hook.write().await.remove(&id);
        });
    });

    let conn = Connection::with_close_hook(stream, config, handler, Some(close_hook));
    registry.write().await.insert(id, conn.clone());

    if let Err(err) = conn.connect_as_server().await {
        let _ = events.send(ServerEvent::Error(id, err.to_string())).await;
    }
}
