//! A minimal echo server built on the engine: every inbound message is
//! sent back verbatim to its own connection. Mirrors the shape of
//! `examples/felipemeriga-socket-flow`'s own echo example, wired to this
//! crate's `ChannelEventHandler`/`ServerEvent` fan-out instead of a
//! per-connection callback, since one task here wants to watch every
//! connection at once.

use ws_engine::config::WebSocketConfig;
use ws_engine::event::ServerEvent;
use ws_engine::server::Server;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let config = WebSocketConfig::default();
    let server = Server::bind("127.0.0.1:9001", config).await?;
    log::info!("listening on {}", server.local_addr()?);

    let (tx, mut rx) = tokio::sync::mpsc::channel(256);
    let registry = server.registry();

    let accept_loop = tokio::spawn(async move {
        if let Err(err) = server.serve(tx).await {
            log::error!("accept loop exited: {err}");
        }
    });

    while let Some(event) = rx.recv().await {
        match event {
            ServerEvent::NewConnection(id) => {
                log::info!("{id} connected");
            }
            ServerEvent::Message(id, message_event) => {
                if let Some(conn) = registry.read().await.get(&id).cloned() {
                    let _ = conn.send_async(message_event.message).await;
                }
            }
            ServerEvent::Error(id, message) => {
                log::warn!("{id}: {message}");
            }
            ServerEvent::Disconnect(id, was_clean, code, reason) => {
                log::info!("{id} disconnected clean={was_clean} code={code:?} reason={reason}");
            }
        }
    }

    accept_loop.await.ok();
    Ok(())
}
