//! WebSocket handler: one subscriber per connection
//!
//! Registration puts the connection into the registry with a bounded
//! outbound queue; a forward task drains that queue into the socket while
//! this task relays inbound control messages (`"secure"` / `"normal"`).
//! Either side failing funnels into the same idempotent cleanup, which may
//! race with the broadcast loop removing the subscriber on send failure.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::server::{ClientRegistry, ViewMode, FRAME_QUEUE_DEPTH};

/// Handle a single viewer connection until it closes.
pub async fn handle_socket(socket: WebSocket, registry: ClientRegistry) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (tx, mut rx) = mpsc::channel::<String>(FRAME_QUEUE_DEPTH);
    let id = registry.register(tx).await;
    info!(subscriber = %id, "Viewer connected");

    // Forward task: queue → socket. A send failure ends the task and drops
    // the receiver, which the broadcast loop observes as a dead queue.
    let forward = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_tx.send(Message::Text(payload)).await.is_err() {
                debug!("Socket send failed, forward task exiting");
                break;
            }
        }
    });

    // Control loop: inbound mode changes until close or error
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => match ViewMode::from_control(&text) {
                Some(mode) => {
                    registry.set_mode(id, mode).await;
                }
                None => {
                    debug!(subscriber = %id, message = %text, "Ignoring unknown control message");
                }
            },
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            // Ping/pong handled by the protocol layer; binary ignored
            _ => {}
        }
    }

    registry.remove(id).await;
    forward.abort();
    info!(subscriber = %id, "Viewer disconnected");
}
