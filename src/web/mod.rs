//! Web server module: axum HTTP + WebSocket for viewers
//!
//! - `GET /` — status JSON
//! - `WS /video` — per-viewer frame stream with text control messages

pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::server::ClientRegistry;

/// Shared state for the web server
struct WebState {
    registry: ClientRegistry,
    start_time: Instant,
}

/// Build the application router. Split out from [`start`] so tests can
/// mount it on their own listener.
pub fn app(registry: ClientRegistry) -> Router {
    let state = Arc::new(WebState {
        registry,
        start_time: Instant::now(),
    });

    Router::new()
        .route("/", get(status))
        .route("/video", get(ws_upgrade))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until process exit.
pub async fn start(registry: ClientRegistry, bind: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .context(format!("Failed to bind to {}", bind))?;

    info!("Web server listening on http://{}", bind);

    axum::serve(listener, app(registry))
        .await
        .context("Web server error")?;

    Ok(())
}

/// WebSocket upgrade handler
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WebState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws::handle_socket(socket, state.registry.clone()))
}

/// GET / — server status
async fn status(State(state): State<Arc<WebState>>) -> Json<serde_json::Value> {
    let stats = state.registry.stats();
    Json(serde_json::json!({
        "status": "Streaming server is running",
        "subscribers": stats.subscribers,
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "frames_delivered": stats.frames_delivered,
        "frames_dropped": stats.frames_dropped,
    }))
}
