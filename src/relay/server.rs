use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::diagnostics::stats::PipelineStats;
use crate::relay::error::RelayError;
use crate::relay::hub::RelayHub;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct RelayState {
    pub hub: Arc<RelayHub>,
    pub stats: Arc<PipelineStats>,
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/healthz", get(health))
        .route("/stats", get(stats))
        .with_state(state)
}

pub async fn bind(addr: &str) -> Result<TcpListener, RelayError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| RelayError::Bind {
            addr: addr.to_string(),
            source,
        })
}

/// Serve viewers on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: RelayState, shutdown: F) -> Result<(), RelayError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("relay server listening on ws://{addr}/ws");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(RelayError::Serve)
}

async fn health() -> &'static str {
    "ok"
}

async fn stats(State(state): State<RelayState>) -> impl IntoResponse {
    Json(state.stats.snapshot())
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<RelayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state.hub))
}

async fn handle_websocket(socket: WebSocket, hub: Arc<RelayHub>) {
    let (mut sender, mut receiver) = socket.split();
    let (id, mut rx) = hub.join();

    // Task: forward queued messages to this viewer
    let send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Receive loop: every text message goes to the other viewers verbatim
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                hub.relay_from(id, text);
            }
            Ok(Message::Close(_)) => {
                tracing::debug!("viewer {id} closed connection");
                break;
            }
            Err(e) => {
                tracing::warn!("viewer {id} WebSocket error: {e}");
                break;
            }
            _ => {} // axum handles ping/pong automatically
        }
    }

    hub.leave(id);
    send_task.abort();
}
