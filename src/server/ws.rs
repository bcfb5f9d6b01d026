//! WebSocket endpoint and per-client session handling.
//!
//! Each client holds one persistent `/ws` connection carrying UTF-8 JSON
//! both ways. The session splits the socket: a writer task drains the
//! client's bounded queue, while the read side parses commands and feeds
//! the control loop. Parse-level validation fails fast here, before the
//! command channel — malformed payloads never reach the control loop.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::commands::Command;
use crate::app::events::ErrorReply;
use crate::error::Error;
use crate::state::ControllerState;

use super::connections::ConnectionManager;
use super::control::ControlMsg;

/// Shared state for the axum handlers.
#[derive(Clone)]
pub struct ServerState {
    pub conn: Arc<ConnectionManager>,
    pub control: mpsc::Sender<ControlMsg>,
    pub state_rx: watch::Receiver<ControllerState>,
    pub queue_depth: usize,
    pub started_at: Instant,
}

/// Build the application router: the WebSocket endpoint plus the two
/// read-only status routes.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/status", get(status))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// One client session, registration to cleanup.
async fn handle_socket(socket: WebSocket, state: ServerState) {
    let client_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<String>(state.queue_depth);
    state.conn.register(client_id, tx);

    // Ask the control loop for the current snapshot so the client renders
    // real state before its first telemetry tick.
    if state
        .control
        .send(ControlMsg::Hello { client: client_id })
        .await
        .is_err()
    {
        state.conn.unregister(client_id);
        return;
    }

    let (mut sink, mut stream) = socket.split();

    // Writer: drain the bounded queue into the socket. Ends when the
    // client is unregistered (queue closed) or the socket dies.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    // Reader: parse commands and feed the control loop.
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => match Command::parse(&text) {
                Ok(cmd) => {
                    if state
                        .control
                        .send(ControlMsg::Command {
                            client: client_id,
                            cmd,
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    // Rejected locally: no mutation, no broadcast, reply to
                    // this client only.
                    debug!("client {client_id}: invalid command ({e})");
                    let reply = ErrorReply::from_error(&Error::Command(e));
                    let _ = state.conn.send_to(client_id, reply.to_wire());
                }
            },
            Ok(Message::Binary(data)) => {
                warn!("client {client_id}: unexpected binary frame ({} bytes)", data.len());
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {
                // Keepalive frames are answered by the protocol stack.
            }
            Ok(Message::Close(_)) => {
                debug!("client {client_id}: close frame");
                break;
            }
            Err(e) => {
                debug!("client {client_id}: socket error ({e})");
                break;
            }
        }
    }

    // Transport loss is silent cleanup — a later reconnect is a fresh
    // registration with no session carry-over.
    state.conn.unregister(client_id);
    writer.abort();
    info!("session {client_id} closed");
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn status(State(state): State<ServerState>) -> impl IntoResponse {
    let current = state.state_rx.borrow().clone();
    let body = serde_json::json!({
        "connected_clients": state.conn.client_count(),
        "mode": current.mode,
        "fan_speed": current.fan_speed_percent,
        "main_loop_state": current.main_loop_open,
        "diversion_state": current.diversion_open,
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, body.to_string())
}
