//! WebSocket — one socket per participant, pumped against the orchestrator.
//!
//! Inbound frames are `{"event": "...", "data": {...}}` ClientEvents;
//! outbound ServerEvents use the same shape. Identity and the optional
//! forced-partner directive arrive as query parameters on the upgrade.

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocket, Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use masquerade_core::events::ClientEvent;
use masquerade_core::orchestrator::Command;
use masquerade_core::participant::{ForcedPartner, HumanHandle};

use super::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_handler))
}

#[derive(Deserialize)]
struct ConnectQuery {
    user_id: Option<String>,
    force: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, query, state))
}

async fn handle_socket(mut socket: WebSocket, query: ConnectQuery, state: Arc<AppState>) {
    let conn_id = Uuid::new_v4();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let forced = query.force.as_deref().and_then(ForcedPartner::parse);
    let handle = HumanHandle::new(conn_id, query.user_id, forced, event_tx);

    info!("WebSocket client connected ({})", conn_id);
    if state.commands.send(Command::Connect { handle }).is_err() {
        // Orchestrator gone — nothing to talk to.
        return;
    }

    loop {
        tokio::select! {
            // Outbound events from the orchestrator -> socket
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if socket
                            .send(axum::extract::ws::Message::Text(json.into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("Failed to serialize event: {}", e);
                    }
                }
            }
            // Inbound frames -> orchestrator
            msg = socket.recv() => {
                match msg {
                    Some(Ok(axum::extract::ws::Message::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => {
                                let _ = state
                                    .commands
                                    .send(Command::Client { conn_id, event });
                            }
                            Err(e) => {
                                debug!("Ignoring malformed frame from {}: {}", conn_id, e);
                            }
                        }
                    }
                    Some(Ok(_)) => {} // ping/pong/binary — ignore
                    _ => break,       // disconnected or error
                }
            }
        }
    }

    let _ = state.commands.send(Command::Disconnect { conn_id });
    info!("WebSocket client disconnected ({})", conn_id);
}
