// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! WebSocket bridge — translates browser connections into Session Runner
//! calls and pushes back both direct replies and scheduler-originated
//! events (reminders, scheduled task results, webhook results).
//!
//! JSON over text frames: `{"type": "message", "text": "...", "user_id": "..."}`
//! in, `{"type": "message", role, content}`, `{"type": "events", content}`,
//! `{"type": "status", content}` or `{"type": "error", message}` out.
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientCommand {
    Message { text: String, user_id: Option<String> },
}

async fn handle_socket(mut socket: WebSocket, session_id: Uuid, state: AppState) {
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel();
    let conn_id = state.connections.register(session_id, outbox_tx).await;

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&state, session_id, &text, &mut socket).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("WebSocket recv error: {e}");
                        break;
                    }
                }
            }
            payload = outbox_rx.recv() => {
                match payload {
                    Some(text) => {
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.connections.unregister(session_id, conn_id).await;
    debug!(%session_id, "WebSocket connection closed");
}

async fn handle_client_message(
    state: &AppState,
    session_id: Uuid,
    text: &str,
    socket: &mut WebSocket,
) {
    let command: ClientCommand = match serde_json::from_str(text) {
        Ok(c) => c,
        Err(e) => {
            send_error(socket, &format!("invalid JSON command: {e}")).await;
            return;
        }
    };

    let ClientCommand::Message { text, user_id } = command;
    let user_id = user_id.unwrap_or_else(|| state.config.server.default_user_id.clone());

    let runner = match state.sessions.get_or_create(session_id, &user_id).await {
        Ok(r) => r,
        Err(e) => {
            warn!(%session_id, error = %e, "failed to bootstrap session for WS message");
            send_error(socket, "failed to start session").await;
            return;
        }
    };

    let result = match runner.process_message(&text).await {
        Ok(r) => r,
        Err(e) => {
            warn!(%session_id, error = %e, "failed to process WS message");
            send_error(socket, "failed to process message").await;
            return;
        }
    };

    let message_frame = serde_json::json!({
        "type": "message",
        "role": "assistant",
        "content": result.response,
    });
    let events_frame = serde_json::json!({
        "type": "events",
        "content": result.events,
    });
    // Broadcast rather than writing directly to `socket`: this connection is
    // already registered in the Connection Manager, so broadcasting reaches
    // it (and any other socket open on the same session) exactly once.
    state
        .connections
        .broadcast_to_session(session_id, &message_frame.to_string())
        .await;
    state
        .connections
        .broadcast_to_session(session_id, &events_frame.to_string())
        .await;
}

async fn send_error(socket: &mut WebSocket, message: &str) {
    let payload = serde_json::json!({ "type": "error", "message": message });
    let _ = socket.send(Message::Text(payload.to_string())).await;
}
