//! services/pulse_api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! Each socket is one session: it registers a user, sends messages, and on
//! close is removed from the presence registry.

use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use pulse_core::SessionId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let session_id = SessionId::new();
    info!(session_id = %session_id, "New WebSocket connection established.");

    let (sender, mut receiver) = socket.split();
    let outbox = app_state.connections.open(session_id).await;
    let writer = tokio::spawn(write_frames(sender, outbox, session_id));

    // --- Main Message Loop ---
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                handle_text_message(text.as_str(), session_id, &app_state).await;
            }
            Ok(Message::Close(_)) => {
                info!(session_id = %session_id, "Client sent close message.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(session_id = %session_id, "WebSocket read failed: {}", e);
                break;
            }
        }
    }

    // --- Cleanup ---
    // Leave the registry first so no new pushes target this session.
    app_state.hub.disconnect(session_id).await;
    app_state.connections.close(session_id).await;
    if let Err(e) = writer.await {
        error!(session_id = %session_id, "Socket writer task failed: {:?}", e);
    }
    info!(session_id = %session_id, "WebSocket connection closed.");
}

/// Drains the session's outbox into the socket until either side closes.
async fn write_frames(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbox: mpsc::UnboundedReceiver<ServerMessage>,
    session_id: SessionId,
) {
    while let Some(message) = outbox.recv().await {
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                error!(session_id = %session_id, "Failed to serialize server message: {}", e);
                continue;
            }
        };
        if sender.send(Message::Text(json.into())).await.is_err() {
            debug!(session_id = %session_id, "Socket closed while writing.");
            break;
        }
    }
    let _ = sender.close().await;
}

/// Helper function to handle the logic for different `ClientMessage` variants.
async fn handle_text_message(text: &str, session_id: SessionId, app_state: &Arc<AppState>) {
    let client_msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(client_msg) => client_msg,
        Err(e) => {
            warn!(session_id = %session_id, "Failed to deserialize client message: {}", e);
            reply(
                app_state,
                session_id,
                ServerMessage::Error {
                    message: "Unrecognised message.".to_string(),
                },
            )
            .await;
            return;
        }
    };

    match client_msg {
        ClientMessage::Register { user_id } => {
            match app_state.hub.register(session_id, user_id.clone()).await {
                Ok(()) => {
                    reply(
                        app_state,
                        session_id,
                        ServerMessage::Registered {
                            user_id,
                            session_id: session_id.as_uuid(),
                        },
                    )
                    .await;
                }
                Err(e) => {
                    warn!(session_id = %session_id, "Register rejected: {}", e);
                    reply(
                        app_state,
                        session_id,
                        ServerMessage::Error {
                            message: e.to_string(),
                        },
                    )
                    .await;
                }
            }
        }
        ClientMessage::SendMessage {
            sender_id,
            receiver_id,
            text,
        } => {
            // Failures were already reported to this session by the hub.
            if let Err(e) = app_state
                .hub
                .send_message(session_id, sender_id, receiver_id, text)
                .await
            {
                debug!(session_id = %session_id, "Send failed: {}", e);
            }
        }
    }
}

async fn reply(app_state: &Arc<AppState>, session_id: SessionId, message: ServerMessage) {
    if let Err(e) = app_state.connections.send(session_id, message).await {
        debug!(session_id = %session_id, "Could not reply: {}", e);
    }
}
