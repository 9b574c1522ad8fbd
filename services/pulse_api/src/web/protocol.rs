//! services/pulse_api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server
//! for real-time presence and direct messaging.

use pulse_core::{Message, ServerEvent, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Announces which user this connection belongs to. May be repeated.
    #[serde(rename_all = "camelCase")]
    Register { user_id: UserId },

    /// Sends a direct message to another user.
    #[serde(rename_all = "camelCase")]
    SendMessage {
        sender_id: UserId,
        receiver_id: UserId,
        text: String,
    },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the connection is bound to a user.
    #[serde(rename_all = "camelCase")]
    Registered { user_id: UserId, session_id: Uuid },

    /// A new message addressed to this user.
    ReceiveMessage { message: Message },

    /// The message this connection sent was stored.
    MessageSent { message: Message },

    /// Reports an error to the client, which should display an error message.
    Error { message: String },
}

impl From<ServerEvent> for ServerMessage {
    fn from(event: ServerEvent) -> Self {
        match event {
            ServerEvent::ReceiveMessage(message) => ServerMessage::ReceiveMessage { message },
            ServerEvent::MessageSent(message) => ServerMessage::MessageSent { message },
            ServerEvent::SendFailed { reason } => ServerMessage::Error {
                message: format!("Message not sent: {}", reason),
            },
        }
    }
}
