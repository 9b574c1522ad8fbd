//! services/pulse_api/src/web/connections.rs
//!
//! Tracks the outgoing channel of every open WebSocket and implements the
//! `SessionTransport` port on top of them.

use std::collections::HashMap;

use async_trait::async_trait;
use pulse_core::{PortError, PortResult, ServerEvent, SessionId, SessionTransport};
use tokio::sync::{mpsc, RwLock};

use crate::web::protocol::ServerMessage;

pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// Maps each live session to the channel drained by its socket writer task.
#[derive(Default)]
pub struct ConnectionHub {
    outboxes: RwLock<HashMap<SessionId, Outbox>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session and returns the receiving half of its outbox.
    pub async fn open(&self, session_id: SessionId) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outboxes.write().await.insert(session_id, tx);
        rx
    }

    pub async fn close(&self, session_id: SessionId) {
        self.outboxes.write().await.remove(&session_id);
    }

    /// Queues a frame for one session.
    pub async fn send(&self, session_id: SessionId, message: ServerMessage) -> PortResult<()> {
        let outboxes = self.outboxes.read().await;
        let outbox = outboxes
            .get(&session_id)
            .ok_or_else(|| PortError::Delivery(format!("session {} is not connected", session_id)))?;
        outbox
            .send(message)
            .map_err(|_| PortError::Delivery(format!("session {} has closed", session_id)))
    }

    pub async fn len(&self) -> usize {
        self.outboxes.read().await.len()
    }
}

#[async_trait]
impl SessionTransport for ConnectionHub {
    async fn push(&self, session_id: SessionId, event: ServerEvent) -> PortResult<()> {
        self.send(session_id, ServerMessage::from(event)).await
    }
}
