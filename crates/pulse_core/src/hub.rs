//! crates/pulse_core/src/hub.rs
//!
//! The connection-facing entry point of the presence and messaging core.
//!
//! Every registry mutation goes through one `tokio::sync::Mutex`, so register
//! and disconnect events are applied atomically and in arrival order. Presence
//! transitions are queued while that lock is held, which keeps the order of
//! status writes identical to the order of transitions.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::{SessionId, UserId};
use crate::messages::MessageStore;
use crate::ports::{
    NotificationService, PortError, PortResult, ServerEvent, SessionTransport, UserProfileStore,
};
use crate::presence::{PresenceCoordinator, PresenceWriter};
use crate::reconcile::Reconciled;
use crate::registry::SessionRegistry;
use crate::router::{Delivery, DeliveryRouter, EchoPolicy};

/// Live presence snapshot for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceSnapshot {
    pub user_id: UserId,
    pub online: bool,
    pub sessions: usize,
}

#[derive(Clone)]
pub struct ChatHub {
    registry: Arc<Mutex<SessionRegistry>>,
    presence: PresenceCoordinator,
    router: DeliveryRouter,
    transport: Arc<dyn SessionTransport>,
}

/// Optional behaviour for `ChatHub::start`.
#[derive(Clone, Default)]
pub struct HubOptions {
    pub echo_policy: EchoPolicy,
    pub notifier: Option<Arc<dyn NotificationService>>,
}

impl ChatHub {
    /// Builds the hub and spawns its presence writer.
    ///
    /// The `Reconciled` report proves stale presence flags were reset before any
    /// session can register.
    pub fn start(
        _reconciled: Reconciled,
        messages: MessageStore,
        profiles: Arc<dyn UserProfileStore>,
        transport: Arc<dyn SessionTransport>,
        options: HubOptions,
    ) -> (Self, PresenceWriter) {
        let registry = Arc::new(Mutex::new(SessionRegistry::new()));
        let (presence, writer) = PresenceCoordinator::spawn(profiles);
        let mut router = DeliveryRouter::new(messages, registry.clone(), transport.clone())
            .with_echo_policy(options.echo_policy);
        if let Some(notifier) = options.notifier {
            router = router.with_notifier(notifier);
        }
        let hub = Self {
            registry,
            presence,
            router,
            transport,
        };
        (hub, writer)
    }

    pub fn messages(&self) -> &MessageStore {
        self.router.store()
    }

    /// Binds a connection to a user identity. Safe to repeat.
    pub async fn register(&self, session_id: SessionId, user_id: UserId) -> PortResult<()> {
        if user_id.is_blank() {
            return Err(PortError::Validation("userId must not be empty".to_string()));
        }
        let mut registry = self.registry.lock().await;
        if self.presence.is_closed() {
            return Err(PortError::Unexpected("server is shutting down".to_string()));
        }
        let registration = registry.add_session(&user_id, session_id);
        if let Some(previous) = &registration.previous_owner_left {
            info!(session_id = %session_id, user_id = %previous, "User went offline (session re-registered).");
            self.presence.on_last_session(previous);
        }
        if registration.first_session {
            info!(session_id = %session_id, user_id = %user_id, "User came online.");
            self.presence.on_first_session(&user_id);
        }
        Ok(())
    }

    /// Forgets a closed connection. Unknown sessions are ignored.
    pub async fn disconnect(&self, session_id: SessionId) {
        let mut registry = self.registry.lock().await;
        if let Some(user_id) = registry.remove_session(session_id) {
            info!(session_id = %session_id, user_id = %user_id, "User went offline.");
            self.presence.on_last_session(&user_id);
        }
    }

    /// Sends a direct message from the user registered on `origin`.
    ///
    /// A session that registered as someone other than `sender_id` is refused.
    pub async fn send_message(
        &self,
        origin: SessionId,
        sender_id: UserId,
        receiver_id: UserId,
        text: String,
    ) -> PortResult<Delivery> {
        let owner = self.registry.lock().await.owner_of(origin).cloned();
        if let Some(owner) = owner {
            if owner != sender_id {
                warn!(
                    session_id = %origin,
                    registered = %owner,
                    claimed = %sender_id,
                    "Rejected send with mismatched sender."
                );
                let err = PortError::Validation(
                    "senderId does not match the identity registered on this connection".to_string(),
                );
                let failed = ServerEvent::SendFailed {
                    reason: err.to_string(),
                };
                if let Err(push_err) = self.transport.push(origin, failed).await {
                    debug!(session_id = %origin, error = %push_err, "Could not report send failure.");
                }
                return Err(err);
            }
        }
        self.router
            .send_message(origin, sender_id, receiver_id, text)
            .await
    }

    /// Marks what `other` sent to `reader` as read and clears the matching
    /// inbox notifications in the background.
    pub async fn mark_read(&self, reader: &UserId, other: &UserId) -> PortResult<u64> {
        let updated = self.messages().mark_read(reader, other).await?;
        self.router.clear_notifications(reader, other);
        Ok(updated)
    }

    pub async fn presence_of(&self, user_id: &UserId) -> PresenceSnapshot {
        let registry = self.registry.lock().await;
        PresenceSnapshot {
            user_id: user_id.clone(),
            online: registry.is_online(user_id),
            sessions: registry.session_count(user_id),
        }
    }

    /// Takes every user still connected offline and closes the presence writer.
    /// Later registrations are refused. Returns how many users were taken offline.
    pub async fn shutdown(&self) -> usize {
        let mut registry = self.registry.lock().await;
        let users = registry.drain();
        for user_id in &users {
            self.presence.on_last_session(user_id);
        }
        self.presence.close();
        info!(users = users.len(), "Chat hub shut down.");
        users.len()
    }
}
