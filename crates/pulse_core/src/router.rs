//! crates/pulse_core/src/router.rs
//!
//! Send-and-fan-out for a single direct message: persist, push to every live
//! session of the receiver, then echo back to the sender.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::domain::{Message, Notification, SessionId, UserId};
use crate::messages::MessageStore;
use crate::ports::{NotificationService, PortResult, ServerEvent, SessionTransport};
use crate::registry::SessionRegistry;

/// Which of the sender's sessions receive the `message_sent` echo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EchoPolicy {
    /// Only the session the message was sent from.
    #[default]
    OriginOnly,
    /// Every live session of the sender, so other tabs stay in sync.
    AllSenderSessions,
}

/// What happened during one fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message: Message,
    /// Successful `receive_message` pushes.
    pub delivered: usize,
    /// Successful `message_sent` echoes.
    pub echoed: usize,
    /// Pushes that failed and were dropped.
    pub failed: usize,
}

#[derive(Clone)]
pub struct DeliveryRouter {
    store: MessageStore,
    registry: Arc<Mutex<SessionRegistry>>,
    transport: Arc<dyn SessionTransport>,
    notifier: Option<Arc<dyn NotificationService>>,
    echo_policy: EchoPolicy,
}

impl DeliveryRouter {
    pub fn new(
        store: MessageStore,
        registry: Arc<Mutex<SessionRegistry>>,
        transport: Arc<dyn SessionTransport>,
    ) -> Self {
        Self {
            store,
            registry,
            transport,
            notifier: None,
            echo_policy: EchoPolicy::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationService>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_echo_policy(mut self, echo_policy: EchoPolicy) -> Self {
        self.echo_policy = echo_policy;
        self
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Persists the message and fans it out.
    ///
    /// If persisting fails nothing is pushed except a `SendFailed` to `origin`,
    /// and the error is returned. Individual push failures are logged and counted.
    pub async fn send_message(
        &self,
        origin: SessionId,
        sender_id: UserId,
        receiver_id: UserId,
        text: String,
    ) -> PortResult<Delivery> {
        let message = match self.store.append(sender_id, receiver_id, text).await {
            Ok(message) => message,
            Err(e) => {
                warn!(session_id = %origin, error = %e, "Message was not sent.");
                let failed = ServerEvent::SendFailed {
                    reason: e.to_string(),
                };
                if let Err(push_err) = self.transport.push(origin, failed).await {
                    debug!(session_id = %origin, error = %push_err, "Could not report send failure.");
                }
                return Err(e);
            }
        };

        let (receiver_sessions, echo_sessions) = {
            let registry = self.registry.lock().await;
            let receiver_sessions = registry.sessions_for(&message.receiver_id);
            let echo_sessions = match self.echo_policy {
                EchoPolicy::OriginOnly => HashSet::from([origin]),
                EchoPolicy::AllSenderSessions => {
                    let mut sessions = registry.sessions_for(&message.sender_id);
                    sessions.insert(origin);
                    sessions
                }
            };
            (receiver_sessions, echo_sessions)
        };

        let mut delivery = Delivery {
            message: message.clone(),
            delivered: 0,
            echoed: 0,
            failed: 0,
        };

        for session_id in receiver_sessions {
            match self
                .transport
                .push(session_id, ServerEvent::ReceiveMessage(message.clone()))
                .await
            {
                Ok(()) => delivery.delivered += 1,
                Err(e) => {
                    delivery.failed += 1;
                    warn!(session_id = %session_id, error = %e, "Dropped receive_message push.");
                }
            }
        }

        for session_id in echo_sessions {
            match self
                .transport
                .push(session_id, ServerEvent::MessageSent(message.clone()))
                .await
            {
                Ok(()) => delivery.echoed += 1,
                Err(e) => {
                    delivery.failed += 1;
                    warn!(session_id = %session_id, error = %e, "Dropped message_sent echo.");
                }
            }
        }

        self.dispatch_notification(&message);

        debug!(
            message_id = %message.id,
            delivered = delivery.delivered,
            echoed = delivery.echoed,
            failed = delivery.failed,
            "Message fanned out."
        );
        Ok(delivery)
    }

    /// Marks `reader`'s message notifications about `sender` read on their own task.
    pub fn clear_notifications(&self, reader: &UserId, sender: &UserId) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        let (reader, sender) = (reader.clone(), sender.clone());
        tokio::spawn(async move {
            match notifier.clear_message_notifications(&reader, &sender).await {
                Ok(cleared) => debug!(user_id = %reader, sender_id = %sender, cleared, "Message notifications cleared."),
                Err(e) => error!(user_id = %reader, error = %e, "Failed to clear message notifications."),
            }
        });
    }

    /// Fires the inbox notification on its own task; the send never waits for it.
    fn dispatch_notification(&self, message: &Message) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        let Some(notification) = Notification::for_message(message) else {
            return;
        };
        tokio::spawn(async move {
            let user_id = notification.user_id.clone();
            if let Err(e) = notifier.notify(notification).await {
                error!(user_id = %user_id, error = %e, "Failed to record message notification.");
            }
        });
    }
}
