//! crates/pulse_core/src/ports.rs
//!
//! Defines the service contracts (traits) the presence and messaging core depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to stay independent of the concrete database, profile store and socket layer.

use async_trait::async_trait;
use crate::domain::{ConversationId, Message, Notification, PresenceStatus, SessionId, UserId};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (database, sockets).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// The request was rejected before anything was persisted.
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The backing store could not complete a read or write.
    #[error("Persistence failure: {0}")]
    Persistence(String),
    /// A push to one live session failed (usually because it already closed).
    #[error("Delivery failure: {0}")]
    Delivery(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Outbound Events
//=========================================================================================

/// Events the core pushes to individual sessions through a `SessionTransport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A new message for the receiving user.
    ReceiveMessage(Message),
    /// Confirmation to the sender that their message was stored.
    MessageSent(Message),
    /// The send was rejected or could not be stored.
    SendFailed { reason: String },
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: Message) -> PortResult<()>;

    /// Messages of the conversation exchanged between `user_a` and `user_b`, oldest first.
    ///
    /// Ids may contain the key separator, so two different pairs can share a
    /// conversation key. Implementations must also match on the participants.
    async fn find_by_conversation(
        &self,
        conversation_id: &ConversationId,
        user_a: &UserId,
        user_b: &UserId,
    ) -> PortResult<Vec<Message>>;

    /// Flips `read` on every unread message `sender_id` sent to `receiver_id`.
    /// Returns how many rows changed.
    async fn mark_read(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        receiver_id: &UserId,
    ) -> PortResult<u64>;

    async fn count_unread(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        receiver_id: &UserId,
    ) -> PortResult<u64>;
}

/// The shared user-profile store. This core only ever writes the `status` field.
#[async_trait]
pub trait UserProfileStore: Send + Sync {
    async fn set_status(&self, user_id: &UserId, status: PresenceStatus) -> PortResult<()>;

    async fn find_by_status(&self, status: PresenceStatus) -> PortResult<Vec<UserId>>;

    /// Writes the same status to every listed user in one batch. All-or-nothing.
    async fn set_status_batch(&self, user_ids: &[UserId], status: PresenceStatus) -> PortResult<()>;
}

/// Pushes events to a single live connection.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn push(&self, session_id: SessionId, event: ServerEvent) -> PortResult<()>;
}

/// Best-effort inbox notifications. Failures never affect message delivery.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn notify(&self, notification: Notification) -> PortResult<()>;

    /// Marks `user_id`'s unread message notifications about `sender_id` as read.
    /// Returns how many changed.
    async fn clear_message_notifications(&self, user_id: &UserId, sender_id: &UserId) -> PortResult<u64>;
}
