//! crates/pulse_core/src/domain.rs
//!
//! Defines the pure, core data structures for presence and direct messaging.
//! These types are independent of any database or transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::ports::{PortError, PortResult};

/// Separator placed between the two sorted participant ids of a conversation.
pub const CONVERSATION_SEPARATOR: char = '_';

//=========================================================================================
// Identities
//=========================================================================================

/// An opaque, stable user account identifier supplied by the auth system.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifies one live transport connection. Assigned when the socket opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

//=========================================================================================
// Presence
//=========================================================================================

/// The durable online/offline flag stored on a user's profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(PresenceStatus::Online),
            "offline" => Ok(PresenceStatus::Offline),
            other => Err(PortError::Unexpected(format!(
                "unknown presence status '{}'",
                other
            ))),
        }
    }
}

//=========================================================================================
// Conversations and Messages
//=========================================================================================

/// Order-independent key grouping the direct messages between two users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Sorts the two ids lexicographically and joins them, so that
    /// `between(a, b) == between(b, a)`.
    pub fn between(a: &UserId, b: &UserId) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self(format!(
            "{}{}{}",
            first.as_str(),
            CONVERSATION_SEPARATOR,
            second.as_str()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuilds a key read back from storage. No validation is applied.
    pub fn from_stored(raw: String) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted direct message. Immutable apart from the `read` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: String,
    pub conversation_id: ConversationId,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// A send request that has passed validation but has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    sender_id: UserId,
    receiver_id: UserId,
    text: String,
}

impl NewMessage {
    /// Rejects blank participant ids and text that is empty after trimming.
    pub fn new(sender_id: UserId, receiver_id: UserId, text: impl Into<String>) -> PortResult<Self> {
        let text = text.into();
        if sender_id.is_blank() {
            return Err(PortError::Validation("senderId must not be empty".to_string()));
        }
        if receiver_id.is_blank() {
            return Err(PortError::Validation("receiverId must not be empty".to_string()));
        }
        if text.trim().is_empty() {
            return Err(PortError::Validation("message text must not be empty".to_string()));
        }
        Ok(Self {
            sender_id,
            receiver_id,
            text,
        })
    }

    pub fn sender_id(&self) -> &UserId {
        &self.sender_id
    }

    pub fn receiver_id(&self) -> &UserId {
        &self.receiver_id
    }

    /// Stamps the message with its id, conversation key and creation time.
    pub fn into_message(self, created_at: DateTime<Utc>) -> Message {
        let conversation_id = ConversationId::between(&self.sender_id, &self.receiver_id);
        Message {
            id: Uuid::new_v4(),
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            text: self.text,
            conversation_id,
            read: false,
            created_at,
        }
    }
}

//=========================================================================================
// Notifications
//=========================================================================================

/// Kind tag written on notifications raised by a new direct message.
pub const MESSAGE_NOTIFICATION_KIND: &str = "message";

/// A best-effort "you have a new message" record for the recipient's inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: UserId,
    pub kind: String,
    pub message: String,
    pub reference_id: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Builds the notification for a freshly stored message.
    /// Returns `None` when a user messages themselves.
    pub fn for_message(message: &Message) -> Option<Self> {
        if message.sender_id == message.receiver_id {
            return None;
        }
        Some(Self {
            id: Uuid::new_v4(),
            user_id: message.receiver_id.clone(),
            kind: MESSAGE_NOTIFICATION_KIND.to_string(),
            message: "sent you a message".to_string(),
            reference_id: message.sender_id.to_string(),
            read: false,
            created_at: message.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_id_is_symmetric() {
        let a = UserId::from("alice");
        let b = UserId::from("bob");
        assert_eq!(ConversationId::between(&a, &b), ConversationId::between(&b, &a));
        assert_eq!(ConversationId::between(&a, &b).as_str(), "alice_bob");
    }

    #[test]
    fn conversation_id_differs_per_pair() {
        let a = UserId::from("alice");
        let b = UserId::from("bob");
        let c = UserId::from("carol");
        assert_ne!(ConversationId::between(&a, &b), ConversationId::between(&a, &c));
    }

    #[test]
    fn conversation_id_sorts_by_byte_order() {
        // Uppercase sorts before lowercase.
        let lower = UserId::from("abc");
        let upper = UserId::from("XYZ");
        assert_eq!(ConversationId::between(&lower, &upper).as_str(), "XYZ_abc");
    }

    #[test]
    fn blank_text_is_rejected() {
        let err = NewMessage::new("a".into(), "b".into(), "   \n\t").unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[test]
    fn blank_receiver_is_rejected() {
        let err = NewMessage::new("a".into(), "".into(), "hi").unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[test]
    fn text_is_stored_untrimmed() {
        let msg = NewMessage::new("a".into(), "b".into(), "  hi ")
            .unwrap()
            .into_message(Utc::now());
        assert_eq!(msg.text, "  hi ");
        assert!(!msg.read);
    }

    #[test]
    fn message_serializes_camel_case() {
        let msg = NewMessage::new("A".into(), "B".into(), "hi")
            .unwrap()
            .into_message(Utc::now());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["senderId"], "A");
        assert_eq!(json["receiverId"], "B");
        assert_eq!(json["conversationId"], "A_B");
        assert_eq!(json["read"], false);
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn no_notification_for_self_message() {
        let msg = NewMessage::new("A".into(), "A".into(), "note to self")
            .unwrap()
            .into_message(Utc::now());
        assert!(Notification::for_message(&msg).is_none());
    }

    #[test]
    fn notification_references_sender() {
        let msg = NewMessage::new("A".into(), "B".into(), "hi")
            .unwrap()
            .into_message(Utc::now());
        let n = Notification::for_message(&msg).unwrap();
        assert_eq!(n.user_id, UserId::from("B"));
        assert_eq!(n.reference_id, "A");
        assert_eq!(n.kind, MESSAGE_NOTIFICATION_KIND);
    }

    #[test]
    fn presence_status_round_trips_through_str() {
        assert_eq!("online".parse::<PresenceStatus>().unwrap(), PresenceStatus::Online);
        assert_eq!(PresenceStatus::Offline.as_str(), "offline");
        assert!("away".parse::<PresenceStatus>().is_err());
    }
}
