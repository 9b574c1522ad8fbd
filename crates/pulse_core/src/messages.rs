//! crates/pulse_core/src/messages.rs
//!
//! Durable storage and retrieval of direct messages.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use tracing::debug;

use crate::domain::{ConversationId, Message, NewMessage, UserId};
use crate::ports::{MessageRepository, PortResult};

#[derive(Clone)]
pub struct MessageStore {
    repo: Arc<dyn MessageRepository>,
}

impl MessageStore {
    pub fn new(repo: Arc<dyn MessageRepository>) -> Self {
        Self { repo }
    }

    /// Validates and persists a new message, returning the stored record.
    pub async fn append(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        text: impl Into<String>,
    ) -> PortResult<Message> {
        // Storage keeps microseconds; the pushed copy must match what history returns.
        let created_at = Utc::now().trunc_subsecs(6);
        let message = NewMessage::new(sender_id, receiver_id, text)?.into_message(created_at);
        self.repo.insert(message.clone()).await?;
        debug!(
            message_id = %message.id,
            conversation_id = %message.conversation_id,
            "Message stored."
        );
        Ok(message)
    }

    /// The full conversation between the two users, oldest first.
    pub async fn history(&self, user_a: &UserId, user_b: &UserId) -> PortResult<Vec<Message>> {
        let conversation_id = ConversationId::between(user_a, user_b);
        self.repo
            .find_by_conversation(&conversation_id, user_a, user_b)
            .await
    }

    /// Marks everything `other` sent to `reader` in their conversation as read.
    /// Returns the number of messages that changed; a repeat call returns 0.
    pub async fn mark_read(&self, reader: &UserId, other: &UserId) -> PortResult<u64> {
        let conversation_id = ConversationId::between(reader, other);
        self.repo.mark_read(&conversation_id, other, reader).await
    }

    /// How many messages from `other` that `reader` has not read yet.
    pub async fn unread_count(&self, reader: &UserId, other: &UserId) -> PortResult<u64> {
        let conversation_id = ConversationId::between(reader, other);
        self.repo.count_unread(&conversation_id, other, reader).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryMessageRepository;
    use crate::ports::PortError;

    fn store() -> (MessageStore, Arc<InMemoryMessageRepository>) {
        let repo = Arc::new(InMemoryMessageRepository::new());
        (MessageStore::new(repo.clone()), repo)
    }

    #[tokio::test]
    async fn append_assigns_conversation_and_unread() {
        let (store, repo) = store();
        let msg = store.append("bob".into(), "alice".into(), "hi").await.unwrap();
        assert_eq!(msg.conversation_id.as_str(), "alice_bob");
        assert!(!msg.read);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn empty_text_is_not_persisted() {
        let (store, repo) = store();
        let err = store.append("a".into(), "b".into(), "  ").await.unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
        assert_eq!(repo.len(), 0);
    }

    #[tokio::test]
    async fn history_is_oldest_first_and_symmetric() {
        let (store, _) = store();
        let a = UserId::from("a");
        let b = UserId::from("b");
        store.append(a.clone(), b.clone(), "one").await.unwrap();
        store.append(b.clone(), a.clone(), "two").await.unwrap();
        store.append(a.clone(), b.clone(), "three").await.unwrap();
        store.append(a.clone(), "c".into(), "elsewhere").await.unwrap();

        let texts: Vec<_> = store
            .history(&b, &a)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn mark_read_only_touches_other_party_and_is_idempotent() {
        let (store, _) = store();
        let a = UserId::from("a");
        let b = UserId::from("b");
        store.append(b.clone(), a.clone(), "from b 1").await.unwrap();
        store.append(b.clone(), a.clone(), "from b 2").await.unwrap();
        store.append(a.clone(), b.clone(), "from a").await.unwrap();

        assert_eq!(store.unread_count(&a, &b).await.unwrap(), 2);
        assert_eq!(store.mark_read(&a, &b).await.unwrap(), 2);
        assert_eq!(store.mark_read(&a, &b).await.unwrap(), 0);
        assert_eq!(store.unread_count(&a, &b).await.unwrap(), 0);

        // a's own message to b stays unread until b reads it.
        assert_eq!(store.unread_count(&b, &a).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ids_sharing_a_conversation_key_do_not_see_each_other() {
        let (store, _) = store();
        let a = UserId::from("a");
        let a_b = UserId::from("a_b");
        let b_c = UserId::from("b_c");
        let c = UserId::from("c");
        store.append(a_b.clone(), c.clone(), "private to a_b and c").await.unwrap();
        store.append(a.clone(), b_c.clone(), "for b_c").await.unwrap();
        assert_eq!(
            ConversationId::between(&a_b, &c),
            ConversationId::between(&a, &b_c)
        );

        let texts: Vec<_> = store
            .history(&a, &b_c)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["for b_c"]);

        assert_eq!(store.unread_count(&b_c, &a).await.unwrap(), 1);
        assert_eq!(store.unread_count(&c, &a_b).await.unwrap(), 1);
        assert_eq!(store.mark_read(&b_c, &a).await.unwrap(), 1);
        assert_eq!(store.unread_count(&c, &a_b).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stored_timestamp_has_microsecond_precision() {
        let (store, repo) = store();
        let msg = store.append("a".into(), "b".into(), "hi").await.unwrap();
        assert_eq!(msg.created_at.timestamp_subsec_nanos() % 1_000, 0);
        assert_eq!(repo.all()[0].created_at, msg.created_at);
    }

    #[tokio::test]
    async fn append_surfaces_persistence_failure() {
        let (store, repo) = store();
        repo.fail_inserts(true);
        let err = store.append("a".into(), "b".into(), "hi").await.unwrap_err();
        assert!(matches!(err, PortError::Persistence(_)));
    }
}
