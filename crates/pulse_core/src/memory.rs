//! crates/pulse_core/src/memory.rs
//!
//! In-process implementations of the core ports.
//!
//! Used by the test suites and by the API service when it runs without a
//! database. The profile store and message repository can be told to fail so
//! error paths can be exercised.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::{
    ConversationId, Message, Notification, PresenceStatus, SessionId, UserId, MESSAGE_NOTIFICATION_KIND,
};
use crate::ports::{
    MessageRepository, NotificationService, PortError, PortResult, ServerEvent, SessionTransport,
    UserProfileStore,
};

/// Locks a std mutex, recovering the data if a panicking thread poisoned it.
fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

//=========================================================================================
// Messages
//=========================================================================================

#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: Mutex<Vec<Message>>,
    fail_inserts: AtomicBool,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every insert fails with `PortError::Persistence`.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        guard(&self.messages).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<Message> {
        guard(&self.messages).clone()
    }
}

fn is_from_to(message: &Message, sender_id: &UserId, receiver_id: &UserId) -> bool {
    &message.sender_id == sender_id && &message.receiver_id == receiver_id
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert(&self, message: Message) -> PortResult<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(PortError::Persistence("message store unavailable".to_string()));
        }
        guard(&self.messages).push(message);
        Ok(())
    }

    async fn find_by_conversation(
        &self,
        conversation_id: &ConversationId,
        user_a: &UserId,
        user_b: &UserId,
    ) -> PortResult<Vec<Message>> {
        let mut found: Vec<Message> = guard(&self.messages)
            .iter()
            .filter(|m| {
                &m.conversation_id == conversation_id
                    && (is_from_to(m, user_a, user_b) || is_from_to(m, user_b, user_a))
            })
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        found.sort_by_key(|m| m.created_at);
        Ok(found)
    }

    async fn mark_read(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        receiver_id: &UserId,
    ) -> PortResult<u64> {
        let mut updated = 0;
        for m in guard(&self.messages).iter_mut() {
            if &m.conversation_id == conversation_id && is_from_to(m, sender_id, receiver_id) && !m.read {
                m.read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn count_unread(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        receiver_id: &UserId,
    ) -> PortResult<u64> {
        let count = guard(&self.messages)
            .iter()
            .filter(|m| {
                &m.conversation_id == conversation_id && is_from_to(m, sender_id, receiver_id) && !m.read
            })
            .count();
        Ok(count as u64)
    }
}

//=========================================================================================
// User Profiles
//=========================================================================================

#[derive(Default)]
pub struct InMemoryUserProfileStore {
    statuses: Mutex<HashMap<UserId, PresenceStatus>>,
    writes: Mutex<Vec<(UserId, PresenceStatus)>>,
    failing: Mutex<HashSet<UserId>>,
}

impl InMemoryUserProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a status directly, without recording it as a write.
    pub fn seed(&self, user_id: &UserId, status: PresenceStatus) {
        guard(&self.statuses).insert(user_id.clone(), status);
    }

    /// Makes every write touching this user fail, including batches that contain it.
    pub fn fail_writes_for(&self, user_id: &UserId) {
        guard(&self.failing).insert(user_id.clone());
    }

    pub fn status_of(&self, user_id: &UserId) -> Option<PresenceStatus> {
        guard(&self.statuses).get(user_id).copied()
    }

    /// Successful status writes for this user, in the order they were applied.
    pub fn writes_for(&self, user_id: &UserId) -> Vec<PresenceStatus> {
        guard(&self.writes)
            .iter()
            .filter(|(id, _)| id == user_id)
            .map(|(_, status)| *status)
            .collect()
    }

    pub fn write_count(&self) -> usize {
        guard(&self.writes).len()
    }

    fn check_writable(&self, user_id: &UserId) -> PortResult<()> {
        if guard(&self.failing).contains(user_id) {
            return Err(PortError::Persistence(format!("profile {} is not writable", user_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl UserProfileStore for InMemoryUserProfileStore {
    async fn set_status(&self, user_id: &UserId, status: PresenceStatus) -> PortResult<()> {
        self.check_writable(user_id)?;
        guard(&self.statuses).insert(user_id.clone(), status);
        guard(&self.writes).push((user_id.clone(), status));
        Ok(())
    }

    async fn find_by_status(&self, status: PresenceStatus) -> PortResult<Vec<UserId>> {
        let mut users: Vec<UserId> = guard(&self.statuses)
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(id, _)| id.clone())
            .collect();
        users.sort();
        Ok(users)
    }

    async fn set_status_batch(&self, user_ids: &[UserId], status: PresenceStatus) -> PortResult<()> {
        for user_id in user_ids {
            self.check_writable(user_id)?;
        }
        let mut statuses = guard(&self.statuses);
        let mut writes = guard(&self.writes);
        for user_id in user_ids {
            statuses.insert(user_id.clone(), status);
            writes.push((user_id.clone(), status));
        }
        Ok(())
    }
}

//=========================================================================================
// Transport and Notifications
//=========================================================================================

/// A transport that records every push. Sessions marked closed reject pushes.
#[derive(Default)]
pub struct RecordingTransport {
    pushed: Mutex<Vec<(SessionId, ServerEvent)>>,
    closed: Mutex<HashSet<SessionId>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self, session_id: SessionId) {
        guard(&self.closed).insert(session_id);
    }

    pub fn events_for(&self, session_id: SessionId) -> Vec<ServerEvent> {
        guard(&self.pushed)
            .iter()
            .filter(|(id, _)| *id == session_id)
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub fn all(&self) -> Vec<(SessionId, ServerEvent)> {
        guard(&self.pushed).clone()
    }

    pub fn received_count(&self) -> usize {
        guard(&self.pushed)
            .iter()
            .filter(|(_, e)| matches!(e, ServerEvent::ReceiveMessage(_)))
            .count()
    }

    pub fn sent_count(&self) -> usize {
        guard(&self.pushed)
            .iter()
            .filter(|(_, e)| matches!(e, ServerEvent::MessageSent(_)))
            .count()
    }
}

#[async_trait]
impl SessionTransport for RecordingTransport {
    async fn push(&self, session_id: SessionId, event: ServerEvent) -> PortResult<()> {
        if guard(&self.closed).contains(&session_id) {
            return Err(PortError::Delivery(format!("session {} is closed", session_id)));
        }
        guard(&self.pushed).push((session_id, event));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        guard(&self.sent).clone()
    }
}

#[async_trait]
impl NotificationService for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> PortResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PortError::Persistence("notification store unavailable".to_string()));
        }
        guard(&self.sent).push(notification);
        Ok(())
    }

    async fn clear_message_notifications(&self, user_id: &UserId, sender_id: &UserId) -> PortResult<u64> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PortError::Persistence("notification store unavailable".to_string()));
        }
        let mut cleared = 0;
        for n in guard(&self.sent).iter_mut() {
            if &n.user_id == user_id
                && n.kind == MESSAGE_NOTIFICATION_KIND
                && n.reference_id == sender_id.as_str()
                && !n.read
            {
                n.read = true;
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}
