//! services/pulse_api/src/adapters/db.rs
//!
//! This module contains the database adapters, the concrete implementations of the
//! `MessageRepository` and `UserProfileStore` ports from the core crate. They handle
//! all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse_core::domain::{ConversationId, Message, PresenceStatus, UserId};
use pulse_core::ports::{MessageRepository, PortError, PortResult, UserProfileStore};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the messaging and profile ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn persistence(e: sqlx::Error) -> PortError {
    PortError::Persistence(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct MessageRecord {
    id: Uuid,
    sender_id: String,
    receiver_id: String,
    text: String,
    read: bool,
    conversation_id: String,
    created_at: DateTime<Utc>,
}
impl MessageRecord {
    fn to_domain(self) -> Message {
        Message {
            id: self.id,
            sender_id: UserId::new(self.sender_id),
            receiver_id: UserId::new(self.receiver_id),
            text: self.text,
            conversation_id: ConversationId::from_stored(self.conversation_id),
            read: self.read,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct ProfileRecord {
    user_id: String,
}

//=========================================================================================
// `MessageRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl MessageRepository for DbAdapter {
    async fn insert(&self, message: Message) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO messages (id, sender_id, receiver_id, text, read, conversation_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(message.id)
        .bind(message.sender_id.as_str())
        .bind(message.receiver_id.as_str())
        .bind(&message.text)
        .bind(message.read)
        .bind(message.conversation_id.as_str())
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(())
    }

    async fn find_by_conversation(
        &self,
        conversation_id: &ConversationId,
        user_a: &UserId,
        user_b: &UserId,
    ) -> PortResult<Vec<Message>> {
        // The key alone is ambiguous when ids contain '_'; the pair check is not.
        // `seq` breaks ties between messages stored within the same instant.
        let records = sqlx::query_as::<_, MessageRecord>(
            "SELECT id, sender_id, receiver_id, text, read, conversation_id, created_at \
             FROM messages WHERE conversation_id = $1 \
             AND ((sender_id = $2 AND receiver_id = $3) OR (sender_id = $3 AND receiver_id = $2)) \
             ORDER BY created_at ASC, seq ASC",
        )
        .bind(conversation_id.as_str())
        .bind(user_a.as_str())
        .bind(user_b.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(persistence)?;

        let messages = records.into_iter().map(|r| r.to_domain()).collect();
        Ok(messages)
    }

    async fn mark_read(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        receiver_id: &UserId,
    ) -> PortResult<u64> {
        let result = sqlx::query(
            "UPDATE messages SET read = TRUE \
             WHERE conversation_id = $1 AND sender_id = $2 AND receiver_id = $3 AND read = FALSE",
        )
        .bind(conversation_id.as_str())
        .bind(sender_id.as_str())
        .bind(receiver_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(result.rows_affected())
    }

    async fn count_unread(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        receiver_id: &UserId,
    ) -> PortResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages \
             WHERE conversation_id = $1 AND sender_id = $2 AND receiver_id = $3 AND read = FALSE",
        )
        .bind(conversation_id.as_str())
        .bind(sender_id.as_str())
        .bind(receiver_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(count.max(0) as u64)
    }
}

//=========================================================================================
// `UserProfileStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl UserProfileStore for DbAdapter {
    async fn set_status(&self, user_id: &UserId, status: PresenceStatus) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO user_profiles (user_id, status, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (user_id) DO UPDATE SET status = EXCLUDED.status, updated_at = NOW()",
        )
        .bind(user_id.as_str())
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(())
    }

    async fn find_by_status(&self, status: PresenceStatus) -> PortResult<Vec<UserId>> {
        let records = sqlx::query_as::<_, ProfileRecord>(
            "SELECT user_id FROM user_profiles WHERE status = $1 ORDER BY user_id",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(records.into_iter().map(|r| UserId::new(r.user_id)).collect())
    }

    async fn set_status_batch(&self, user_ids: &[UserId], status: PresenceStatus) -> PortResult<()> {
        let ids: Vec<String> = user_ids.iter().map(|id| id.as_str().to_string()).collect();
        sqlx::query(
            "UPDATE user_profiles SET status = $1, updated_at = NOW() WHERE user_id = ANY($2)",
        )
        .bind(status.as_str())
        .bind(&ids)
        .execute(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(())
    }
}
