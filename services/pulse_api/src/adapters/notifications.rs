//! services/pulse_api/src/adapters/notifications.rs
//!
//! Writes "new message" inbox notifications to the `notifications` table.
//! It implements the `NotificationService` port from the core crate.

use async_trait::async_trait;
use pulse_core::domain::{Notification, UserId, MESSAGE_NOTIFICATION_KIND};
use pulse_core::ports::{NotificationService, PortError, PortResult};
use sqlx::PgPool;

#[derive(Clone)]
pub struct DbNotificationAdapter {
    pool: PgPool,
}

impl DbNotificationAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationService for DbNotificationAdapter {
    async fn notify(&self, notification: Notification) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO notifications (id, user_id, kind, message, reference_id, read, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(notification.id)
        .bind(notification.user_id.as_str())
        .bind(&notification.kind)
        .bind(&notification.message)
        .bind(&notification.reference_id)
        .bind(notification.read)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;
        Ok(())
    }

    async fn clear_message_notifications(&self, user_id: &UserId, sender_id: &UserId) -> PortResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read = TRUE \
             WHERE user_id = $1 AND kind = $2 AND reference_id = $3 AND read = FALSE",
        )
        .bind(user_id.as_str())
        .bind(MESSAGE_NOTIFICATION_KIND)
        .bind(sender_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Persistence(e.to_string()))?;
        Ok(result.rows_affected())
    }
}
