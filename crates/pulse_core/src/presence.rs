//! crates/pulse_core/src/presence.rs
//!
//! Turns registry transitions into durable `status` writes on the user profile.
//!
//! Writes are queued to one background task and applied in the order the
//! transitions happened, so a quick connect/disconnect can never leave a user
//! marked online. Callers never wait on the write and never see its error.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::domain::{PresenceStatus, UserId};
use crate::ports::UserProfileStore;

#[derive(Debug)]
struct StatusWrite {
    user_id: UserId,
    status: PresenceStatus,
}

/// Handle used by the hub to report first/last session transitions.
#[derive(Clone)]
pub struct PresenceCoordinator {
    queue: mpsc::UnboundedSender<StatusWrite>,
    stop: CancellationToken,
}

/// Owns the background writer. After `PresenceCoordinator::close` (or once
/// every coordinator clone is dropped), awaiting `finish` drains whatever is
/// still queued.
pub struct PresenceWriter {
    handle: JoinHandle<()>,
}

impl PresenceCoordinator {
    /// Spawns the writer task on the current tokio runtime.
    pub fn spawn(store: Arc<dyn UserProfileStore>) -> (Self, PresenceWriter) {
        let (queue, rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let handle = tokio::spawn(write_loop(store, rx, stop.clone()));
        (Self { queue, stop }, PresenceWriter { handle })
    }

    /// Stops accepting transitions. Writes queued before this call are still applied.
    pub fn close(&self) {
        self.stop.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn on_first_session(&self, user_id: &UserId) {
        self.enqueue(user_id, PresenceStatus::Online);
    }

    pub fn on_last_session(&self, user_id: &UserId) {
        self.enqueue(user_id, PresenceStatus::Offline);
    }

    fn enqueue(&self, user_id: &UserId, status: PresenceStatus) {
        if self.is_closed() {
            warn!(user_id = %user_id, status = %status, "Presence writer is closed; status write dropped.");
            return;
        }
        let write = StatusWrite {
            user_id: user_id.clone(),
            status,
        };
        if let Err(e) = self.queue.send(write) {
            error!(
                user_id = %e.0.user_id,
                status = %e.0.status,
                "Presence writer has stopped; status write dropped."
            );
        }
    }
}

impl PresenceWriter {
    /// Waits until every queued write has been attempted. Returns once the
    /// coordinator was closed or all of its clones were dropped.
    pub async fn finish(self) {
        if let Err(e) = self.handle.await {
            error!("Presence writer task failed: {:?}", e);
        }
    }
}

async fn write_loop(
    store: Arc<dyn UserProfileStore>,
    mut rx: mpsc::UnboundedReceiver<StatusWrite>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            write = rx.recv() => match write {
                Some(write) => apply(store.as_ref(), write).await,
                None => break,
            },
            _ = stop.cancelled() => {
                while let Ok(write) = rx.try_recv() {
                    apply(store.as_ref(), write).await;
                }
                break;
            }
        }
    }
    debug!("Presence writer stopped.");
}

async fn apply(store: &dyn UserProfileStore, write: StatusWrite) {
    match store.set_status(&write.user_id, write.status).await {
        Ok(()) => debug!(user_id = %write.user_id, status = %write.status, "Presence updated."),
        Err(e) => error!(
            user_id = %write.user_id,
            status = %write.status,
            error = %e,
            "Failed to write presence status."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryUserProfileStore;

    #[tokio::test]
    async fn writes_apply_in_transition_order() {
        let store = Arc::new(InMemoryUserProfileStore::new());
        let (coordinator, writer) = PresenceCoordinator::spawn(store.clone());
        let alice = UserId::from("alice");

        coordinator.on_first_session(&alice);
        coordinator.on_last_session(&alice);
        coordinator.on_first_session(&alice);
        drop(coordinator);
        writer.finish().await;

        assert_eq!(
            store.writes_for(&alice),
            vec![PresenceStatus::Online, PresenceStatus::Offline, PresenceStatus::Online]
        );
        assert_eq!(store.status_of(&alice), Some(PresenceStatus::Online));
    }

    #[tokio::test]
    async fn failed_write_does_not_stop_later_writes() {
        let store = Arc::new(InMemoryUserProfileStore::new());
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");
        store.fail_writes_for(&alice);

        let (coordinator, writer) = PresenceCoordinator::spawn(store.clone());
        coordinator.on_first_session(&alice);
        coordinator.on_first_session(&bob);
        drop(coordinator);
        writer.finish().await;

        assert_eq!(store.status_of(&alice), None);
        assert_eq!(store.status_of(&bob), Some(PresenceStatus::Online));
    }

    #[tokio::test]
    async fn close_drains_queue_while_clones_are_still_alive() {
        let store = Arc::new(InMemoryUserProfileStore::new());
        let (coordinator, writer) = PresenceCoordinator::spawn(store.clone());
        let held_elsewhere = coordinator.clone();
        let alice = UserId::from("alice");

        coordinator.on_first_session(&alice);
        coordinator.on_last_session(&alice);
        coordinator.close();
        tokio::time::timeout(std::time::Duration::from_secs(1), writer.finish())
            .await
            .expect("writer did not stop after close");

        assert_eq!(
            store.writes_for(&alice),
            vec![PresenceStatus::Online, PresenceStatus::Offline]
        );
        held_elsewhere.on_first_session(&alice);
        assert!(held_elsewhere.is_closed());
        assert_eq!(store.writes_for(&alice).len(), 2);
    }
}
