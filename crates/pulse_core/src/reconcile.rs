//! crates/pulse_core/src/reconcile.rs
//!
//! Startup repair of presence flags left behind by a previous process.
//!
//! The session registry always starts empty, so any profile still marked
//! online at boot is stale and gets reset to offline.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::PresenceStatus;
use crate::ports::{PortResult, UserProfileStore};

/// Proof that reconciliation ran. `ChatHub::start` requires one, and only
/// `StartupReconciler::run` can build it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    found: usize,
    reset: usize,
    failed: usize,
}

impl Reconciled {
    /// Profiles found marked online.
    pub fn found(&self) -> usize {
        self.found
    }

    /// Profiles successfully reset to offline.
    pub fn reset(&self) -> usize {
        self.reset
    }

    /// Profiles that could not be reset.
    pub fn failed(&self) -> usize {
        self.failed
    }
}

pub struct StartupReconciler {
    profiles: Arc<dyn UserProfileStore>,
}

impl StartupReconciler {
    pub fn new(profiles: Arc<dyn UserProfileStore>) -> Self {
        Self { profiles }
    }

    /// Resets every online profile to offline.
    ///
    /// One batched write is tried first. If it fails, each profile is written on
    /// its own so that a single bad record cannot block the rest. Only the
    /// initial lookup can fail the whole run.
    pub async fn run(self) -> PortResult<Reconciled> {
        let stale = self.profiles.find_by_status(PresenceStatus::Online).await?;
        let found = stale.len();
        if stale.is_empty() {
            info!("No stale online profiles to reset.");
            return Ok(Reconciled {
                found: 0,
                reset: 0,
                failed: 0,
            });
        }

        match self
            .profiles
            .set_status_batch(&stale, PresenceStatus::Offline)
            .await
        {
            Ok(()) => {
                info!("Reset {} users to offline on startup.", found);
                return Ok(Reconciled {
                    found,
                    reset: found,
                    failed: 0,
                });
            }
            Err(e) => warn!(error = %e, "Batched presence reset failed; retrying per user."),
        }

        let mut reset = 0;
        let mut failed = 0;
        for user_id in &stale {
            match self.profiles.set_status(user_id, PresenceStatus::Offline).await {
                Ok(()) => reset += 1,
                Err(e) => {
                    failed += 1;
                    error!(user_id = %user_id, error = %e, "Could not reset presence.");
                }
            }
        }
        info!(reset, failed, "Per-user presence reset finished.");
        Ok(Reconciled { found, reset, failed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;
    use crate::memory::InMemoryUserProfileStore;

    #[tokio::test]
    async fn resets_every_online_profile() {
        let store = Arc::new(InMemoryUserProfileStore::new());
        store.seed(&UserId::from("u1"), PresenceStatus::Online);
        store.seed(&UserId::from("u2"), PresenceStatus::Offline);
        store.seed(&UserId::from("u3"), PresenceStatus::Online);

        let report = StartupReconciler::new(store.clone()).run().await.unwrap();
        assert_eq!(report, Reconciled { found: 2, reset: 2, failed: 0 });
        for id in ["u1", "u2", "u3"] {
            assert_eq!(store.status_of(&UserId::from(id)), Some(PresenceStatus::Offline));
        }
    }

    #[tokio::test]
    async fn one_bad_record_does_not_abort_the_rest() {
        let store = Arc::new(InMemoryUserProfileStore::new());
        let bad = UserId::from("bad");
        store.seed(&UserId::from("u1"), PresenceStatus::Online);
        store.seed(&bad, PresenceStatus::Online);
        store.seed(&UserId::from("u3"), PresenceStatus::Online);
        store.fail_writes_for(&bad);

        let report = StartupReconciler::new(store.clone()).run().await.unwrap();
        assert_eq!(report, Reconciled { found: 3, reset: 2, failed: 1 });
        assert_eq!(store.status_of(&UserId::from("u1")), Some(PresenceStatus::Offline));
        assert_eq!(store.status_of(&UserId::from("u3")), Some(PresenceStatus::Offline));
        assert_eq!(store.status_of(&bad), Some(PresenceStatus::Online));
    }

    #[tokio::test]
    async fn nothing_to_do_when_everyone_is_offline() {
        let store = Arc::new(InMemoryUserProfileStore::new());
        store.seed(&UserId::from("u1"), PresenceStatus::Offline);
        let report = StartupReconciler::new(store).run().await.unwrap();
        assert_eq!(report.found(), 0);
    }
}
