//! Admin assignment policy.
//!
//! Decides which admin (if any) attaches to a waiting session. The policy
//! is pluggable; the baseline is manual claim, where an admin explicitly
//! claims a specific waiting session from the queue. The first claim wins
//! and every later claim loses with `AlreadyAssigned`.
//!
//! Winning is decided by the storage layer's compare-and-set, not an
//! in-memory lock, so the decision stays correct if the service is ever
//! scaled past a single process.

use std::sync::Arc;

use hostdesk_types::chat::{ChatSession, SessionStatus};
use hostdesk_types::error::ChatError;
use hostdesk_types::identity::Identity;
use tracing::info;

use crate::chat::repository::ChatRepository;

/// Decides whether an admin may attach to a waiting session.
pub trait AssignmentPolicy: Send + Sync {
    /// Attempt the assignment. `Ok(())` means the admin now owns the
    /// session; `Err(AlreadyAssigned)` means another admin won the race.
    fn try_assign(
        &self,
        session: &ChatSession,
        admin: &Identity,
    ) -> impl std::future::Future<Output = Result<(), ChatError>> + Send;
}

/// Baseline policy: manual claim with first-writer-wins semantics.
pub struct ManualClaimPolicy<R: ChatRepository> {
    repo: Arc<R>,
}

impl<R: ChatRepository> ManualClaimPolicy<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

impl<R: ChatRepository> AssignmentPolicy for ManualClaimPolicy<R> {
    async fn try_assign(&self, session: &ChatSession, admin: &Identity) -> Result<(), ChatError> {
        if !admin.is_admin() {
            return Err(ChatError::AdminRequired);
        }
        match session.status {
            SessionStatus::Waiting => {}
            SessionStatus::Active => return Err(ChatError::AlreadyAssigned),
            SessionStatus::Ended => return Err(ChatError::SessionNotFound),
        }

        let won = self.repo.claim_session(&session.id, &admin.user_id).await?;
        if !won {
            return Err(ChatError::AlreadyAssigned);
        }

        info!(session_id = %session.id, admin_id = %admin.user_id, "admin claimed session");
        Ok(())
    }
}
