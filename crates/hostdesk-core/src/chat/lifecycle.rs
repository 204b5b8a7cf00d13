//! Session lifecycle manager.
//!
//! The authoritative state machine for support sessions:
//!
//! ```text
//! none -> waiting -> active -> ended
//!              \______________/
//! ```
//!
//! Session-creation decisions are serialized per user through a per-user
//! critical section, so two racing `start_session` calls resolve
//! deterministically: one wins, the other gets `SessionConflict`. The
//! terminal transitions (explicit end, idle timeout) are guarded both here
//! and by the storage layer's conditional update, so exactly one caller
//! performs each transition.
//!
//! The per-session critical section handed out by [`session_lock`] is
//! shared with the message router; holding it across the end transition
//! guarantees no `message` event is broadcast after `session_ended`.
//!
//! [`session_lock`]: SessionLifecycleManager::session_lock

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use hostdesk_types::chat::{ChatSession, Priority, SessionStatus};
use hostdesk_types::config::ChatConfig;
use hostdesk_types::error::{ChatError, RepositoryError};
use hostdesk_types::event::ServerEvent;
use hostdesk_types::identity::Identity;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chat::assign::AssignmentPolicy;
use crate::chat::registry::{ConnectionHandle, ConnectionRegistry};
use crate::chat::repository::ChatRepository;
use crate::chat::typing::TypingTracker;
use crate::event::EventBus;

/// The single place that encodes which status transitions are legal.
pub fn can_transition(from: SessionStatus, to: SessionStatus) -> bool {
    use SessionStatus::*;
    matches!((from, to), (Waiting, Active) | (Waiting, Ended) | (Active, Ended))
}

/// Governs session creation, admin assignment, and termination.
///
/// Generic over the repository and assignment policy so the core never
/// depends on hostdesk-infra.
pub struct SessionLifecycleManager<R: ChatRepository, P: AssignmentPolicy> {
    repo: Arc<R>,
    policy: P,
    registry: Arc<ConnectionRegistry>,
    typing: Arc<TypingTracker>,
    bus: EventBus,
    config: ChatConfig,
    user_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    session_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl<R: ChatRepository, P: AssignmentPolicy> SessionLifecycleManager<R, P> {
    pub fn new(
        repo: Arc<R>,
        policy: P,
        registry: Arc<ConnectionRegistry>,
        typing: Arc<TypingTracker>,
        bus: EventBus,
        config: ChatConfig,
    ) -> Self {
        Self {
            repo,
            policy,
            registry,
            typing,
            bus,
            config,
            user_locks: DashMap::new(),
            session_locks: DashMap::new(),
        }
    }

    /// The critical section serializing mutations for one session.
    ///
    /// The message router holds this lock across persist-and-broadcast;
    /// the end paths hold it across the terminal transition.
    pub fn session_lock(&self, session_id: &Uuid) -> Arc<Mutex<()>> {
        self.session_locks
            .entry(*session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn user_lock(&self, user_id: &Uuid) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(*user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// `none -> waiting`: create a session for a user with no open one.
    ///
    /// `connection_id` is attached when the call arrives over the chat
    /// transport; REST fallback callers pass `None`. Fails with
    /// [`ChatError::SessionConflict`] when an open session exists -- the
    /// correct client behavior is then to resume, not start.
    pub async fn start_session(
        &self,
        identity: &Identity,
        connection_id: Option<&Uuid>,
        subject: Option<String>,
        department: String,
    ) -> Result<ChatSession, ChatError> {
        let lock = self.user_lock(&identity.user_id);
        let _guard = lock.lock().await;

        if let Some(existing) = self
            .repo
            .get_open_session_for_user(&identity.user_id)
            .await?
        {
            return Err(ChatError::SessionConflict {
                session_id: existing.id,
            });
        }

        let now = Utc::now();
        let session = ChatSession {
            id: Uuid::now_v7(),
            user_id: identity.user_id,
            assigned_admin_id: None,
            status: SessionStatus::Waiting,
            priority: Priority::Normal,
            department,
            subject,
            started_at: now,
            last_activity_at: now,
            ended_at: None,
        };

        let session = match self.repo.create_session(&session).await {
            Ok(session) => session,
            // Storage backstop: the partial unique index caught a racing
            // create that slipped past the in-process critical section
            // (e.g., another server process).
            Err(RepositoryError::Conflict(_)) => {
                let existing = self
                    .repo
                    .get_open_session_for_user(&identity.user_id)
                    .await?
                    .ok_or(ChatError::SessionNotFound)?;
                return Err(ChatError::SessionConflict {
                    session_id: existing.id,
                });
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(connection_id) = connection_id {
            self.registry.attach_session(connection_id, session.id);
        }
        for conn in self.registry.lookup_by_user(&identity.user_id) {
            conn.send(ServerEvent::SessionStarted(session.clone()));
        }
        self.bus.publish(ServerEvent::SessionUpdate {
            session_id: session.id,
            status: SessionStatus::Waiting,
        });

        info!(session_id = %session.id, user_id = %identity.user_id, department = %session.department, "session started");
        Ok(session)
    }

    /// Reconnect path: re-attach a connection to the user's open session
    /// without changing state.
    ///
    /// Idempotent -- a duplicate resume from a second tab yields the same
    /// session id. History is supplied via the REST read path, not here.
    pub async fn resume_session(&self, conn: &ConnectionHandle) -> Result<ChatSession, ChatError> {
        let session = self
            .repo
            .get_open_session_for_user(&conn.identity.user_id)
            .await?
            .ok_or(ChatError::SessionNotFound)?;

        self.registry.attach_session(&conn.id, session.id);
        conn.send(ServerEvent::SessionResumed(session.clone()));

        info!(session_id = %session.id, connection_id = %conn.id, "session resumed");
        Ok(session)
    }

    /// `waiting -> active`: an admin claims a waiting session.
    ///
    /// Emits `admin_joined` to the owning user's connections, then
    /// `session_update` to every connection following the session, in that
    /// order -- so the user sees the hand-off before the status flip.
    pub async fn claim_session(
        &self,
        identity: &Identity,
        connection_id: Option<&Uuid>,
        session_id: &Uuid,
    ) -> Result<ChatSession, ChatError> {
        let session = self
            .repo
            .get_session(session_id)
            .await?
            .ok_or(ChatError::SessionNotFound)?;

        self.policy.try_assign(&session, identity).await?;

        // Re-read so the broadcast carries the assigned admin and status.
        let session = self
            .repo
            .get_session(session_id)
            .await?
            .ok_or(ChatError::SessionNotFound)?;

        if let Some(connection_id) = connection_id {
            self.registry.attach_session(connection_id, session.id);
        }

        for conn in self.registry.lookup_by_user(&session.user_id) {
            conn.send(ServerEvent::AdminJoined {});
        }
        for conn in self.registry.lookup_by_session(session_id) {
            conn.send(ServerEvent::SessionUpdate {
                session_id: session.id,
                status: session.status,
            });
        }
        self.bus.publish(ServerEvent::SessionUpdate {
            session_id: session.id,
            status: session.status,
        });

        Ok(session)
    }

    /// `waiting|active -> ended`: explicit end by either participant.
    ///
    /// Terminal; the session id is never reused. A later `start_session`
    /// creates a new record.
    pub async fn end_session(
        &self,
        identity: &Identity,
        session_id: &Uuid,
    ) -> Result<(), ChatError> {
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let session = self
            .repo
            .get_session(session_id)
            .await?
            .ok_or(ChatError::SessionNotFound)?;

        if !session.is_participant(&identity.user_id) {
            return Err(ChatError::NotAParticipant);
        }
        if !can_transition(session.status, SessionStatus::Ended) {
            return Err(ChatError::SessionNotFound);
        }

        let ended = self.repo.end_session(session_id, Utc::now()).await?;
        if !ended {
            // Lost the race to the sweeper or the other participant.
            return Err(ChatError::SessionNotFound);
        }

        info!(session_id = %session_id, by = %identity.user_id, "session ended");
        self.finish_session(session_id);
        Ok(())
    }

    /// Close sessions that went quiet: past the idle timeout, or past the
    /// (shorter) disconnect grace window when every participant has
    /// dropped off. Returns how many sessions were closed.
    pub async fn sweep_idle(&self) -> Result<usize, ChatError> {
        let now = Utc::now();
        let idle_cutoff = now
            - chrono::Duration::from_std(self.config.idle_timeout())
                .unwrap_or_else(|_| chrono::Duration::seconds(1800));
        let grace_cutoff = now
            - chrono::Duration::from_std(self.config.disconnect_grace())
                .unwrap_or_else(|_| chrono::Duration::seconds(120));

        let mut open = Vec::new();
        open.extend(
            self.repo
                .list_sessions_by_status(SessionStatus::Waiting, None)
                .await?,
        );
        open.extend(
            self.repo
                .list_sessions_by_status(SessionStatus::Active, None)
                .await?,
        );

        let mut closed = 0;
        for session in open {
            let abandoned = !self.any_participant_connected(&session);
            let cutoff = if abandoned { grace_cutoff } else { idle_cutoff };
            if session.last_activity_at >= cutoff {
                continue;
            }

            let lock = self.session_lock(&session.id);
            let _guard = lock.lock().await;
            // The conditional update loses gracefully if a message or an
            // explicit end slipped in while we were scanning.
            if self.repo.end_session(&session.id, now).await? {
                warn!(session_id = %session.id, abandoned, "session closed by idle sweeper");
                self.finish_session(&session.id);
                closed += 1;
            }
        }
        Ok(closed)
    }

    /// Post-transition cleanup and fan-out shared by every end path.
    fn finish_session(&self, session_id: &Uuid) {
        for conn in self.registry.lookup_by_session(session_id) {
            conn.send(ServerEvent::SessionEnded {});
        }
        self.registry.detach_session(session_id);
        self.typing.clear_session(session_id);
        self.bus.publish(ServerEvent::SessionUpdate {
            session_id: *session_id,
            status: SessionStatus::Ended,
        });
        self.session_locks.remove(session_id);
    }

    fn any_participant_connected(&self, session: &ChatSession) -> bool {
        if self.registry.user_is_connected(&session.user_id) {
            return true;
        }
        session
            .assigned_admin_id
            .map(|admin_id| self.registry.user_is_connected(&admin_id))
            .unwrap_or(false)
    }

    pub fn repo(&self) -> &Arc<R> {
        &self.repo
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::assign::ManualClaimPolicy;
    use crate::chat::testing::InMemoryChatRepository;
    use hostdesk_types::identity::Role;
    use std::time::Duration;

    type Manager =
        SessionLifecycleManager<InMemoryChatRepository, ManualClaimPolicy<InMemoryChatRepository>>;

    fn manager() -> (Arc<Manager>, Arc<ConnectionRegistry>) {
        manager_with_config(ChatConfig::default())
    }

    fn manager_with_config(config: ChatConfig) -> (Arc<Manager>, Arc<ConnectionRegistry>) {
        let repo = Arc::new(InMemoryChatRepository::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let typing = Arc::new(TypingTracker::new(config.typing_ceiling()));
        let bus = EventBus::new(config.event_capacity);
        let manager = Arc::new(SessionLifecycleManager::new(
            repo.clone(),
            ManualClaimPolicy::new(repo),
            registry.clone(),
            typing,
            bus,
            config,
        ));
        (manager, registry)
    }

    fn customer() -> Identity {
        Identity {
            user_id: Uuid::now_v7(),
            role: Role::Customer,
            display_name: "Customer".to_string(),
        }
    }

    fn admin() -> Identity {
        Identity {
            user_id: Uuid::now_v7(),
            role: Role::Admin,
            display_name: "Admin".to_string(),
        }
    }

    #[test]
    fn transition_table() {
        use SessionStatus::*;
        assert!(can_transition(Waiting, Active));
        assert!(can_transition(Waiting, Ended));
        assert!(can_transition(Active, Ended));

        assert!(!can_transition(Active, Waiting));
        assert!(!can_transition(Ended, Active));
        assert!(!can_transition(Ended, Waiting));
        assert!(!can_transition(Ended, Ended));
        assert!(!can_transition(Waiting, Waiting));
        assert!(!can_transition(Active, Active));
    }

    #[tokio::test]
    async fn start_session_creates_waiting() {
        let (manager, _registry) = manager();
        let identity = customer();

        let session = manager
            .start_session(&identity, None, None, "general".to_string())
            .await
            .unwrap();

        assert_eq!(session.status, SessionStatus::Waiting);
        assert_eq!(session.user_id, identity.user_id);
        assert!(session.assigned_admin_id.is_none());
    }

    #[tokio::test]
    async fn second_start_is_a_conflict() {
        let (manager, _registry) = manager();
        let identity = customer();

        let first = manager
            .start_session(&identity, None, None, "general".to_string())
            .await
            .unwrap();

        let err = manager
            .start_session(&identity, None, None, "general".to_string())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChatError::SessionConflict { session_id } if session_id == first.id
        ));
    }

    #[tokio::test]
    async fn concurrent_starts_yield_exactly_one_session() {
        let (manager, _registry) = manager();
        let identity = customer();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            let identity = identity.clone();
            handles.push(tokio::spawn(async move {
                manager
                    .start_session(&identity, None, None, "general".to_string())
                    .await
            }));
        }

        let mut created = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(ChatError::SessionConflict { .. }) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(conflicts, 7);
    }

    #[tokio::test]
    async fn resume_is_idempotent_and_preserves_state() {
        let (manager, registry) = manager();
        let identity = customer();
        let (conn1, mut rx1) = registry.register(identity.clone());
        let (conn2, _rx2) = registry.register(identity.clone());

        let session = manager
            .start_session(&identity, Some(&conn1.id), None, "general".to_string())
            .await
            .unwrap();
        // Drain the session_started both tabs received
        let _ = rx1.try_recv();

        let resumed = manager.resume_session(&conn2).await.unwrap();
        assert_eq!(resumed.id, session.id);
        assert_eq!(resumed.status, SessionStatus::Waiting);

        let again = manager.resume_session(&conn2).await.unwrap();
        assert_eq!(again.id, session.id);
        assert_eq!(registry.lookup_by_session(&session.id).len(), 2);
    }

    #[tokio::test]
    async fn resume_without_open_session_fails() {
        let (manager, registry) = manager();
        let (conn, _rx) = registry.register(customer());

        let err = manager.resume_session(&conn).await.unwrap_err();
        assert!(matches!(err, ChatError::SessionNotFound));
    }

    #[tokio::test]
    async fn claim_emits_admin_joined_then_session_update() {
        let (manager, registry) = manager();
        let identity = customer();
        let (conn, mut rx) = registry.register(identity.clone());

        let session = manager
            .start_session(&identity, Some(&conn.id), None, "general".to_string())
            .await
            .unwrap();
        let _ = rx.try_recv(); // session_started

        let admin_identity = admin();
        let (admin_conn, _admin_rx) = registry.register(admin_identity.clone());
        let claimed = manager
            .claim_session(&admin_identity, Some(&admin_conn.id), &session.id)
            .await
            .unwrap();
        assert_eq!(claimed.status, SessionStatus::Active);
        assert_eq!(claimed.assigned_admin_id, Some(admin_identity.user_id));

        let first = rx.try_recv().unwrap();
        assert!(matches!(first, ServerEvent::AdminJoined {}));
        let second = rx.try_recv().unwrap();
        assert!(matches!(
            second,
            ServerEvent::SessionUpdate { status: SessionStatus::Active, .. }
        ));
    }

    #[tokio::test]
    async fn end_by_admin_notifies_all_participants() {
        let (manager, registry) = manager();
        let identity = customer();
        let (conn, mut rx) = registry.register(identity.clone());

        let session = manager
            .start_session(&identity, Some(&conn.id), None, "general".to_string())
            .await
            .unwrap();
        let _ = rx.try_recv();

        let admin_identity = admin();
        let (admin_conn, mut admin_rx) = registry.register(admin_identity.clone());
        manager
            .claim_session(&admin_identity, Some(&admin_conn.id), &session.id)
            .await
            .unwrap();
        while admin_rx.try_recv().is_ok() {}
        while rx.try_recv().is_ok() {}

        manager
            .end_session(&admin_identity, &session.id)
            .await
            .unwrap();

        assert!(matches!(rx.try_recv().unwrap(), ServerEvent::SessionEnded {}));
        assert!(matches!(
            admin_rx.try_recv().unwrap(),
            ServerEvent::SessionEnded {}
        ));
        assert!(registry.lookup_by_session(&session.id).is_empty());
    }

    #[tokio::test]
    async fn end_by_stranger_is_rejected() {
        let (manager, _registry) = manager();
        let identity = customer();
        let session = manager
            .start_session(&identity, None, None, "general".to_string())
            .await
            .unwrap();

        let err = manager
            .end_session(&customer(), &session.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NotAParticipant));
    }

    #[tokio::test]
    async fn double_end_reports_session_not_found() {
        let (manager, _registry) = manager();
        let identity = customer();
        let session = manager
            .start_session(&identity, None, None, "general".to_string())
            .await
            .unwrap();

        manager.end_session(&identity, &session.id).await.unwrap();
        let err = manager
            .end_session(&identity, &session.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::SessionNotFound));
    }

    #[tokio::test]
    async fn ending_allows_a_fresh_start() {
        let (manager, _registry) = manager();
        let identity = customer();
        let first = manager
            .start_session(&identity, None, None, "general".to_string())
            .await
            .unwrap();
        manager.end_session(&identity, &first.id).await.unwrap();

        let second = manager
            .start_session(&identity, None, None, "billing".to_string())
            .await
            .unwrap();
        assert_ne!(second.id, first.id);
    }

    #[tokio::test]
    async fn sweep_closes_abandoned_sessions_after_grace() {
        let config = ChatConfig {
            disconnect_grace_secs: 0,
            ..ChatConfig::default()
        };
        let (manager, _registry) = manager_with_config(config);
        let identity = customer();

        // No connection registered for the user: abandoned immediately.
        let session = manager
            .start_session(&identity, None, None, "general".to_string())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        let closed = manager.sweep_idle().await.unwrap();
        assert_eq!(closed, 1);

        let stored = manager.repo().get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Ended);
    }

    #[tokio::test]
    async fn sweep_spares_connected_sessions_within_idle_timeout() {
        let config = ChatConfig {
            disconnect_grace_secs: 0,
            idle_timeout_secs: 3600,
            ..ChatConfig::default()
        };
        let (manager, registry) = manager_with_config(config);
        let identity = customer();
        let (conn, _rx) = registry.register(identity.clone());

        manager
            .start_session(&identity, Some(&conn.id), None, "general".to_string())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        let closed = manager.sweep_idle().await.unwrap();
        assert_eq!(closed, 0);
    }
}
