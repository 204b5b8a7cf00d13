//! ChatRepository trait definition.
//!
//! The persistence port for chat sessions and messages. Implementations
//! live in hostdesk-infra (e.g., `SqliteChatRepository`). Uses native
//! async fn in traits (RPITIT, Rust 2024 edition).
//!
//! Two operations carry the transactional discipline the chat service
//! relies on: `claim_session` must be an atomic compare-and-set on
//! `assigned_admin_id` (NULL -> admin), and `end_session` must be a
//! conditional update guarded on an open status, so races between admins
//! or between an explicit end and the idle sweeper resolve to exactly one
//! winner at the storage layer.

use chrono::{DateTime, Utc};
use hostdesk_types::chat::{ChatMessage, ChatSession, SessionStatus};
use hostdesk_types::error::RepositoryError;
use uuid::Uuid;

/// Repository trait for chat session and message persistence.
pub trait ChatRepository: Send + Sync {
    /// Persist a new chat session.
    ///
    /// The storage layer enforces the single-open-session invariant with a
    /// partial unique index; a violation surfaces as
    /// [`RepositoryError::Conflict`].
    fn create_session(
        &self,
        session: &ChatSession,
    ) -> impl std::future::Future<Output = Result<ChatSession, RepositoryError>> + Send;

    /// Get a chat session by its unique ID.
    fn get_session(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ChatSession>, RepositoryError>> + Send;

    /// Get the user's open (waiting or active) session, if any.
    fn get_open_session_for_user(
        &self,
        user_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ChatSession>, RepositoryError>> + Send;

    /// Update an existing chat session record.
    fn update_session(
        &self,
        session: &ChatSession,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Advance `last_activity_at`. The column is monotonically
    /// non-decreasing; an older timestamp must not move it backwards.
    fn touch_activity(
        &self,
        session_id: &Uuid,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Atomic admin claim: set `assigned_admin_id` and flip the status to
    /// active, guarded on `assigned_admin_id IS NULL AND status =
    /// 'waiting'`. Returns `true` if this call won the claim.
    fn claim_session(
        &self,
        session_id: &Uuid,
        admin_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Terminal transition, guarded on an open status. Returns `true` if
    /// this call performed the transition, `false` if the session was
    /// already ended or does not exist.
    fn end_session(
        &self,
        session_id: &Uuid,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Persist a message. The session must exist and not be ended at
    /// write time (foreign key plus status guard).
    fn insert_message(
        &self,
        message: &ChatMessage,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get messages for a session in creation order.
    fn get_messages(
        &self,
        session_id: &Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// List sessions by status, oldest first (the admin queue view).
    fn list_sessions_by_status(
        &self,
        status: SessionStatus,
        limit: Option<i64>,
    ) -> impl std::future::Future<Output = Result<Vec<ChatSession>, RepositoryError>> + Send;
}
