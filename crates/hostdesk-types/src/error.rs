use thiserror::Error;

use uuid::Uuid;

/// Errors produced by chat operations.
///
/// None of these are process-fatal: validation errors are returned to the
/// originating connection only, and a failed send or claim never touches
/// other sessions' state.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The user already has an open session; the client should resume it.
    #[error("user already has an open session")]
    SessionConflict { session_id: Uuid },

    /// Message or typing signal from a connection that is neither the
    /// owning customer nor the assigned admin.
    #[error("sender is not a participant of this session")]
    NotAParticipant,

    /// Claim race loser: another admin already owns the session.
    #[error("session is already assigned to an admin")]
    AlreadyAssigned,

    /// Operation on an ended or unknown session.
    #[error("session not found or already ended")]
    SessionNotFound,

    /// Message body failed validation.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Only admins can claim waiting sessions.
    #[error("operation requires the admin role")]
    AdminRequired,

    /// Persistence failure. The message is not considered sent; the client
    /// may retry.
    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),
}

impl ChatError {
    /// Machine-readable code for the wire-level error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::SessionConflict { .. } => "SESSION_CONFLICT",
            ChatError::NotAParticipant => "NOT_A_PARTICIPANT",
            ChatError::AlreadyAssigned => "ALREADY_ASSIGNED",
            ChatError::SessionNotFound => "SESSION_NOT_FOUND",
            ChatError::InvalidMessage(_) => "INVALID_MESSAGE",
            ChatError::AdminRequired => "ADMIN_REQUIRED",
            ChatError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

/// Errors from repository operations (used by trait definitions in hostdesk-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from the identity provider boundary.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid or expired token")]
    InvalidToken,

    #[error("storage error: {0}")]
    StorageError(String),
}
