//! SQLite chat repository implementation.
//!
//! Implements `ChatRepository` from `hostdesk-core` using sqlx with split
//! read/write pools: raw queries, private Row structs, reader for SELECTs,
//! writer for mutations.
//!
//! The storage layer carries the transactional discipline the chat service
//! depends on: the partial unique index on open sessions backs the
//! one-open-session-per-user invariant, and the claim/end operations are
//! conditional updates so concurrent callers resolve to one winner.

use chrono::{DateTime, SecondsFormat, Utc};
use hostdesk_core::chat::repository::ChatRepository;
use hostdesk_types::chat::{ChatMessage, ChatSession, Priority, SessionStatus};
use hostdesk_types::error::RepositoryError;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ChatRepository`.
pub struct SqliteChatRepository {
    pool: DatabasePool,
}

impl SqliteChatRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

/// Internal row type for mapping SQLite rows to domain ChatSession.
struct ChatSessionRow {
    id: String,
    user_id: String,
    assigned_admin_id: Option<String>,
    status: String,
    priority: String,
    department: String,
    subject: Option<String>,
    started_at: String,
    last_activity_at: String,
    ended_at: Option<String>,
}

impl ChatSessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            assigned_admin_id: row.try_get("assigned_admin_id")?,
            status: row.try_get("status")?,
            priority: row.try_get("priority")?,
            department: row.try_get("department")?,
            subject: row.try_get("subject")?,
            started_at: row.try_get("started_at")?,
            last_activity_at: row.try_get("last_activity_at")?,
            ended_at: row.try_get("ended_at")?,
        })
    }

    fn into_session(self) -> Result<ChatSession, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid session id: {e}")))?;
        let user_id = Uuid::parse_str(&self.user_id)
            .map_err(|e| RepositoryError::Query(format!("invalid user_id: {e}")))?;
        let assigned_admin_id = self
            .assigned_admin_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid assigned_admin_id: {e}")))?;
        let status: SessionStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let priority: Priority = self
            .priority
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let started_at = parse_datetime(&self.started_at)?;
        let last_activity_at = parse_datetime(&self.last_activity_at)?;
        let ended_at = self.ended_at.as_deref().map(parse_datetime).transpose()?;

        Ok(ChatSession {
            id,
            user_id,
            assigned_admin_id,
            status,
            priority,
            department: self.department,
            subject: self.subject,
            started_at,
            last_activity_at,
            ended_at,
        })
    }
}

/// Internal row type for mapping SQLite rows to domain ChatMessage.
struct ChatMessageRow {
    id: String,
    session_id: String,
    sender_id: String,
    is_from_admin: i64,
    message: String,
    created_at: String,
}

impl ChatMessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            sender_id: row.try_get("sender_id")?,
            is_from_admin: row.try_get("is_from_admin")?,
            message: row.try_get("message")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid message id: {e}")))?;
        let session_id = Uuid::parse_str(&self.session_id)
            .map_err(|e| RepositoryError::Query(format!("invalid session_id: {e}")))?;
        let sender_id = Uuid::parse_str(&self.sender_id)
            .map_err(|e| RepositoryError::Query(format!("invalid sender_id: {e}")))?;
        let created_at = parse_datetime(&self.created_at)?;

        Ok(ChatMessage {
            id,
            session_id,
            sender_id,
            is_from_admin: self.is_from_admin != 0,
            message: self.message,
            created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width RFC3339 so lexicographic order in SQL equals chronological
/// order (the activity-touch guard relies on it).
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// ChatRepository implementation
// ---------------------------------------------------------------------------

impl ChatRepository for SqliteChatRepository {
    async fn create_session(&self, session: &ChatSession) -> Result<ChatSession, RepositoryError> {
        let result = sqlx::query(
            r#"INSERT INTO chat_sessions (id, user_id, assigned_admin_id, status, priority, department, subject, started_at, last_activity_at, ended_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(session.id.to_string())
        .bind(session.user_id.to_string())
        .bind(session.assigned_admin_id.map(|id| id.to_string()))
        .bind(session.status.to_string())
        .bind(session.priority.to_string())
        .bind(&session.department)
        .bind(&session.subject)
        .bind(format_datetime(&session.started_at))
        .bind(format_datetime(&session.last_activity_at))
        .bind(session.ended_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(session.clone()),
            Err(err) => {
                let unique_violation = err
                    .as_database_error()
                    .map(|db| db.is_unique_violation())
                    .unwrap_or(false);
                if unique_violation {
                    Err(RepositoryError::Conflict(
                        "open session exists for user".to_string(),
                    ))
                } else {
                    Err(RepositoryError::Query(err.to_string()))
                }
            }
        }
    }

    async fn get_session(&self, session_id: &Uuid) -> Result<Option<ChatSession>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chat_sessions WHERE id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let session_row = ChatSessionRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(session_row.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn get_open_session_for_user(
        &self,
        user_id: &Uuid,
    ) -> Result<Option<ChatSession>, RepositoryError> {
        let row = sqlx::query(
            "SELECT * FROM chat_sessions WHERE user_id = ? AND status IN ('waiting', 'active')",
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let session_row = ChatSessionRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(session_row.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn update_session(&self, session: &ChatSession) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE chat_sessions
               SET assigned_admin_id = ?, status = ?, priority = ?, subject = ?,
                   last_activity_at = ?, ended_at = ?
               WHERE id = ?"#,
        )
        .bind(session.assigned_admin_id.map(|id| id.to_string()))
        .bind(session.status.to_string())
        .bind(session.priority.to_string())
        .bind(&session.subject)
        .bind(format_datetime(&session.last_activity_at))
        .bind(session.ended_at.as_ref().map(format_datetime))
        .bind(session.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn touch_activity(
        &self,
        session_id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        // MAX keeps the column monotonically non-decreasing under
        // out-of-order touches.
        sqlx::query(
            "UPDATE chat_sessions SET last_activity_at = MAX(last_activity_at, ?) WHERE id = ?",
        )
        .bind(format_datetime(&at))
        .bind(session_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn claim_session(
        &self,
        session_id: &Uuid,
        admin_id: &Uuid,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE chat_sessions SET assigned_admin_id = ?, status = 'active'
               WHERE id = ? AND assigned_admin_id IS NULL AND status = 'waiting'"#,
        )
        .bind(admin_id.to_string())
        .bind(session_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn end_session(
        &self,
        session_id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE chat_sessions SET status = 'ended', ended_at = ?
               WHERE id = ? AND status IN ('waiting', 'active')"#,
        )
        .bind(format_datetime(&at))
        .bind(session_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        // Guarded insert: the session must still be open at write time.
        let result = sqlx::query(
            r#"INSERT INTO chat_messages (id, session_id, sender_id, is_from_admin, message, created_at)
               SELECT ?, ?, ?, ?, ?, ?
               WHERE EXISTS (
                   SELECT 1 FROM chat_sessions
                   WHERE id = ? AND status IN ('waiting', 'active')
               )"#,
        )
        .bind(message.id.to_string())
        .bind(message.session_id.to_string())
        .bind(message.sender_id.to_string())
        .bind(message.is_from_admin as i64)
        .bind(&message.message)
        .bind(format_datetime(&message.created_at))
        .bind(message.session_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn get_messages(
        &self,
        session_id: &Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let mut sql = String::from(
            "SELECT * FROM chat_messages WHERE session_id = ? ORDER BY created_at ASC, id ASC",
        );

        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        let rows = sqlx::query(&sql)
            .bind(session_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let msg_row = ChatMessageRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            messages.push(msg_row.into_message()?);
        }

        Ok(messages)
    }

    async fn list_sessions_by_status(
        &self,
        status: SessionStatus,
        limit: Option<i64>,
    ) -> Result<Vec<ChatSession>, RepositoryError> {
        let mut sql =
            String::from("SELECT * FROM chat_sessions WHERE status = ? ORDER BY started_at ASC");

        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let rows = sqlx::query(&sql)
            .bind(status.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            let session_row = ChatSessionRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            sessions.push(session_row.into_session()?);
        }

        Ok(sessions)
    }
}
