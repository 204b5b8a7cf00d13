//! Chat session and message types for hostdesk.
//!
//! These types model support conversations between portal customers and
//! admins: sessions with a waiting/active/ended lifecycle and the messages
//! exchanged within them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a support chat session.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (status IN ('waiting', 'active', 'ended'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created by a customer, no admin attached yet.
    Waiting,
    /// An admin has claimed the session.
    Active,
    /// Terminal. The session id is never reused.
    Ended,
}

impl SessionStatus {
    /// Whether the session still accepts messages and typing signals.
    pub fn is_open(&self) -> bool {
        matches!(self, SessionStatus::Waiting | SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Waiting => write!(f, "waiting"),
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Ended => write!(f, "ended"),
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "waiting" => Ok(SessionStatus::Waiting),
            "active" => Ok(SessionStatus::Active),
            "ended" => Ok(SessionStatus::Ended),
            other => Err(format!("invalid session status: '{other}'")),
        }
    }
}

/// Triage priority of a session, shown in the admin queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            other => Err(format!("invalid priority: '{other}'")),
        }
    }
}

/// A support chat session between a customer and (optionally) an admin.
///
/// At most one session with an open status (`Waiting` or `Active`) exists
/// per `user_id` at any time. `assigned_admin_id` is set at most once per
/// active period, by an atomic claim at the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: Uuid,
    /// Owning customer. Exclusive: a user has at most one open session.
    pub user_id: Uuid,
    /// Admin attached via claim, if any.
    pub assigned_admin_id: Option<Uuid>,
    pub status: SessionStatus,
    pub priority: Priority,
    pub department: String,
    pub subject: Option<String>,
    pub started_at: DateTime<Utc>,
    /// Monotonically non-decreasing; touched on every accepted message.
    pub last_activity_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ChatSession {
    /// Whether the given user is a current participant: the owning
    /// customer or the assigned admin.
    pub fn is_participant(&self, user_id: &Uuid) -> bool {
        self.user_id == *user_id || self.assigned_admin_id.as_ref() == Some(user_id)
    }
}

/// A single message within a chat session.
///
/// Immutable once created. Ordering within a session is creation order,
/// which equals delivery order to all participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender_id: Uuid,
    pub is_from_admin: bool,
    /// Non-empty text.
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_status_roundtrip() {
        for status in [
            SessionStatus::Waiting,
            SessionStatus::Active,
            SessionStatus::Ended,
        ] {
            let s = status.to_string();
            let parsed: SessionStatus = s.parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_session_status_serde() {
        let status = SessionStatus::Waiting;
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "\"waiting\"");
        let parsed: SessionStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, SessionStatus::Waiting);
    }

    #[test]
    fn test_session_status_is_open() {
        assert!(SessionStatus::Waiting.is_open());
        assert!(SessionStatus::Active.is_open());
        assert!(!SessionStatus::Ended.is_open());
    }

    #[test]
    fn test_priority_default_and_parse() {
        assert_eq!(Priority::default(), Priority::Normal);
        assert_eq!("high".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_is_participant() {
        let user_id = Uuid::now_v7();
        let admin_id = Uuid::now_v7();
        let stranger = Uuid::now_v7();

        let mut session = ChatSession {
            id: Uuid::now_v7(),
            user_id,
            assigned_admin_id: None,
            status: SessionStatus::Waiting,
            priority: Priority::Normal,
            department: "general".to_string(),
            subject: None,
            started_at: Utc::now(),
            last_activity_at: Utc::now(),
            ended_at: None,
        };

        assert!(session.is_participant(&user_id));
        assert!(!session.is_participant(&admin_id));

        session.assigned_admin_id = Some(admin_id);
        assert!(session.is_participant(&admin_id));
        assert!(!session.is_participant(&stranger));
    }

    #[test]
    fn test_chat_session_serialize_camel_case() {
        let session = ChatSession {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            assigned_admin_id: None,
            status: SessionStatus::Waiting,
            priority: Priority::Normal,
            department: "billing".to_string(),
            subject: Some("Invoice question".to_string()),
            started_at: Utc::now(),
            last_activity_at: Utc::now(),
            ended_at: None,
        };
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"status\":\"waiting\""));
        assert!(json.contains("\"userId\""));
        assert!(json.contains("\"lastActivityAt\""));
    }
}
