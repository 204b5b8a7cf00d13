//! Wire-level event envelopes for the chat transport.
//!
//! Both directions share the `{"type": ..., "data": ...}` envelope shape.
//! [`ClientEvent`] is what a connection sends; [`ServerEvent`] is what the
//! router fans out. All server variants are Clone + Send + Sync for use
//! with tokio channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::{ChatMessage, ChatSession, SessionStatus};

/// Incoming envelope from a connected client.
///
/// Unknown or malformed envelopes are rejected with an error event on the
/// originating connection; the connection is not dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// Open a new session. Fails with `SESSION_CONFLICT` if the user
    /// already has one open; the correct client behavior is to resume.
    StartSession {
        subject: Option<String>,
        department: String,
    },

    /// Re-attach this connection to the user's existing open session.
    ResumeSession,

    /// End a session. Allowed for the owning customer or assigned admin.
    EndSession { session_id: Uuid },

    /// Admin claims a waiting session. First claim wins; losers receive
    /// `ALREADY_ASSIGNED`.
    ClaimSession { session_id: Uuid },

    /// A chat message for an open session.
    Message { session_id: Uuid, message: String },

    /// Typing presence signal.
    Typing { session_id: Uuid, is_typing: bool },

    /// Keep-alive ping. Server responds with `pong`.
    Ping,
}

/// Outgoing envelope broadcast by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// A new session was created; carries the full session record.
    SessionStarted(ChatSession),

    /// An existing open session was re-attached; full session metadata,
    /// but not message history (that is the REST read path).
    SessionResumed(ChatSession),

    /// The session this connection follows has ended.
    SessionEnded {},

    /// A persisted message, with server-assigned id and timestamp.
    Message(ChatMessage),

    /// Typing indicator from the other participant. `user_id` is stamped
    /// by the server; never echoed to the sender.
    Typing {
        session_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },

    /// An admin attached to the session (synthetic system notice).
    AdminJoined {},

    /// Session status changed.
    SessionUpdate {
        session_id: Uuid,
        status: SessionStatus,
    },

    /// Keep-alive response.
    Pong,

    /// Validation or delivery failure, sent to the originating connection
    /// only -- never broadcast.
    Error { code: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Priority;
    use chrono::Utc;

    #[test]
    fn test_client_event_parse_start_session() {
        let json = r#"{"type":"start_session","data":{"department":"general"}}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(
            event,
            ClientEvent::StartSession { subject: None, ref department } if department == "general"
        ));
    }

    #[test]
    fn test_client_event_parse_message() {
        let sid = Uuid::now_v7();
        let json = format!(
            r#"{{"type":"message","data":{{"sessionId":"{sid}","message":"hello"}}}}"#
        );
        let event: ClientEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            event,
            ClientEvent::Message { session_id, ref message }
                if session_id == sid && message == "hello"
        ));
    }

    #[test]
    fn test_client_event_parse_typing() {
        let sid = Uuid::now_v7();
        let json = format!(r#"{{"type":"typing","data":{{"sessionId":"{sid}","isTyping":true}}}}"#);
        let event: ClientEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            event,
            ClientEvent::Typing { session_id, is_typing: true } if session_id == sid
        ));
    }

    #[test]
    fn test_client_event_ping_has_no_data() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Ping));
    }

    #[test]
    fn test_server_event_session_started_envelope() {
        let session = ChatSession {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            assigned_admin_id: None,
            status: SessionStatus::Waiting,
            priority: Priority::Normal,
            department: "general".to_string(),
            subject: None,
            started_at: Utc::now(),
            last_activity_at: Utc::now(),
            ended_at: None,
        };
        let json = serde_json::to_string(&ServerEvent::SessionStarted(session)).unwrap();
        assert!(json.contains("\"type\":\"session_started\""));
        assert!(json.contains("\"status\":\"waiting\""));
    }

    #[test]
    fn test_server_event_session_ended_is_empty_object() {
        let json = serde_json::to_string(&ServerEvent::SessionEnded {}).unwrap();
        assert_eq!(json, r#"{"type":"session_ended","data":{}}"#);
    }

    #[test]
    fn test_server_event_typing_stamps_user_id() {
        let sid = Uuid::now_v7();
        let uid = Uuid::now_v7();
        let json = serde_json::to_string(&ServerEvent::Typing {
            session_id: sid,
            user_id: uid,
            is_typing: false,
        })
        .unwrap();
        assert!(json.contains("\"userId\""));
        assert!(json.contains("\"isTyping\":false"));
    }

    #[test]
    fn test_malformed_envelope_is_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"shutdown"}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>("not json").is_err());
    }
}
