//! In-memory fakes shared by the core unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use hostdesk_types::chat::{ChatMessage, ChatSession, Priority, SessionStatus};
use hostdesk_types::error::RepositoryError;
use uuid::Uuid;

use crate::chat::repository::ChatRepository;

/// Build a fresh waiting session for a user.
pub fn make_session(user_id: Uuid) -> ChatSession {
    ChatSession {
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
    }
}

/// In-memory [`ChatRepository`] mirroring the SQLite implementation's
/// guarantees: one open session per user, CAS claim, conditional end.
pub struct InMemoryChatRepository {
    sessions: Mutex<HashMap<Uuid, ChatSession>>,
    messages: Mutex<Vec<ChatMessage>>,
    fail_inserts: AtomicBool,
}

impl InMemoryChatRepository {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            messages: Mutex::new(Vec::new()),
            fail_inserts: AtomicBool::new(false),
        }
    }

    /// Make subsequent `insert_message` calls fail, to exercise the
    /// delivery-failure path.
    pub fn fail_next_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

impl ChatRepository for InMemoryChatRepository {
    async fn create_session(&self, session: &ChatSession) -> Result<ChatSession, RepositoryError> {
        let mut sessions = self.sessions.lock().unwrap();
        let open_exists = sessions
            .values()
            .any(|s| s.user_id == session.user_id && s.status.is_open());
        if open_exists {
            return Err(RepositoryError::Conflict(
                "open session exists for user".to_string(),
            ));
        }
        sessions.insert(session.id, session.clone());
        Ok(session.clone())
    }

    async fn get_session(&self, session_id: &Uuid) -> Result<Option<ChatSession>, RepositoryError> {
        Ok(self.sessions.lock().unwrap().get(session_id).cloned())
    }

    async fn get_open_session_for_user(
        &self,
        user_id: &Uuid,
    ) -> Result<Option<ChatSession>, RepositoryError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .find(|s| s.user_id == *user_id && s.status.is_open())
            .cloned())
    }

    async fn update_session(&self, session: &ChatSession) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.lock().unwrap();
        if !sessions.contains_key(&session.id) {
            return Err(RepositoryError::NotFound);
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn touch_activity(
        &self,
        session_id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(session_id).ok_or(RepositoryError::NotFound)?;
        if at > session.last_activity_at {
            session.last_activity_at = at;
        }
        Ok(())
    }

    async fn claim_session(
        &self,
        session_id: &Uuid,
        admin_id: &Uuid,
    ) -> Result<bool, RepositoryError> {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(session) = sessions.get_mut(session_id) else {
            return Ok(false);
        };
        if session.assigned_admin_id.is_some() || session.status != SessionStatus::Waiting {
            return Ok(false);
        }
        session.assigned_admin_id = Some(*admin_id);
        session.status = SessionStatus::Active;
        Ok(true)
    }

    async fn end_session(&self, session_id: &Uuid, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(session) = sessions.get_mut(session_id) else {
            return Ok(false);
        };
        if !session.status.is_open() {
            return Ok(false);
        }
        session.status = SessionStatus::Ended;
        session.ended_at = Some(at);
        Ok(true)
    }

    async fn insert_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("injected failure".to_string()));
        }
        let sessions = self.sessions.lock().unwrap();
        match sessions.get(&message.session_id) {
            Some(s) if s.status.is_open() => {}
            _ => return Err(RepositoryError::NotFound),
        }
        drop(sessions);
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn get_messages(
        &self,
        session_id: &Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let messages = self.messages.lock().unwrap();
        let mut result: Vec<ChatMessage> = messages
            .iter()
            .filter(|m| m.session_id == *session_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let offset = offset.unwrap_or(0).max(0) as usize;
        let mut result: Vec<ChatMessage> = result.into_iter().skip(offset).collect();
        if let Some(limit) = limit {
            result.truncate(limit.max(0) as usize);
        }
        Ok(result)
    }

    async fn list_sessions_by_status(
        &self,
        status: SessionStatus,
        limit: Option<i64>,
    ) -> Result<Vec<ChatSession>, RepositoryError> {
        let sessions = self.sessions.lock().unwrap();
        let mut result: Vec<ChatSession> = sessions
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        if let Some(limit) = limit {
            result.truncate(limit.max(0) as usize);
        }
        Ok(result)
    }
}
