//! Message router: validates, persists, and fans out chat events.
//!
//! Every inbound envelope from a connection passes through
//! [`MessageRouter::dispatch`]. Lifecycle envelopes are delegated to the
//! [`SessionLifecycleManager`]; `message` and `typing` are handled here.
//!
//! Ordering: messages for one session are persisted and broadcast under
//! that session's critical section, so all participants observe the same
//! order (single-writer-per-session). Messages to different sessions have
//! no ordering relationship. A persistence failure surfaces to the sender
//! as a delivery failure and nothing is broadcast -- the store and the
//! clients never diverge.

use std::sync::Arc;

use chrono::Utc;
use hostdesk_types::chat::{ChatMessage, ChatSession};
use hostdesk_types::error::ChatError;
use hostdesk_types::event::{ClientEvent, ServerEvent};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::chat::assign::AssignmentPolicy;
use crate::chat::lifecycle::SessionLifecycleManager;
use crate::chat::registry::{ConnectionHandle, ConnectionRegistry};
use crate::chat::repository::ChatRepository;
use crate::chat::typing::TypingTracker;

/// Routes client envelopes to the lifecycle manager or handles them
/// in place, and owns message fan-out.
pub struct MessageRouter<R: ChatRepository, P: AssignmentPolicy> {
    repo: Arc<R>,
    lifecycle: Arc<SessionLifecycleManager<R, P>>,
    registry: Arc<ConnectionRegistry>,
    typing: Arc<TypingTracker>,
}

impl<R: ChatRepository, P: AssignmentPolicy> MessageRouter<R, P> {
    pub fn new(
        repo: Arc<R>,
        lifecycle: Arc<SessionLifecycleManager<R, P>>,
        registry: Arc<ConnectionRegistry>,
        typing: Arc<TypingTracker>,
    ) -> Self {
        Self {
            repo,
            lifecycle,
            registry,
            typing,
        }
    }

    /// Process one envelope from a connection.
    ///
    /// Errors are returned to the caller (the transport task), which
    /// reports them to the originating connection only -- never broadcast,
    /// and the connection is not dropped.
    pub async fn dispatch(
        &self,
        conn: &Arc<ConnectionHandle>,
        event: ClientEvent,
    ) -> Result<(), ChatError> {
        match event {
            ClientEvent::StartSession {
                subject,
                department,
            } => {
                self.lifecycle
                    .start_session(&conn.identity, Some(&conn.id), subject, department)
                    .await?;
                Ok(())
            }
            ClientEvent::ResumeSession => {
                self.lifecycle.resume_session(conn).await?;
                Ok(())
            }
            ClientEvent::EndSession { session_id } => {
                self.lifecycle.end_session(&conn.identity, &session_id).await
            }
            ClientEvent::ClaimSession { session_id } => {
                self.lifecycle
                    .claim_session(&conn.identity, Some(&conn.id), &session_id)
                    .await?;
                Ok(())
            }
            ClientEvent::Message {
                session_id,
                message,
            } => self.handle_message(conn, session_id, message).await,
            ClientEvent::Typing {
                session_id,
                is_typing,
            } => self.handle_typing(conn, session_id, is_typing).await,
            ClientEvent::Ping => {
                conn.send(ServerEvent::Pong);
                Ok(())
            }
        }
    }

    /// Validate, persist, and broadcast one chat message.
    async fn handle_message(
        &self,
        conn: &Arc<ConnectionHandle>,
        session_id: Uuid,
        body: String,
    ) -> Result<(), ChatError> {
        if body.trim().is_empty() {
            return Err(ChatError::InvalidMessage("message must not be empty".to_string()));
        }

        let lock = self.lifecycle.session_lock(&session_id);
        let _guard = lock.lock().await;

        let session = self.require_open_participant(conn, &session_id).await?;

        let message = ChatMessage {
            id: Uuid::now_v7(),
            session_id,
            sender_id: conn.identity.user_id,
            is_from_admin: conn.identity.is_admin(),
            message: body,
            created_at: Utc::now(),
        };

        // Persist first; on failure nothing is broadcast and the sender
        // can retry.
        self.repo.insert_message(&message).await.map_err(|err| {
            warn!(session_id = %session_id, error = %err, "message persist failed");
            ChatError::Storage(err)
        })?;
        // The message is persisted at this point; a failed activity touch
        // must not block delivery.
        if let Err(err) = self.repo.touch_activity(&session_id, message.created_at).await {
            warn!(session_id = %session_id, error = %err, "activity touch failed");
        }

        // A message supersedes the sender's typing state; tell the other
        // side to drop the indicator before the message lands.
        if self.typing.clear_on_message(&session_id, &conn.identity.user_id) {
            self.broadcast_typing(&session, conn.identity.user_id, false);
        }

        // Fan out to every connection attached to the session, the
        // sender's own tabs included, so multi-tab state stays consistent.
        for member in self.registry.lookup_by_session(&session_id) {
            member.send(ServerEvent::Message(message.clone()));
        }

        debug!(session_id = %session_id, message_id = %message.id, "message delivered");
        Ok(())
    }

    /// Record a typing signal and notify the other participant(s).
    async fn handle_typing(
        &self,
        conn: &Arc<ConnectionHandle>,
        session_id: Uuid,
        is_typing: bool,
    ) -> Result<(), ChatError> {
        let session = self.require_open_participant(conn, &session_id).await?;

        self.typing
            .set_typing(session_id, conn.identity.user_id, is_typing);
        self.broadcast_typing(&session, conn.identity.user_id, is_typing);
        Ok(())
    }

    /// Emit synthetic `typing: false` for signals past the staleness
    /// ceiling. Driven by the background sweeper.
    pub async fn sweep_typing(&self) {
        for (session_id, user_id) in self.typing.sweep_expired() {
            for member in self.registry.lookup_by_session(&session_id) {
                if member.identity.user_id != user_id {
                    member.send(ServerEvent::Typing {
                        session_id,
                        user_id,
                        is_typing: false,
                    });
                }
            }
        }
    }

    /// Typing indicators go to the other participant(s) only -- never
    /// echoed to the sender, not even to their other tabs.
    fn broadcast_typing(&self, session: &ChatSession, user_id: Uuid, is_typing: bool) {
        for member in self.registry.lookup_by_session(&session.id) {
            if member.identity.user_id != user_id {
                member.send(ServerEvent::Typing {
                    session_id: session.id,
                    user_id,
                    is_typing,
                });
            }
        }
    }

    /// The session must exist, be open, and count the sender as a current
    /// participant (owning user or assigned admin).
    async fn require_open_participant(
        &self,
        conn: &Arc<ConnectionHandle>,
        session_id: &Uuid,
    ) -> Result<ChatSession, ChatError> {
        let session = self
            .repo
            .get_session(session_id)
            .await?
            .ok_or(ChatError::SessionNotFound)?;
        if !session.status.is_open() {
            return Err(ChatError::SessionNotFound);
        }
        if !session.is_participant(&conn.identity.user_id) {
            return Err(ChatError::NotAParticipant);
        }
        Ok(session)
    }
}
