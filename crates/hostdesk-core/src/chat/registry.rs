//! Connection registry: the sole owner of connection-to-identity-to-session
//! mappings.
//!
//! Other components receive lookups returning shared handles; none of them
//! reach into the registry's maps directly. A [`ConnectionHandle`] carries
//! the mpsc sender that feeds the connection's WebSocket sink, so fan-out
//! is a lock-free `send` per handle.
//!
//! Unregistering a connection never ends a session: an admin dropping off
//! an active session leaves the customer with the transcript, and a
//! customer dropping off leaves the session intact until the idle sweeper
//! closes it.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use hostdesk_types::event::ServerEvent;
use hostdesk_types::identity::Identity;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// A live transport connection with its resolved identity.
///
/// Ephemeral: created on register, destroyed on unregister, never
/// persisted. The session attachment is set when the connection starts,
/// resumes, or claims a session.
pub struct ConnectionHandle {
    pub id: Uuid,
    pub identity: Identity,
    session: RwLock<Option<Uuid>>,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    /// The session this connection is attached to, if any.
    pub fn session_id(&self) -> Option<Uuid> {
        *self.session.read().expect("session lock poisoned")
    }

    /// Queue an event for delivery to this connection's transport.
    ///
    /// Best effort: if the receiver half is gone the connection is mid
    /// teardown and the event is dropped.
    pub fn send(&self, event: ServerEvent) {
        let _ = self.tx.send(event);
    }
}

/// In-memory registry of live connections, keyed by connection id with
/// secondary indexes per user and per session.
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
    by_user: DashMap<Uuid, HashSet<Uuid>>,
    by_session: DashMap<Uuid, HashSet<Uuid>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            by_user: DashMap::new(),
            by_session: DashMap::new(),
        }
    }

    /// Register a new connection for an authenticated identity.
    ///
    /// Returns the shared handle and the receiver half that the transport
    /// task drains into its WebSocket sink. Connection ids are generated
    /// here; a collision would be a programming error and panics.
    pub fn register(
        &self,
        identity: Identity,
    ) -> (Arc<ConnectionHandle>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(ConnectionHandle {
            id: Uuid::now_v7(),
            identity,
            session: RwLock::new(None),
            tx,
        });

        self.by_user
            .entry(handle.identity.user_id)
            .or_default()
            .insert(handle.id);
        let previous = self.connections.insert(handle.id, handle.clone());
        assert!(previous.is_none(), "duplicate connection id registered");

        debug!(connection_id = %handle.id, user_id = %handle.identity.user_id, "connection registered");
        (handle, rx)
    }

    /// Attach a connection to a session.
    ///
    /// Re-attaching to the same session is a no-op; attaching to a
    /// different one (an admin moving to its next claim) replaces the
    /// previous membership.
    pub fn attach_session(&self, connection_id: &Uuid, session_id: Uuid) {
        let Some(handle) = self.connections.get(connection_id).map(|h| h.clone()) else {
            return;
        };

        let mut current = handle.session.write().expect("session lock poisoned");
        if *current == Some(session_id) {
            return;
        }
        if let Some(old) = current.take() {
            self.remove_session_index(&old, connection_id);
        }
        *current = Some(session_id);
        drop(current);

        self.by_session
            .entry(session_id)
            .or_default()
            .insert(*connection_id);
    }

    /// Detach every connection from an ended session.
    pub fn detach_session(&self, session_id: &Uuid) {
        let Some((_, members)) = self.by_session.remove(session_id) else {
            return;
        };
        for connection_id in members {
            if let Some(handle) = self.connections.get(&connection_id) {
                let mut current = handle.session.write().expect("session lock poisoned");
                if *current == Some(*session_id) {
                    *current = None;
                }
            }
        }
    }

    /// All live connections for a user (multi-tab).
    pub fn lookup_by_user(&self, user_id: &Uuid) -> Vec<Arc<ConnectionHandle>> {
        self.by_user
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.connections.get(id).map(|h| h.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All connections currently attached to a session.
    pub fn lookup_by_session(&self, session_id: &Uuid) -> Vec<Arc<ConnectionHandle>> {
        self.by_session
            .get(session_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.connections.get(id).map(|h| h.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether a user has at least one live connection.
    pub fn user_is_connected(&self, user_id: &Uuid) -> bool {
        self.by_user
            .get(user_id)
            .map(|ids| !ids.is_empty())
            .unwrap_or(false)
    }

    /// Remove a connection on transport disconnect.
    ///
    /// Session state is untouched; only the in-memory mappings go away.
    pub fn unregister(&self, connection_id: &Uuid) {
        let Some((_, handle)) = self.connections.remove(connection_id) else {
            return;
        };

        if let Some(mut ids) = self.by_user.get_mut(&handle.identity.user_id) {
            ids.remove(connection_id);
        }
        self.by_user
            .remove_if(&handle.identity.user_id, |_, ids| ids.is_empty());

        if let Some(session_id) = handle.session_id() {
            self.remove_session_index(&session_id, connection_id);
        }

        debug!(connection_id = %connection_id, "connection unregistered");
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn remove_session_index(&self, session_id: &Uuid, connection_id: &Uuid) {
        if let Some(mut ids) = self.by_session.get_mut(session_id) {
            ids.remove(connection_id);
        }
        self.by_session.remove_if(session_id, |_, ids| ids.is_empty());
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.connections.len())
            .field("users", &self.by_user.len())
            .field("sessions", &self.by_session.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostdesk_types::identity::Role;

    fn customer() -> Identity {
        Identity {
            user_id: Uuid::now_v7(),
            role: Role::Customer,
            display_name: "Test Customer".to_string(),
        }
    }

    #[test]
    fn register_and_lookup_by_user() {
        let registry = ConnectionRegistry::new();
        let identity = customer();
        let (conn, _rx) = registry.register(identity.clone());

        let found = registry.lookup_by_user(&identity.user_id);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, conn.id);
        assert!(registry.user_is_connected(&identity.user_id));
    }

    #[test]
    fn multiple_tabs_share_a_user() {
        let registry = ConnectionRegistry::new();
        let identity = customer();
        let (_c1, _rx1) = registry.register(identity.clone());
        let (_c2, _rx2) = registry.register(identity.clone());

        assert_eq!(registry.lookup_by_user(&identity.user_id).len(), 2);
        assert_eq!(registry.connection_count(), 2);
    }

    #[test]
    fn attach_and_lookup_by_session() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = registry.register(customer());
        let session_id = Uuid::now_v7();

        registry.attach_session(&conn.id, session_id);
        assert_eq!(conn.session_id(), Some(session_id));
        assert_eq!(registry.lookup_by_session(&session_id).len(), 1);

        // Re-attach is a no-op
        registry.attach_session(&conn.id, session_id);
        assert_eq!(registry.lookup_by_session(&session_id).len(), 1);
    }

    #[test]
    fn attach_to_new_session_replaces_membership() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = registry.register(customer());
        let first = Uuid::now_v7();
        let second = Uuid::now_v7();

        registry.attach_session(&conn.id, first);
        registry.attach_session(&conn.id, second);

        assert_eq!(conn.session_id(), Some(second));
        assert!(registry.lookup_by_session(&first).is_empty());
        assert_eq!(registry.lookup_by_session(&second).len(), 1);
    }

    #[test]
    fn detach_session_clears_all_members() {
        let registry = ConnectionRegistry::new();
        let identity = customer();
        let (c1, _rx1) = registry.register(identity.clone());
        let (c2, _rx2) = registry.register(identity);
        let session_id = Uuid::now_v7();

        registry.attach_session(&c1.id, session_id);
        registry.attach_session(&c2.id, session_id);
        registry.detach_session(&session_id);

        assert!(registry.lookup_by_session(&session_id).is_empty());
        assert_eq!(c1.session_id(), None);
        assert_eq!(c2.session_id(), None);
    }

    #[test]
    fn unregister_removes_all_mappings_but_not_other_connections() {
        let registry = ConnectionRegistry::new();
        let identity = customer();
        let (c1, _rx1) = registry.register(identity.clone());
        let (c2, _rx2) = registry.register(identity.clone());
        let session_id = Uuid::now_v7();
        registry.attach_session(&c1.id, session_id);
        registry.attach_session(&c2.id, session_id);

        registry.unregister(&c1.id);

        assert_eq!(registry.lookup_by_user(&identity.user_id).len(), 1);
        assert_eq!(registry.lookup_by_session(&session_id).len(), 1);
        assert!(registry.user_is_connected(&identity.user_id));

        registry.unregister(&c2.id);
        assert!(!registry.user_is_connected(&identity.user_id));
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn send_after_receiver_dropped_is_silent() {
        let registry = ConnectionRegistry::new();
        let (conn, rx) = registry.register(customer());
        drop(rx);
        conn.send(ServerEvent::Pong);
    }

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let registry = ConnectionRegistry::new();
        let (conn, mut rx) = registry.register(customer());
        conn.send(ServerEvent::Pong);
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ServerEvent::Pong));
    }
}
