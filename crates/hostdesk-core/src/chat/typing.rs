//! Typing presence tracker.
//!
//! Ephemeral per-(session, user) debounce state for "is typing" signals.
//! Clients debounce at about a second; the server applies its own ceiling
//! so a client that disappears mid-"typing" cannot leave a stale indicator
//! behind. Expiry is passive (last signal wins) plus a low-frequency sweep
//! that surfaces expired entries so the router can emit a synthetic
//! `typing: false`.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

struct TypingState {
    is_typing: bool,
    expires_at: Instant,
}

/// Tracks typing state per `(session_id, user_id)`.
///
/// Never persisted; entries self-expire at the configured ceiling.
pub struct TypingTracker {
    ceiling: Duration,
    states: DashMap<(Uuid, Uuid), TypingState>,
}

impl TypingTracker {
    pub fn new(ceiling: Duration) -> Self {
        Self {
            ceiling,
            states: DashMap::new(),
        }
    }

    /// Record a typing signal. A `true` signal arms the staleness ceiling;
    /// a `false` signal clears the entry.
    pub fn set_typing(&self, session_id: Uuid, user_id: Uuid, is_typing: bool) {
        if is_typing {
            self.states.insert(
                (session_id, user_id),
                TypingState {
                    is_typing: true,
                    expires_at: Instant::now() + self.ceiling,
                },
            );
        } else {
            self.states.remove(&(session_id, user_id));
        }
    }

    /// Whether the user currently shows as typing (ceiling not yet hit).
    pub fn is_typing(&self, session_id: &Uuid, user_id: &Uuid) -> bool {
        self.states
            .get(&(*session_id, *user_id))
            .map(|s| s.is_typing && s.expires_at > Instant::now())
            .unwrap_or(false)
    }

    /// Clear the sender's typing state ahead of a message broadcast.
    ///
    /// Returns `true` if the user was showing as typing, so the router
    /// knows whether the other participants need a `typing: false`.
    pub fn clear_on_message(&self, session_id: &Uuid, user_id: &Uuid) -> bool {
        self.states.remove(&(*session_id, *user_id)).is_some()
    }

    /// Drop every entry for an ended session.
    pub fn clear_session(&self, session_id: &Uuid) {
        self.states.retain(|(sid, _), _| sid != session_id);
    }

    /// Collect entries past the ceiling, removing them.
    ///
    /// The caller emits a synthetic `typing: false` for each so clients
    /// never display a stale indicator indefinitely.
    pub fn sweep_expired(&self) -> Vec<(Uuid, Uuid)> {
        let now = Instant::now();
        let expired: Vec<(Uuid, Uuid)> = self
            .states
            .iter()
            .filter(|entry| entry.value().expires_at <= now)
            .map(|entry| *entry.key())
            .collect();
        for key in &expired {
            self.states.remove(key);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl std::fmt::Debug for TypingTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypingTracker")
            .field("ceiling", &self.ceiling)
            .field("active", &self.states.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_true_then_false_clears() {
        let tracker = TypingTracker::new(Duration::from_secs(5));
        let (sid, uid) = (Uuid::now_v7(), Uuid::now_v7());

        tracker.set_typing(sid, uid, true);
        assert!(tracker.is_typing(&sid, &uid));

        tracker.set_typing(sid, uid, false);
        assert!(!tracker.is_typing(&sid, &uid));
        assert!(tracker.is_empty());
    }

    #[test]
    fn message_implicitly_clears_typing() {
        let tracker = TypingTracker::new(Duration::from_secs(5));
        let (sid, uid) = (Uuid::now_v7(), Uuid::now_v7());

        tracker.set_typing(sid, uid, true);
        assert!(tracker.clear_on_message(&sid, &uid));
        assert!(!tracker.is_typing(&sid, &uid));

        // Second clear reports nothing to broadcast
        assert!(!tracker.clear_on_message(&sid, &uid));
    }

    #[test]
    fn signal_past_ceiling_is_stale() {
        let tracker = TypingTracker::new(Duration::ZERO);
        let (sid, uid) = (Uuid::now_v7(), Uuid::now_v7());

        tracker.set_typing(sid, uid, true);
        assert!(!tracker.is_typing(&sid, &uid));

        let expired = tracker.sweep_expired();
        assert_eq!(expired, vec![(sid, uid)]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn sweep_keeps_fresh_entries() {
        let tracker = TypingTracker::new(Duration::from_secs(60));
        let (sid, uid) = (Uuid::now_v7(), Uuid::now_v7());

        tracker.set_typing(sid, uid, true);
        assert!(tracker.sweep_expired().is_empty());
        assert!(tracker.is_typing(&sid, &uid));
    }

    #[test]
    fn clear_session_drops_all_participants() {
        let tracker = TypingTracker::new(Duration::from_secs(60));
        let sid = Uuid::now_v7();
        let other_sid = Uuid::now_v7();

        tracker.set_typing(sid, Uuid::now_v7(), true);
        tracker.set_typing(sid, Uuid::now_v7(), true);
        tracker.set_typing(other_sid, Uuid::now_v7(), true);

        tracker.clear_session(&sid);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn newer_signal_rearms_ceiling() {
        let tracker = TypingTracker::new(Duration::from_secs(60));
        let (sid, uid) = (Uuid::now_v7(), Uuid::now_v7());

        tracker.set_typing(sid, uid, true);
        tracker.set_typing(sid, uid, true);
        assert!(tracker.is_typing(&sid, &uid));
        assert_eq!(tracker.len(), 1);
    }
}
