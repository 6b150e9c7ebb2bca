//! Live presence tracking.
//!
//! Tracks which participants are currently connected to which session,
//! independent of any persisted state. State lives in memory only and is
//! lost on process restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;

use crate::bus::{Bus, session_topic};
use crate::event::{EventKind, alert_message};
use crate::router::{AlertNotice, CountNotice};
use crate::types::{ConnectionId, Participant, SessionId};

/// Bidirectional index of live connections and (session, participant) pairs.
///
/// All three internal indices are updated under a single lock, so readers
/// never observe a participant counted but not listed. Instances are meant
/// to be injected and shared (`Arc<PresenceTracker>`), not held in a global.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    connection_session: HashMap<ConnectionId, SessionId>,
    connection_participant: HashMap<ConnectionId, Participant>,
    /// BTreeMap keeps `list_for` output in a stable order.
    session_roster: HashMap<SessionId, BTreeMap<ConnectionId, Participant>>,
}

impl PresenceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a connection, idempotently per connection ID.
    ///
    /// A re-join overwrites the prior entry for that connection; joining the
    /// same session twice from one connection leaves the count unchanged.
    pub fn join(&self, connection: ConnectionId, session: SessionId, participant: Participant) {
        let mut inner = self.lock();

        // Drop any prior registration for this connection first so a
        // re-join against a different session cannot leave a stale entry.
        if let Some(previous) = inner.connection_session.insert(connection.clone(), session) {
            if previous != session {
                if let Some(roster) = inner.session_roster.get_mut(&previous) {
                    roster.remove(&connection);
                }
            }
        }

        tracing::debug!(%connection, %session, participant = %participant.id, "presence join");
        inner
            .connection_participant
            .insert(connection.clone(), participant.clone());
        inner
            .session_roster
            .entry(session)
            .or_default()
            .insert(connection, participant);
    }

    /// Removes a connection, returning who left and from which session.
    ///
    /// Unknown connections are a no-op returning `None`; this operation
    /// never fails.
    pub fn leave(&self, connection: &ConnectionId) -> Option<(SessionId, Participant)> {
        let mut inner = self.lock();

        let session = inner.connection_session.remove(connection)?;
        let participant = inner.connection_participant.remove(connection)?;
        if let Some(roster) = inner.session_roster.get_mut(&session) {
            roster.remove(connection);
            if roster.is_empty() {
                inner.session_roster.remove(&session);
            }
        }

        tracing::debug!(%connection, %session, participant = %participant.id, "presence leave");
        Some((session, participant))
    }

    /// Number of connections currently tracked for the session.
    #[must_use]
    pub fn count_for(&self, session: SessionId) -> usize {
        self.lock()
            .session_roster
            .get(&session)
            .map_or(0, BTreeMap::len)
    }

    /// Participants currently connected to the session.
    #[must_use]
    pub fn list_for(&self, session: SessionId) -> Vec<Participant> {
        self.lock()
            .session_roster
            .get(&session)
            .map_or_else(Vec::new, |roster| roster.values().cloned().collect())
    }
}

/// Presence tracking wired to the session topic.
///
/// Joins and leaves publish an ENTER/EXIT alert plus a refreshed
/// participant count; leaving an untracked connection publishes nothing.
pub struct PresenceChannel {
    tracker: Arc<PresenceTracker>,
    bus: Arc<dyn Bus>,
}

impl PresenceChannel {
    pub fn new(tracker: Arc<PresenceTracker>, bus: Arc<dyn Bus>) -> Self {
        Self { tracker, bus }
    }

    /// Registers the connection and announces the arrival.
    pub fn join(&self, connection: ConnectionId, session: SessionId, participant: Participant) {
        self.tracker
            .join(connection, session, participant.clone());
        self.announce(session, participant, EventKind::Enter);
    }

    /// Removes the connection, announcing the departure when it was tracked.
    pub fn leave(&self, connection: &ConnectionId) -> Option<Participant> {
        let (session, participant) = self.tracker.leave(connection)?;
        self.announce(session, participant.clone(), EventKind::Exit);
        Some(participant)
    }

    fn announce(&self, session: SessionId, participant: Participant, kind: EventKind) {
        let topic = session_topic(session);
        let notice = AlertNotice {
            participant_id: participant.id,
            message: format!("{} {}", participant.name, alert_message(kind)),
            name: participant.name,
            number: participant.number,
            kind,
            alert_time: Utc::now(),
            total_away_count: 0,
            total_unfocus_count: 0,
        };
        self.publish(&topic, &notice);
        self.publish(&topic, &CountNotice::new(self.tracker.count_for(session)));
    }

    fn publish<T: Serialize>(&self, topic: &str, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => {
                if let Err(err) = self.bus.publish(topic, value) {
                    tracing::warn!(topic, %err, "presence broadcast failed");
                }
            }
            Err(err) => tracing::warn!(topic, %err, "failed to serialize presence payload"),
        }
    }
}
