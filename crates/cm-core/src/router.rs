//! Alert routing.
//!
//! Turns an inbound attention event into a persisted event-log row, a pair
//! of running per-student tallies, and an outbound notification broadcast to
//! the session's subscribers. Persistence must succeed before any broadcast
//! is attempted; broadcast failure is logged and never surfaced.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bus::{Bus, session_mode_topic, session_topic};
use crate::directory::Directory;
use crate::error::ServiceError;
use crate::event::{EventKind, NewEvent, alert_message};
use crate::store::EventStore;
use crate::types::{ParticipantId, SessionId};

/// One inbound attention event, as reported by a student device.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    /// Display name as declared by the device; the roster name is used
    /// when absent.
    #[serde(default)]
    pub display_name: Option<String>,
    pub kind: EventKind,
    /// Defaults to the ingestion clock when the device sends no timestamp.
    #[serde(default)]
    pub detected_at: Option<DateTime<Utc>>,
}

/// The notification broadcast to a session's subscribers for one alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertNotice {
    pub participant_id: ParticipantId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<i32>,
    pub kind: EventKind,
    pub message: String,
    pub alert_time: DateTime<Utc>,
    /// Same-day unsettled AWAY count for the participant.
    pub total_away_count: i64,
    /// Same-day unsettled UNFOCUS count for the participant.
    pub total_unfocus_count: i64,
}

/// Participant-count payload published alongside presence changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountNotice {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: usize,
}

impl CountNotice {
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            kind: "USER_COUNT".to_string(),
            count,
        }
    }
}

/// Stateless translator from inbound events to persisted rows and
/// broadcasts.
pub struct AlertRouter {
    store: Arc<dyn EventStore>,
    directory: Arc<dyn Directory>,
    bus: Arc<dyn Bus>,
}

impl AlertRouter {
    pub fn new(store: Arc<dyn EventStore>, directory: Arc<dyn Directory>, bus: Arc<dyn Bus>) -> Self {
        Self {
            store,
            directory,
            bus,
        }
    }

    /// Validates the bearer token, requires the student role, and ingests.
    pub fn ingest_with_token(
        &self,
        identity: &dyn crate::identity::Identity,
        token: &str,
        request: IngestRequest,
    ) -> Result<AlertNotice, ServiceError> {
        crate::identity::authorize(identity, token, crate::identity::Role::Student)?;
        self.ingest(request)
    }

    /// Validates, persists, tallies, and broadcasts one attention event.
    ///
    /// Fails with `NotFound` for an unknown session or participant and with
    /// `Persistence` if the event cannot be stored; in both cases nothing
    /// is broadcast.
    pub fn ingest(&self, request: IngestRequest) -> Result<AlertNotice, ServiceError> {
        self.ingest_at(request, Utc::now())
    }

    fn ingest_at(
        &self,
        request: IngestRequest,
        now: DateTime<Utc>,
    ) -> Result<AlertNotice, ServiceError> {
        self.directory.resolve_session(request.session_id)?;
        let participant = self.directory.resolve_participant(request.participant_id)?;

        let detected_at = request.detected_at.unwrap_or(now);
        let event = self.store.append_event(NewEvent {
            participant_id: request.participant_id,
            kind: request.kind,
            detected_at,
        })?;
        tracing::debug!(
            event_id = event.id,
            participant = %request.participant_id,
            kind = %request.kind,
            "attention event recorded"
        );

        // Cumulative tallies cover unsettled events on the event's own
        // calendar day, including the row appended above.
        let day = detected_at.date_naive();
        let total_away_count =
            self.store
                .count_unsettled_on_day(request.participant_id, EventKind::Away, day)?;
        let total_unfocus_count =
            self.store
                .count_unsettled_on_day(request.participant_id, EventKind::Unfocus, day)?;

        let name = request.display_name.unwrap_or(participant.name);
        let notice = AlertNotice {
            participant_id: request.participant_id,
            message: format!("{name} {}", alert_message(request.kind)),
            name,
            number: participant.number,
            kind: request.kind,
            alert_time: detected_at,
            total_away_count,
            total_unfocus_count,
        };

        self.broadcast(&session_topic(request.session_id), &notice);
        Ok(notice)
    }

    /// Publishes a mode change to the session's mode topic.
    pub fn broadcast_mode(&self, session: SessionId, mode: &str) -> Result<(), ServiceError> {
        self.directory.resolve_session(session)?;
        self.broadcast(
            &session_mode_topic(session),
            &serde_json::json!({ "mode": mode }),
        );
        Ok(())
    }

    fn broadcast<T: Serialize>(&self, topic: &str, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => {
                if let Err(err) = self.bus.publish(topic, value) {
                    tracing::warn!(topic, %err, "broadcast failed; notification dropped");
                }
            }
            Err(err) => tracing::warn!(topic, %err, "failed to serialize broadcast payload"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::TimeZone;

    use crate::bus::{BusError, InProcessBus};
    use crate::directory::SessionInfo;
    use crate::event::AttentionEvent;
    use crate::settlement::{SessionWindow, SettlementDraft, SettlementRecord};
    use crate::types::{ClassId, Participant};

    #[derive(Default)]
    struct MemoryStore {
        events: Mutex<Vec<AttentionEvent>>,
        fail_append: bool,
    }

    impl EventStore for MemoryStore {
        fn append_event(&self, event: NewEvent) -> Result<AttentionEvent, ServiceError> {
            if self.fail_append {
                return Err(ServiceError::persistence(std::io::Error::other(
                    "disk full",
                )));
            }
            let mut events = self.events.lock().unwrap();
            let stored = AttentionEvent {
                id: i64::try_from(events.len()).unwrap() + 1,
                participant_id: event.participant_id,
                kind: event.kind,
                detected_at: event.detected_at,
                settlement_id: None,
            };
            events.push(stored.clone());
            Ok(stored)
        }

        fn count_unsettled_on_day(
            &self,
            participant: ParticipantId,
            kind: EventKind,
            day: chrono::NaiveDate,
        ) -> Result<i64, ServiceError> {
            let events = self.events.lock().unwrap();
            Ok(events
                .iter()
                .filter(|e| {
                    e.participant_id == participant
                        && e.kind == kind
                        && e.settlement_id.is_none()
                        && e.detected_at.date_naive() == day
                })
                .count()
                .try_into()
                .unwrap())
        }

        fn find_unsettled(
            &self,
            _participants: &[ParticipantId],
        ) -> Result<Vec<AttentionEvent>, ServiceError> {
            unreachable!("not used by router tests")
        }

        fn settlement_exists(
            &self,
            _participants: &[ParticipantId],
            _window: &SessionWindow,
            _period_number: i32,
        ) -> Result<bool, ServiceError> {
            unreachable!("not used by router tests")
        }

        fn apply_settlement(
            &self,
            _drafts: Vec<SettlementDraft>,
        ) -> Result<Vec<SettlementRecord>, ServiceError> {
            unreachable!("not used by router tests")
        }
    }

    struct StubDirectory {
        participants: HashMap<ParticipantId, Participant>,
        sessions: HashMap<SessionId, SessionInfo>,
    }

    impl StubDirectory {
        fn with_class() -> Self {
            let mut participants = HashMap::new();
            participants.insert(
                ParticipantId::new(1),
                Participant {
                    id: ParticipantId::new(1),
                    name: "Mina".to_string(),
                    number: Some(4),
                },
            );
            let mut sessions = HashMap::new();
            sessions.insert(
                SessionId::new(10),
                SessionInfo {
                    class_id: ClassId::new(10),
                },
            );
            Self {
                participants,
                sessions,
            }
        }
    }

    impl Directory for StubDirectory {
        fn resolve_participant(&self, id: ParticipantId) -> Result<Participant, ServiceError> {
            self.participants
                .get(&id)
                .cloned()
                .ok_or_else(|| ServiceError::not_found("participant", id))
        }

        fn list_participants_for_class(
            &self,
            _class: ClassId,
        ) -> Result<Vec<Participant>, ServiceError> {
            Ok(self.participants.values().cloned().collect())
        }

        fn resolve_session(&self, session: SessionId) -> Result<SessionInfo, ServiceError> {
            self.sessions
                .get(&session)
                .copied()
                .ok_or_else(|| ServiceError::not_found("session", session))
        }
    }

    struct FailingBus;

    impl Bus for FailingBus {
        fn publish(&self, _topic: &str, _payload: serde_json::Value) -> Result<(), BusError> {
            Err(BusError::Transport("broker offline".to_string()))
        }
    }

    fn ts(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0)
            .single()
            .expect("valid test timestamp")
            + chrono::Duration::minutes(minutes)
    }

    fn request(kind: EventKind, detected_at: Option<DateTime<Utc>>) -> IngestRequest {
        IngestRequest {
            session_id: SessionId::new(10),
            participant_id: ParticipantId::new(1),
            display_name: None,
            kind,
            detected_at,
        }
    }

    #[test]
    fn ingest_persists_then_broadcasts_with_tallies() {
        let store = Arc::new(MemoryStore::default());
        let bus = Arc::new(InProcessBus::new());
        let rx = bus.subscribe(session_topic(SessionId::new(10)));
        let router = AlertRouter::new(
            store.clone(),
            Arc::new(StubDirectory::with_class()),
            bus,
        );

        router
            .ingest_at(request(EventKind::Away, Some(ts(5))), ts(6))
            .unwrap();
        let notice = router
            .ingest_at(request(EventKind::Unfocus, Some(ts(10))), ts(11))
            .unwrap();

        assert_eq!(notice.message, "Mina is not focused");
        assert_eq!(notice.total_away_count, 1);
        assert_eq!(notice.total_unfocus_count, 1);
        assert_eq!(notice.number, Some(4));
        assert_eq!(store.events.lock().unwrap().len(), 2);

        // Both ingests reached the session topic.
        let first = rx.try_recv().unwrap();
        assert_eq!(first.payload["kind"], "away");
        assert_eq!(first.payload["message"], "Mina left the session");
        let second = rx.try_recv().unwrap();
        assert_eq!(second.payload["total_unfocus_count"], 1);
    }

    #[test]
    fn detected_at_defaults_to_ingestion_clock() {
        let store = Arc::new(MemoryStore::default());
        let router = AlertRouter::new(
            store.clone(),
            Arc::new(StubDirectory::with_class()),
            Arc::new(InProcessBus::new()),
        );

        let notice = router.ingest_at(request(EventKind::Focus, None), ts(42)).unwrap();
        assert_eq!(notice.alert_time, ts(42));
        assert_eq!(store.events.lock().unwrap()[0].detected_at, ts(42));
    }

    #[test]
    fn unknown_participant_is_not_persisted_or_broadcast() {
        let store = Arc::new(MemoryStore::default());
        let bus = Arc::new(InProcessBus::new());
        let rx = bus.subscribe(session_topic(SessionId::new(10)));
        let router = AlertRouter::new(
            store.clone(),
            Arc::new(StubDirectory::with_class()),
            bus,
        );

        let mut req = request(EventKind::Away, Some(ts(0)));
        req.participant_id = ParticipantId::new(99);
        let err = router.ingest_at(req, ts(0)).unwrap_err();

        assert!(matches!(err, ServiceError::NotFound { .. }));
        assert!(store.events.lock().unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unknown_session_is_rejected() {
        let router = AlertRouter::new(
            Arc::new(MemoryStore::default()),
            Arc::new(StubDirectory::with_class()),
            Arc::new(InProcessBus::new()),
        );

        let mut req = request(EventKind::Away, Some(ts(0)));
        req.session_id = SessionId::new(404);
        assert!(matches!(
            router.ingest_at(req, ts(0)),
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[test]
    fn persistence_failure_aborts_before_broadcast() {
        let bus = Arc::new(InProcessBus::new());
        let rx = bus.subscribe(session_topic(SessionId::new(10)));
        let router = AlertRouter::new(
            Arc::new(MemoryStore {
                fail_append: true,
                ..MemoryStore::default()
            }),
            Arc::new(StubDirectory::with_class()),
            bus,
        );

        let err = router
            .ingest_at(request(EventKind::Away, Some(ts(0))), ts(0))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Persistence(_)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn broadcast_failure_does_not_fail_ingest() {
        let store = Arc::new(MemoryStore::default());
        let router = AlertRouter::new(
            store.clone(),
            Arc::new(StubDirectory::with_class()),
            Arc::new(FailingBus),
        );

        let notice = router
            .ingest_at(request(EventKind::Restroom, Some(ts(3))), ts(3))
            .unwrap();
        assert_eq!(notice.message, "Mina is at the restroom");
        assert_eq!(store.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn tallies_are_scoped_to_the_event_day() {
        let store = Arc::new(MemoryStore::default());
        let router = AlertRouter::new(
            store,
            Arc::new(StubDirectory::with_class()),
            Arc::new(InProcessBus::new()),
        );

        router
            .ingest_at(request(EventKind::Away, Some(ts(0))), ts(0))
            .unwrap();
        // Next day: yesterday's AWAY does not count.
        let next_day = ts(0) + chrono::Duration::days(1);
        let notice = router
            .ingest_at(request(EventKind::Away, Some(next_day)), next_day)
            .unwrap();
        assert_eq!(notice.total_away_count, 1);
    }

    #[test]
    fn device_display_name_overrides_roster_name() {
        let router = AlertRouter::new(
            Arc::new(MemoryStore::default()),
            Arc::new(StubDirectory::with_class()),
            Arc::new(InProcessBus::new()),
        );

        let mut req = request(EventKind::Focus, Some(ts(0)));
        req.display_name = Some("Mina K.".to_string());
        let notice = router.ingest_at(req, ts(0)).unwrap();
        assert_eq!(notice.message, "Mina K. is focused");
    }

    #[test]
    fn ingest_with_token_requires_student_role() {
        use crate::identity::{Identity, Principal, Role};

        struct OneStudent;
        impl Identity for OneStudent {
            fn validate(&self, token: &str) -> Option<Principal> {
                (token == "device-token").then(|| Principal {
                    subject: "student-1".to_string(),
                    role: Role::Student,
                })
            }
        }

        let router = AlertRouter::new(
            Arc::new(MemoryStore::default()),
            Arc::new(StubDirectory::with_class()),
            Arc::new(InProcessBus::new()),
        );

        assert!(matches!(
            router.ingest_with_token(&OneStudent, "bogus", request(EventKind::Away, Some(ts(0)))),
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(
            router
                .ingest_with_token(
                    &OneStudent,
                    "device-token",
                    request(EventKind::Away, Some(ts(0)))
                )
                .is_ok()
        );
    }

    #[test]
    fn mode_change_reaches_the_mode_topic() {
        let bus = Arc::new(InProcessBus::new());
        let rx = bus.subscribe(session_mode_topic(SessionId::new(10)));
        let router = AlertRouter::new(
            Arc::new(MemoryStore::default()),
            Arc::new(StubDirectory::with_class()),
            bus,
        );

        router.broadcast_mode(SessionId::new(10), "DIGITAL").unwrap();
        assert_eq!(rx.try_recv().unwrap().payload["mode"], "DIGITAL");

        assert!(matches!(
            router.broadcast_mode(SessionId::new(404), "NORMAL"),
            Err(ServiceError::NotFound { .. })
        ));
    }
}
