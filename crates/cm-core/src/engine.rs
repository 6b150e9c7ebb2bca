//! Session settlement engine.
//!
//! Reduces a session's accumulated event stream into one settlement record
//! per participant, persists the batch atomically, and links every consumed
//! event back to its record exactly once.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rayon::prelude::*;

use crate::directory::Directory;
use crate::error::ServiceError;
use crate::event::AttentionEvent;
use crate::identity::{Identity, Role, authorize};
use crate::settlement::{SessionWindow, SettlementDraft, SettlementRecord, reduce_focus};
use crate::store::EventStore;
use crate::types::{ParticipantId, SessionId};
use crate::xp::XpLedger;

/// Reason recorded on XP awarded from a settlement run.
const FOCUS_AWARD_REASON: &str = "session focus";

/// One end-of-session settlement request.
#[derive(Debug, Clone)]
pub struct SettleRequest {
    pub session_id: SessionId,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub subject: String,
    pub period_number: i32,
}

/// The settlement engine.
///
/// Settlement runs for the same session are serialized; a second run
/// arriving while one is in flight fails with `Conflict`. Runs for
/// different sessions proceed in parallel.
pub struct SettlementEngine {
    store: Arc<dyn EventStore>,
    directory: Arc<dyn Directory>,
    ledger: Option<Arc<XpLedger>>,
    in_flight: Mutex<HashSet<SessionId>>,
}

impl SettlementEngine {
    pub fn new(store: Arc<dyn EventStore>, directory: Arc<dyn Directory>) -> Self {
        Self {
            store,
            directory,
            ledger: None,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Wires a gamification ledger so each settled participant is awarded
    /// their focus rate as XP after the run commits.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<XpLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Validates the bearer token, requires the teacher role, and settles.
    pub fn settle_with_token(
        &self,
        identity: &dyn Identity,
        token: &str,
        request: &SettleRequest,
    ) -> Result<Vec<SettlementRecord>, ServiceError> {
        authorize(identity, token, Role::Teacher)?;
        self.settle(request)
    }

    /// Runs one settlement for the session.
    ///
    /// Every roster participant gets exactly one record — a participant
    /// with no events settles to a focus rate of 100 — and all of a
    /// participant's fetched events are linked to their record inside the
    /// same storage transaction. On any persistence failure the whole run
    /// rolls back and the error propagates; a retry is then safe.
    ///
    /// Re-invoking settlement for an already-settled window is a no-op
    /// returning an empty list.
    pub fn settle(&self, request: &SettleRequest) -> Result<Vec<SettlementRecord>, ServiceError> {
        let window = SessionWindow::new(request.window_start, request.window_end)?;
        let _guard = self.lock_session(request.session_id)?;

        let info = self.directory.resolve_session(request.session_id)?;
        let roster = self.directory.list_participants_for_class(info.class_id)?;
        if roster.is_empty() {
            tracing::info!(session = %request.session_id, "settlement skipped: empty roster");
            return Ok(Vec::new());
        }

        let participant_ids: Vec<ParticipantId> = roster.iter().map(|p| p.id).collect();
        let events = self.store.find_unsettled(&participant_ids)?;
        if events.is_empty()
            && self
                .store
                .settlement_exists(&participant_ids, &window, request.period_number)?
        {
            tracing::info!(
                session = %request.session_id,
                "settlement skipped: window already settled and no unsettled events remain"
            );
            return Ok(Vec::new());
        }

        let mut by_participant: HashMap<ParticipantId, Vec<AttentionEvent>> = HashMap::new();
        for event in events {
            by_participant
                .entry(event.participant_id)
                .or_default()
                .push(event);
        }

        let empty: Vec<AttentionEvent> = Vec::new();
        let drafts: Vec<SettlementDraft> = roster
            .par_iter()
            .map(|participant| {
                let events = by_participant.get(&participant.id).unwrap_or(&empty);
                let outcome = reduce_focus(events, &window);
                tracing::debug!(
                    participant = %participant.id,
                    loss_seconds = outcome.loss_seconds,
                    focus_rate = %outcome.focus_rate,
                    "participant reduced"
                );
                SettlementDraft {
                    participant_id: participant.id,
                    date: window.date(),
                    window_start: window.start(),
                    window_end: window.end(),
                    subject: request.subject.clone(),
                    period_number: request.period_number,
                    focus_rate: outcome.focus_rate,
                    out_of_seat_count: outcome.out_of_seat_count,
                    event_ids: events.iter().map(|e| e.id).collect(),
                }
            })
            .collect();

        let records = self.store.apply_settlement(drafts)?;
        tracing::info!(
            session = %request.session_id,
            records = records.len(),
            "settlement complete"
        );

        // XP is a downstream consumer of the committed settlement; award
        // failures are logged, never rolled back into the run.
        if let Some(ledger) = &self.ledger {
            for record in &records {
                let amount = i64::from(record.focus_rate.value());
                if let Err(err) = ledger.award(record.participant_id, amount, FOCUS_AWARD_REASON)
                {
                    tracing::warn!(
                        participant = %record.participant_id,
                        %err,
                        "focus XP award failed"
                    );
                }
            }
        }

        Ok(records)
    }

    fn lock_session(&self, session: SessionId) -> Result<SessionGuard<'_>, ServiceError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(session) {
            return Err(ServiceError::Conflict(format!(
                "settlement already in progress for session {session}"
            )));
        }
        Ok(SessionGuard {
            engine: self,
            session,
        })
    }
}

/// Releases the per-session settlement lock on drop.
struct SessionGuard<'a> {
    engine: &'a SettlementEngine,
    session: SessionId,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.engine
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.session);
    }
}
