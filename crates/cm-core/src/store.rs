//! Storage ports consumed by the core services.
//!
//! The event log is owned by the core but persisted externally; these
//! traits are the seam. The storage crate implements them over SQLite.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::ServiceError;
use crate::event::{AttentionEvent, EventKind, NewEvent};
use crate::settlement::{SessionWindow, SettlementDraft, SettlementRecord};
use crate::types::ParticipantId;

/// Append-only store of attention events.
pub trait EventStore: Send + Sync {
    /// Appends one event with no settlement link.
    fn append_event(&self, event: NewEvent) -> Result<AttentionEvent, ServiceError>;

    /// Counts a participant's unsettled events of one kind detected on the
    /// given calendar day.
    ///
    /// The day boundary is an explicit parameter so callers derive it from
    /// the event's own timestamp rather than wall-clock "now".
    fn count_unsettled_on_day(
        &self,
        participant: ParticipantId,
        kind: EventKind,
        day: NaiveDate,
    ) -> Result<i64, ServiceError>;

    /// Fetches all unsettled events for the given participants, ordered by
    /// `detected_at` ascending.
    fn find_unsettled(
        &self,
        participants: &[ParticipantId],
    ) -> Result<Vec<AttentionEvent>, ServiceError>;

    /// Whether any settlement record already covers this window and period
    /// for any of the given participants.
    fn settlement_exists(
        &self,
        participants: &[ParticipantId],
        window: &SessionWindow,
        period_number: i32,
    ) -> Result<bool, ServiceError>;

    /// Persists one settlement run atomically.
    ///
    /// All records are inserted and every consumed event is linked to its
    /// participant's record in a single transaction; on any failure the
    /// whole run rolls back, leaving no partial records and no half-linked
    /// events. Linking an already-consumed event must fail the run.
    fn apply_settlement(
        &self,
        drafts: Vec<SettlementDraft>,
    ) -> Result<Vec<SettlementRecord>, ServiceError>;
}

/// Persistence for cumulative XP and its audit history.
pub trait XpStore: Send + Sync {
    /// Current cumulative XP of a participant, or `NotFound`.
    fn current_xp(&self, participant: ParticipantId) -> Result<i64, ServiceError>;

    /// Persists an award: the new cumulative XP and level on the
    /// participant plus one history row, atomically.
    fn record_award(
        &self,
        participant: ParticipantId,
        new_xp: i64,
        new_level: i32,
        amount: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError>;

    /// Reason attached to the most recent award, if any.
    fn latest_reason(&self, participant: ParticipantId) -> Result<Option<String>, ServiceError>;
}
