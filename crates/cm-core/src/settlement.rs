//! Focus-loss reduction.
//!
//! Converts an ordered stream of attention events into a focus percentage
//! per participant.
//!
//! # Algorithm Summary
//!
//! 1. Sweep the event stream in `detected_at` order, tracking a
//!    FOCUSED/UNFOCUSED state per participant
//! 2. Accumulate loss intervals between a loss-opening event (AWAY, UNFOCUS)
//!    and the next loss-closing event (FOCUS, RESTROOM, ACTIVITY)
//! 3. Charge an unclosed loss interval to the session window end

use chrono::{DateTime, NaiveDate, Utc};

use crate::event::{AttentionEvent, EventKind};
use crate::types::{FocusRate, ParticipantId, ValidationError};

/// The time window of one settlement run, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl SessionWindow {
    /// Creates a window after validating that it does not run backwards.
    ///
    /// A zero-length window is allowed; the divisor is floored at one second
    /// so a degenerate window still settles.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if end < start {
            return Err(ValidationError::WindowInverted {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// The calendar date the window belongs to, taken from its start.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// Window length in seconds, floored at one to keep division safe.
    #[must_use]
    pub fn total_seconds(&self) -> i64 {
        (self.end - self.start).num_seconds().max(1)
    }

    /// Whether the timestamp falls inside the window (inclusive).
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// An event suitable for focus reduction.
///
/// This trait allows the reduction to work with different event
/// representations (e.g., persisted events from storage, or test fixtures).
pub trait SettleEvent {
    /// When the event was detected.
    fn detected_at(&self) -> DateTime<Utc>;

    /// The attention event kind.
    fn kind(&self) -> EventKind;
}

impl SettleEvent for AttentionEvent {
    fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    fn kind(&self) -> EventKind {
        self.kind
    }
}

/// The reduction result for a single participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusOutcome {
    /// Total seconds spent unfocused, clipped to the session window.
    pub loss_seconds: i64,
    /// `round(100 * (total - loss) / total)`, clamped to \[0, 100\].
    pub focus_rate: FocusRate,
    /// Count of AWAY events over the full (unfiltered) event list.
    pub out_of_seat_count: i64,
}

/// Reduces one participant's event stream to a focus outcome.
///
/// Events must be sorted by `detected_at` ascending. Events outside the
/// window are ignored by the state machine (but still counted for
/// `out_of_seat_count`, and still consumed by the caller's settlement run).
/// A participant with no events settles to a focus rate of 100.
pub fn reduce_focus<E: SettleEvent>(events: &[E], window: &SessionWindow) -> FocusOutcome {
    let mut loss_seconds = 0i64;
    let mut loss_start: Option<DateTime<Utc>> = None;

    for event in events {
        let at = event.detected_at();
        if !window.contains(at) {
            tracing::trace!(%at, kind = %event.kind(), "skipping event outside session window");
            continue;
        }

        let kind = event.kind();
        if kind.starts_loss() {
            // Re-entering a loss state does not restart the interval clock.
            if loss_start.is_none() {
                loss_start = Some(at);
            }
        } else if kind.ends_loss() {
            if let Some(start) = loss_start.take() {
                loss_seconds += (at - start).num_seconds();
            }
        }
    }

    // A participant who never returned is charged loss until session end.
    if let Some(start) = loss_start {
        loss_seconds += (window.end() - start).num_seconds();
    }

    let total = window.total_seconds();
    #[expect(
        clippy::cast_precision_loss,
        reason = "session windows are far below 2^52 seconds"
    )]
    let rate = (100.0 * (total - loss_seconds) as f64 / total as f64).round();
    #[expect(clippy::cast_possible_truncation, reason = "clamped to [0, 100] below")]
    let focus_rate = FocusRate::clamped(rate as i64);

    let away_events = events.iter().filter(|e| e.kind() == EventKind::Away).count();
    let out_of_seat_count = i64::try_from(away_events).unwrap_or(i64::MAX);

    FocusOutcome {
        loss_seconds,
        focus_rate,
        out_of_seat_count,
    }
}

/// One participant's settlement, computed but not yet persisted.
///
/// `event_ids` lists every unsettled event fetched for the participant —
/// including out-of-window events, which are linked for bookkeeping even
/// though their effect on the reduction is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementDraft {
    pub participant_id: ParticipantId,
    pub date: NaiveDate,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub subject: String,
    pub period_number: i32,
    pub focus_rate: FocusRate,
    pub out_of_seat_count: i64,
    pub event_ids: Vec<i64>,
}

/// A persisted settlement record; immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SettlementRecord {
    pub id: i64,
    pub participant_id: ParticipantId,
    pub date: NaiveDate,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub subject: String,
    pub period_number: i32,
    pub focus_rate: FocusRate,
    pub out_of_seat_count: i64,
}
