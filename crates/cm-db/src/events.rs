//! Event log queries and the settlement transaction.

use chrono::{NaiveDate, NaiveTime, Utc};
use rusqlite::{params, params_from_iter};

use cm_core::store::EventStore;
use cm_core::{
    AttentionEvent, EventKind, NewEvent, ParticipantId, ServiceError, SessionWindow,
    SettlementDraft, SettlementRecord, types::FocusRate,
};

use crate::{Database, DbError, format_date, format_timestamp, parse_date, parse_timestamp};

#[derive(Debug)]
struct EventRow {
    id: i64,
    student_id: i64,
    kind: String,
    detected_at: String,
    settlement_id: Option<i64>,
}

impl EventRow {
    fn into_event(self) -> Result<AttentionEvent, DbError> {
        Ok(AttentionEvent {
            id: self.id,
            participant_id: ParticipantId::new(self.student_id),
            kind: self.kind.parse::<EventKind>()?,
            detected_at: parse_timestamp(&self.detected_at, "detected_at")?,
            settlement_id: self.settlement_id,
        })
    }
}

#[derive(Debug)]
struct RecordRow {
    id: i64,
    student_id: i64,
    date: String,
    window_start: String,
    window_end: String,
    subject: String,
    period_number: i32,
    focus_rate: i64,
    out_of_seat_count: i64,
}

impl RecordRow {
    pub(crate) fn into_record(self) -> Result<SettlementRecord, DbError> {
        Ok(SettlementRecord {
            id: self.id,
            participant_id: ParticipantId::new(self.student_id),
            date: parse_date(&self.date, "date")?,
            window_start: parse_timestamp(&self.window_start, "window_start")?,
            window_end: parse_timestamp(&self.window_end, "window_end")?,
            subject: self.subject,
            period_number: self.period_number,
            focus_rate: FocusRate::clamped(self.focus_rate),
            out_of_seat_count: self.out_of_seat_count,
        })
    }
}

const RECORD_COLUMNS: &str = "id, student_id, date, window_start, window_end, subject, \
                              period_number, focus_rate, out_of_seat_count";

fn read_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get(0)?,
        student_id: row.get(1)?,
        date: row.get(2)?,
        window_start: row.get(3)?,
        window_end: row.get(4)?,
        subject: row.get(5)?,
        period_number: row.get(6)?,
        focus_rate: row.get(7)?,
        out_of_seat_count: row.get(8)?,
    })
}

impl Database {
    /// Appends one event with no settlement link, returning the stored row.
    pub fn insert_event(&self, event: &NewEvent) -> Result<AttentionEvent, DbError> {
        let conn = self.lock();
        conn.execute(
            "
            INSERT INTO attention_events (student_id, kind, detected_at, created_at, settlement_id)
            VALUES (?, ?, ?, ?, NULL)
            ",
            params![
                event.participant_id.value(),
                event.kind.to_string(),
                format_timestamp(event.detected_at),
                format_timestamp(Utc::now()),
            ],
        )?;
        let id = conn.last_insert_rowid();
        tracing::trace!(event_id = id, kind = %event.kind, "event appended");
        Ok(AttentionEvent {
            id,
            participant_id: event.participant_id,
            kind: event.kind,
            detected_at: event.detected_at,
            settlement_id: None,
        })
    }

    /// All unsettled events for the given students, ordered by detection time.
    pub fn unsettled_events(
        &self,
        participants: &[ParticipantId],
    ) -> Result<Vec<AttentionEvent>, DbError> {
        if participants.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock();
        let placeholders = vec!["?"; participants.len()].join(", ");
        let query = format!(
            "
            SELECT id, student_id, kind, detected_at, settlement_id
            FROM attention_events
            WHERE settlement_id IS NULL AND student_id IN ({placeholders})
            ORDER BY detected_at ASC, id ASC
            "
        );
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(
            params_from_iter(participants.iter().map(|p| p.value())),
            |row| {
                Ok(EventRow {
                    id: row.get(0)?,
                    student_id: row.get(1)?,
                    kind: row.get(2)?,
                    detected_at: row.get(3)?,
                    settlement_id: row.get(4)?,
                })
            },
        )?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_event()?);
        }
        Ok(events)
    }

    /// Counts a student's unsettled events of one kind detected on `day`.
    pub fn count_unsettled_kind_on_day(
        &self,
        participant: ParticipantId,
        kind: EventKind,
        day: NaiveDate,
    ) -> Result<i64, DbError> {
        let day_start = day.and_time(NaiveTime::MIN).and_utc();
        let day_end = day_start + chrono::Duration::days(1);
        let conn = self.lock();
        let count = conn.query_row(
            "
            SELECT COUNT(*)
            FROM attention_events
            WHERE student_id = ?
              AND kind = ?
              AND settlement_id IS NULL
              AND detected_at >= ?
              AND detected_at < ?
            ",
            params![
                participant.value(),
                kind.to_string(),
                format_timestamp(day_start),
                format_timestamp(day_end),
            ],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Whether any settlement record already covers this window and period
    /// for any of the given students.
    pub fn has_settlement_for_window(
        &self,
        participants: &[ParticipantId],
        window: &SessionWindow,
        period_number: i32,
    ) -> Result<bool, DbError> {
        if participants.is_empty() {
            return Ok(false);
        }
        let conn = self.lock();
        let placeholders = vec!["?"; participants.len()].join(", ");
        let query = format!(
            "
            SELECT COUNT(*)
            FROM settlement_records
            WHERE window_start = ? AND window_end = ? AND period_number = ?
              AND student_id IN ({placeholders})
            "
        );
        let mut values: Vec<rusqlite::types::Value> = vec![
            format_timestamp(window.start()).into(),
            format_timestamp(window.end()).into(),
            i64::from(period_number).into(),
        ];
        values.extend(participants.iter().map(|p| p.value().into()));
        let count: i64 =
            conn.query_row(&query, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Persists one settlement run in a single transaction.
    ///
    /// Inserts one record per draft and links every consumed event to its
    /// record. The link update guards on `settlement_id IS NULL`; touching
    /// an already-consumed event aborts and rolls back the whole run.
    pub fn record_settlement(
        &self,
        drafts: Vec<SettlementDraft>,
    ) -> Result<Vec<SettlementRecord>, DbError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let created_at = format_timestamp(Utc::now());

        let mut records = Vec::with_capacity(drafts.len());
        {
            let mut insert = tx.prepare(
                "
                INSERT INTO settlement_records
                (student_id, date, window_start, window_end, subject, period_number,
                 focus_rate, out_of_seat_count, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            let mut link = tx.prepare(
                "
                UPDATE attention_events
                SET settlement_id = ?
                WHERE id = ? AND settlement_id IS NULL
                ",
            )?;

            for draft in drafts {
                insert.execute(params![
                    draft.participant_id.value(),
                    format_date(draft.date),
                    format_timestamp(draft.window_start),
                    format_timestamp(draft.window_end),
                    draft.subject,
                    draft.period_number,
                    i64::from(draft.focus_rate.value()),
                    draft.out_of_seat_count,
                    created_at,
                ])?;
                let record_id = tx.last_insert_rowid();

                for event_id in &draft.event_ids {
                    let updated = link.execute(params![record_id, event_id])?;
                    if updated != 1 {
                        return Err(DbError::AlreadySettled {
                            event_id: *event_id,
                        });
                    }
                }

                records.push(SettlementRecord {
                    id: record_id,
                    participant_id: draft.participant_id,
                    date: draft.date,
                    window_start: draft.window_start,
                    window_end: draft.window_end,
                    subject: draft.subject,
                    period_number: draft.period_number,
                    focus_rate: draft.focus_rate,
                    out_of_seat_count: draft.out_of_seat_count,
                });
            }
        }
        tx.commit()?;
        tracing::debug!(records = records.len(), "settlement run persisted");
        Ok(records)
    }

    /// A student's settlement records for one date, ordered by period.
    pub fn settlements_on(
        &self,
        participant: ParticipantId,
        date: NaiveDate,
    ) -> Result<Vec<SettlementRecord>, DbError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "
            SELECT {RECORD_COLUMNS}
            FROM settlement_records
            WHERE student_id = ? AND date = ?
            ORDER BY period_number ASC, id ASC
            "
        ))?;
        let rows = stmt.query_map(
            params![participant.value(), format_date(date)],
            read_record_row,
        )?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }
}

impl EventStore for Database {
    fn append_event(&self, event: NewEvent) -> Result<AttentionEvent, ServiceError> {
        Ok(self.insert_event(&event)?)
    }

    fn count_unsettled_on_day(
        &self,
        participant: ParticipantId,
        kind: EventKind,
        day: NaiveDate,
    ) -> Result<i64, ServiceError> {
        Ok(self.count_unsettled_kind_on_day(participant, kind, day)?)
    }

    fn find_unsettled(
        &self,
        participants: &[ParticipantId],
    ) -> Result<Vec<AttentionEvent>, ServiceError> {
        Ok(self.unsettled_events(participants)?)
    }

    fn settlement_exists(
        &self,
        participants: &[ParticipantId],
        window: &SessionWindow,
        period_number: i32,
    ) -> Result<bool, ServiceError> {
        Ok(self.has_settlement_for_window(participants, window, period_number)?)
    }

    fn apply_settlement(
        &self,
        drafts: Vec<SettlementDraft>,
    ) -> Result<Vec<SettlementRecord>, ServiceError> {
        Ok(self.record_settlement(drafts)?)
    }
}
