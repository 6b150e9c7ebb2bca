//! Read-side statistics over settlement records.

use chrono::{Datelike, Months, NaiveDate};
use rusqlite::params;

use cm_core::ParticipantId;

use crate::{Database, DbError, format_date, parse_date};

/// Average focus rate for one calendar day.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DayFocus {
    pub date: NaiveDate,
    /// Rounded to one decimal place; 0.0 for days without records.
    pub average_focus_rate: f64,
}

/// Per-subject aggregates over one month.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SubjectStats {
    pub subject: String,
    pub average_focus_rate: f64,
    pub average_out_of_seat: f64,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl Database {
    fn daily_averages(
        &self,
        participant: ParticipantId,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<DayFocus>, DbError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "
            SELECT date, AVG(focus_rate)
            FROM settlement_records
            WHERE student_id = ? AND date >= ? AND date < ?
            GROUP BY date
            ORDER BY date ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![
                participant.value(),
                format_date(from),
                format_date(until)
            ],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
        )?;
        let mut days = Vec::new();
        for row in rows {
            let (date, average) = row?;
            days.push(DayFocus {
                date: parse_date(&date, "date")?,
                average_focus_rate: round1(average),
            });
        }
        Ok(days)
    }

    /// Seven days of focus averages starting at `start`, with days that
    /// have no records reported as 0.0.
    pub fn weekly_focus(
        &self,
        participant: ParticipantId,
        start: NaiveDate,
    ) -> Result<Vec<DayFocus>, DbError> {
        let until = start
            .checked_add_days(chrono::Days::new(7))
            .ok_or_else(|| DbError::DateOutOfRange(start.to_string()))?;
        let recorded = self.daily_averages(participant, start, until)?;

        let days = start
            .iter_days()
            .take(7)
            .map(|date| {
                let average_focus_rate = recorded
                    .iter()
                    .find(|d| d.date == date)
                    .map_or(0.0, |d| d.average_focus_rate);
                DayFocus {
                    date,
                    average_focus_rate,
                }
            })
            .collect();
        Ok(days)
    }

    /// Per-day focus averages for the month containing `any_day`; only
    /// days with records are returned.
    pub fn monthly_focus(
        &self,
        participant: ParticipantId,
        any_day: NaiveDate,
    ) -> Result<Vec<DayFocus>, DbError> {
        let first = any_day
            .with_day(1)
            .ok_or_else(|| DbError::DateOutOfRange(any_day.to_string()))?;
        let next_month = first
            .checked_add_months(Months::new(1))
            .ok_or_else(|| DbError::DateOutOfRange(first.to_string()))?;
        self.daily_averages(participant, first, next_month)
    }

    /// Per-subject focus and out-of-seat averages for the month containing
    /// `any_day`.
    pub fn subject_stats(
        &self,
        participant: ParticipantId,
        any_day: NaiveDate,
    ) -> Result<Vec<SubjectStats>, DbError> {
        let first = any_day
            .with_day(1)
            .ok_or_else(|| DbError::DateOutOfRange(any_day.to_string()))?;
        let next_month = first
            .checked_add_months(Months::new(1))
            .ok_or_else(|| DbError::DateOutOfRange(first.to_string()))?;

        let conn = self.lock();
        let mut stmt = conn.prepare(
            "
            SELECT subject, AVG(focus_rate), AVG(out_of_seat_count)
            FROM settlement_records
            WHERE student_id = ? AND date >= ? AND date < ?
            GROUP BY subject
            ORDER BY subject ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![
                participant.value(),
                format_date(first),
                format_date(next_month)
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                ))
            },
        )?;
        let mut subjects = Vec::new();
        for row in rows {
            let (subject, focus, out_of_seat) = row?;
            subjects.push(SubjectStats {
                subject,
                average_focus_rate: round1(focus),
                average_out_of_seat: round1(out_of_seat),
            });
        }
        Ok(subjects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use cm_core::types::FocusRate;
    use cm_core::{SettlementDraft, SettlementRecord};

    fn record(
        db: &Database,
        participant: ParticipantId,
        date: NaiveDate,
        period: i32,
        subject: &str,
        focus_rate: i64,
        out_of_seat: i64,
    ) -> SettlementRecord {
        let start = date.and_hms_opt(9, 0, 0).unwrap().and_utc();
        let mut records = db
            .record_settlement(vec![SettlementDraft {
                participant_id: participant,
                date,
                window_start: start + chrono::Duration::hours(i64::from(period)),
                window_end: start + chrono::Duration::hours(i64::from(period) + 1),
                subject: subject.to_string(),
                period_number: period,
                focus_rate: FocusRate::clamped(focus_rate),
                out_of_seat_count: out_of_seat,
                event_ids: Vec::new(),
            }])
            .unwrap();
        records.pop().unwrap()
    }

    fn seeded() -> (Database, ParticipantId) {
        let db = Database::open_in_memory().unwrap();
        let class = db.create_class("3-2", "ABC123").unwrap();
        let student = db.add_student(class.id, "Mina", Some(4), None).unwrap();
        (db, student.id)
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn daily_records_are_ordered_by_period() {
        let (db, student) = seeded();
        record(&db, student, day("2025-03-10"), 3, "art", 70, 0);
        record(&db, student, day("2025-03-10"), 1, "math", 90, 1);

        let records = db.settlements_on(student, day("2025-03-10")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].period_number, 1);
        assert_eq!(records[1].period_number, 3);
    }

    #[test]
    fn weekly_focus_zero_fills_missing_days() {
        let (db, student) = seeded();
        record(&db, student, day("2025-03-10"), 1, "math", 80, 0);
        record(&db, student, day("2025-03-10"), 2, "math", 90, 0);
        record(&db, student, day("2025-03-12"), 1, "art", 61, 0);

        let week = db.weekly_focus(student, day("2025-03-10")).unwrap();
        assert_eq!(week.len(), 7);
        assert_eq!(week[0].date, day("2025-03-10"));
        assert!((week[0].average_focus_rate - 85.0).abs() < f64::EPSILON);
        assert!((week[1].average_focus_rate - 0.0).abs() < f64::EPSILON);
        assert!((week[2].average_focus_rate - 61.0).abs() < f64::EPSILON);
        assert_eq!(week[6].date, day("2025-03-16"));
    }

    #[test]
    fn weekly_focus_ignores_other_students() {
        let (db, student) = seeded();
        let class = db.find_class_by_invite("ABC123").unwrap().unwrap();
        let other = db.add_student(class.id, "Jun", Some(11), None).unwrap();
        record(&db, other.id, day("2025-03-10"), 1, "math", 10, 0);

        let week = db.weekly_focus(student, day("2025-03-10")).unwrap();
        assert!(week.iter().all(|d| d.average_focus_rate == 0.0));
    }

    #[test]
    fn monthly_focus_lists_only_recorded_days() {
        let (db, student) = seeded();
        record(&db, student, day("2025-03-03"), 1, "math", 75, 0);
        record(&db, student, day("2025-03-28"), 1, "math", 85, 0);
        record(&db, student, day("2025-04-01"), 1, "math", 10, 0);

        let month = db.monthly_focus(student, day("2025-03-15")).unwrap();
        assert_eq!(month.len(), 2);
        assert_eq!(month[0].date, day("2025-03-03"));
        assert_eq!(month[1].date, day("2025-03-28"));
    }

    #[test]
    fn subject_stats_average_per_subject_with_rounding() {
        let (db, student) = seeded();
        record(&db, student, day("2025-03-10"), 1, "math", 80, 1);
        record(&db, student, day("2025-03-11"), 1, "math", 85, 2);
        record(&db, student, day("2025-03-12"), 1, "art", 61, 0);

        let subjects = db.subject_stats(student, day("2025-03-01")).unwrap();
        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0].subject, "art");
        assert!((subjects[1].average_focus_rate - 82.5).abs() < f64::EPSILON);
        assert!((subjects[1].average_out_of_seat - 1.5).abs() < f64::EPSILON);
    }
}
