//! Focus statistics reports.

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};

use cm_core::{ParticipantId, SettlementRecord};
use cm_db::{Database, DayFocus, SubjectStats};

use super::parse_date_arg;

/// One student's settled periods for a date.
pub fn day(db: &Arc<Database>, participant: i64, date: &str) -> Result<()> {
    let date = parse_date_arg(date, "date")?;
    let records = db
        .settlements_on(ParticipantId::new(participant), date)
        .context("failed to load settlement records")?;
    print!("{}", render_day(date, &records));
    Ok(())
}

/// Seven-day focus trend starting at a date.
pub fn week(db: &Arc<Database>, participant: i64, start: &str) -> Result<()> {
    let start = parse_date_arg(start, "start")?;
    let days = db
        .weekly_focus(ParticipantId::new(participant), start)
        .context("failed to load weekly focus")?;
    print!("{}", render_days(&days));
    Ok(())
}

/// Per-day averages for the month containing the given date.
pub fn month(db: &Arc<Database>, participant: i64, month: &str) -> Result<()> {
    let month = parse_date_arg(month, "month")?;
    let days = db
        .monthly_focus(ParticipantId::new(participant), month)
        .context("failed to load monthly focus")?;
    if days.is_empty() {
        println!("No settled periods this month.");
        return Ok(());
    }
    print!("{}", render_days(&days));
    Ok(())
}

/// Per-subject averages for the month containing the given date.
pub fn subject(db: &Arc<Database>, participant: i64, month: &str) -> Result<()> {
    let month = parse_date_arg(month, "month")?;
    let subjects = db
        .subject_stats(ParticipantId::new(participant), month)
        .context("failed to load subject statistics")?;
    print!("{}", render_subjects(&subjects));
    Ok(())
}

fn render_day(date: chrono::NaiveDate, records: &[SettlementRecord]) -> String {
    let mut out = String::new();
    if records.is_empty() {
        let _ = writeln!(out, "No settled periods on {date}.");
        return out;
    }
    let _ = writeln!(out, "{date}");
    for record in records {
        let _ = writeln!(
            out,
            "  period {} {} ({}-{}): focus {}%, away {}",
            record.period_number,
            record.subject,
            record.window_start.format("%H:%M"),
            record.window_end.format("%H:%M"),
            record.focus_rate,
            record.out_of_seat_count,
        );
    }
    out
}

fn render_days(days: &[DayFocus]) -> String {
    let mut out = String::new();
    for day in days {
        let _ = writeln!(
            out,
            "{}  {}  {:>5.1}%",
            day.date,
            day.date.format("%a"),
            day.average_focus_rate
        );
    }
    out
}

fn render_subjects(subjects: &[SubjectStats]) -> String {
    let mut out = String::new();
    if subjects.is_empty() {
        out.push_str("No settled periods this month.\n");
        return out;
    }
    for subject in subjects {
        let _ = writeln!(
            out,
            "{}: focus {:.1}%, out-of-seat {:.1}",
            subject.subject, subject.average_focus_rate, subject.average_out_of_seat
        );
    }
    out
}
