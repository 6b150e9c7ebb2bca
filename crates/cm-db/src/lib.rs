//! Storage layer for the classroom monitor.
//!
//! Provides persistence for the event log, settlement records, roster, and
//! gamification data using `rusqlite`, and implements the core's storage
//! and directory ports.
//!
//! # Thread Safety
//!
//! [`Database`] wraps its `rusqlite::Connection` in a mutex, so one
//! instance can be shared across threads behind an `Arc`. Access is
//! serialized; ingestion writes are independent single-row inserts and the
//! settlement transaction holds the lock for its whole unit of work.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in ISO 8601 format (e.g.,
//! `2025-03-10T09:00:00.000Z`). This format is used by
//! `chrono::DateTime<Utc>` serialization and ensures:
//! - Lexicographic ordering matches chronological ordering
//! - Human-readable values in the database
//! - Timezone-aware (always UTC)
//!
//! Calendar dates (settlement `date`) are stored as `YYYY-MM-DD` TEXT.
//!
//! ## Settlement linkage
//!
//! `attention_events.settlement_id` is a nullable foreign key into
//! `settlement_records`. It is NULL while an event is unsettled and set
//! exactly once inside the settlement transaction; the update statement
//! guards on `settlement_id IS NULL` so a double consumption fails the
//! whole run instead of silently relinking.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::Connection;
use thiserror::Error;

mod events;
mod roster;
mod stats;
mod xp;

pub use roster::{ClassRecord, StudentRecord};
pub use stats::{DayFocus, SubjectStats};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp {value} in {column}")]
    TimestampParse {
        column: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    /// Failed to parse a stored calendar date.
    #[error("invalid date {value} in {column}")]
    DateParse {
        column: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored event kind string is not recognized.
    #[error(transparent)]
    InvalidEventKind(#[from] cm_core::UnknownEventKind),
    /// An event was already consumed by another settlement record.
    #[error("event {event_id} is already settled")]
    AlreadySettled { event_id: i64 },
    /// The persisted level table failed validation.
    #[error("invalid level table: {0}")]
    InvalidLevelTable(#[source] cm_core::types::ValidationError),
    /// A date computation left the supported calendar range.
    #[error("date out of range: {0}")]
    DateOutOfRange(String),
}

impl From<DbError> for cm_core::ServiceError {
    fn from(err: DbError) -> Self {
        Self::persistence(err)
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.lock();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS classes (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                invite_code TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS students (
                id INTEGER PRIMARY KEY,
                class_id INTEGER REFERENCES classes(id) ON DELETE SET NULL,
                name TEXT NOT NULL,
                student_number INTEGER,
                device_uuid TEXT UNIQUE,
                current_xp INTEGER NOT NULL DEFAULT 0,
                current_level INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id);

            CREATE TABLE IF NOT EXISTS settlement_records (
                id INTEGER PRIMARY KEY,
                student_id INTEGER NOT NULL REFERENCES students(id),
                date TEXT NOT NULL,
                window_start TEXT NOT NULL,
                window_end TEXT NOT NULL,
                subject TEXT NOT NULL,
                period_number INTEGER NOT NULL,
                focus_rate INTEGER NOT NULL,
                out_of_seat_count INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_student_date
                ON settlement_records(student_id, date);

            -- Event log: append-only attention events.
            -- detected_at: ISO 8601; settlement_id: NULL while unsettled.
            CREATE TABLE IF NOT EXISTS attention_events (
                id INTEGER PRIMARY KEY,
                student_id INTEGER NOT NULL REFERENCES students(id),
                kind TEXT NOT NULL,
                detected_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                settlement_id INTEGER REFERENCES settlement_records(id)
            );

            CREATE INDEX IF NOT EXISTS idx_events_student ON attention_events(student_id);
            CREATE INDEX IF NOT EXISTS idx_events_detected ON attention_events(detected_at);
            CREATE INDEX IF NOT EXISTS idx_events_unsettled
                ON attention_events(student_id, settlement_id);

            CREATE TABLE IF NOT EXISTS level_rules (
                level INTEGER PRIMARY KEY,
                required_xp INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS xp_history (
                id INTEGER PRIMARY KEY,
                student_id INTEGER NOT NULL REFERENCES students(id),
                amount INTEGER NOT NULL,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_xp_history_student
                ON xp_history(student_id, created_at);
            ",
        )?;
        Ok(())
    }
}

pub(crate) fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(value: &str, column: &'static str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            column,
            value: value.to_string(),
            source,
        })
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_date(value: &str, column: &'static str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|source| DbError::DateParse {
        column,
        value: value.to_string(),
        source,
    })
}
