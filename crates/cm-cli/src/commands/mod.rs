//! Command implementations.

pub mod award;
pub mod ingest;
pub mod init;
pub mod monitor;
pub mod report;
pub mod roster;
pub mod school;
pub mod settle;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};

/// Parses an ISO 8601 timestamp argument.
pub(crate) fn parse_timestamp_arg(value: &str, name: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value).with_context(|| {
        format!("invalid --{name} timestamp, expected ISO 8601 (e.g., 2025-03-10T09:00:00Z)")
    })?;
    Ok(parsed.with_timezone(&Utc))
}

/// Parses a `YYYY-MM-DD` date argument.
pub(crate) fn parse_date_arg(value: &str, name: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid --{name} date, expected YYYY-MM-DD"))
}
