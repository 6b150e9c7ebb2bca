//! Gamification persistence: level rules, XP state, and award history.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use cm_core::store::XpStore;
use cm_core::xp::{LevelTable, LevelThreshold};
use cm_core::{ParticipantId, ServiceError};

use crate::{Database, DbError, format_timestamp};

impl Database {
    /// Seeds the level threshold table, ignoring rows already present.
    pub fn seed_level_rules(&self, thresholds: &[LevelThreshold]) -> Result<(), DbError> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("INSERT OR IGNORE INTO level_rules (level, required_xp) VALUES (?, ?)")?;
        for threshold in thresholds {
            stmt.execute(params![threshold.level, threshold.required_xp])?;
        }
        Ok(())
    }

    /// Loads and validates the persisted level table.
    pub fn level_table(&self) -> Result<LevelTable, DbError> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT level, required_xp FROM level_rules ORDER BY level ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(LevelThreshold {
                level: row.get(0)?,
                required_xp: row.get(1)?,
            })
        })?;
        let mut thresholds = Vec::new();
        for row in rows {
            thresholds.push(row?);
        }
        LevelTable::new(thresholds).map_err(DbError::InvalidLevelTable)
    }

    fn student_xp(&self, participant: ParticipantId) -> Result<Option<i64>, DbError> {
        let conn = self.lock();
        let xp = conn
            .query_row(
                "SELECT current_xp FROM students WHERE id = ?",
                params![participant.value()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(xp)
    }

    fn persist_award(
        &self,
        participant: ParticipantId,
        new_xp: i64,
        new_level: i32,
        amount: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE students SET current_xp = ?, current_level = ? WHERE id = ?",
            params![new_xp, new_level, participant.value()],
        )?;
        if updated != 1 {
            return Ok(false);
        }
        tx.execute(
            "INSERT INTO xp_history (student_id, amount, reason, created_at) VALUES (?, ?, ?, ?)",
            params![
                participant.value(),
                amount,
                reason,
                format_timestamp(at)
            ],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Reason attached to the student's most recent XP change, if any.
    pub fn latest_xp_reason(
        &self,
        participant: ParticipantId,
    ) -> Result<Option<String>, DbError> {
        let conn = self.lock();
        let reason = conn
            .query_row(
                "
                SELECT reason FROM xp_history
                WHERE student_id = ?
                ORDER BY created_at DESC, id DESC
                LIMIT 1
                ",
                params![participant.value()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(reason)
    }
}

impl XpStore for Database {
    fn current_xp(&self, participant: ParticipantId) -> Result<i64, ServiceError> {
        self.student_xp(participant)?
            .ok_or_else(|| ServiceError::not_found("participant", participant))
    }

    fn record_award(
        &self,
        participant: ParticipantId,
        new_xp: i64,
        new_level: i32,
        amount: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        if self.persist_award(participant, new_xp, new_level, amount, reason, at)? {
            Ok(())
        } else {
            Err(ServiceError::not_found("participant", participant))
        }
    }

    fn latest_reason(&self, participant: ParticipantId) -> Result<Option<String>, ServiceError> {
        Ok(self.latest_xp_reason(participant)?)
    }
}
