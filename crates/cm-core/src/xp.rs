//! Gamification ledger: XP deltas and level transitions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::store::XpStore;
use crate::types::{ParticipantId, ValidationError};

/// Reason recorded when a teacher award arrives without one.
const DEFAULT_AWARD_REASON: &str = "teacher award";

/// One row of the level threshold table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelThreshold {
    pub level: i32,
    pub required_xp: i64,
}

/// Ordered `level -> required cumulative XP` table.
///
/// Seeded externally and read-only during operation. Validated monotonic on
/// construction: levels strictly increase and required XP never decreases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelTable {
    thresholds: Vec<LevelThreshold>,
}

impl LevelTable {
    /// Floor level assigned when no threshold qualifies.
    pub const FLOOR_LEVEL: i32 = 1;

    /// Builds a table after sorting by level and validating monotonicity.
    pub fn new(mut thresholds: Vec<LevelThreshold>) -> Result<Self, ValidationError> {
        thresholds.sort_by_key(|t| t.level);
        for pair in thresholds.windows(2) {
            if pair[1].level == pair[0].level || pair[1].required_xp < pair[0].required_xp {
                return Err(ValidationError::NonMonotonicLevels {
                    level: pair[1].level,
                });
            }
        }
        Ok(Self { thresholds })
    }

    /// The default ten-level progression seeded at `init`.
    #[must_use]
    pub fn default_rules() -> Vec<LevelThreshold> {
        [
            (1, 0),
            (2, 100),
            (3, 250),
            (4, 450),
            (5, 700),
            (6, 1000),
            (7, 1350),
            (8, 1750),
            (9, 2200),
            (10, 2700),
        ]
        .into_iter()
        .map(|(level, required_xp)| LevelThreshold { level, required_xp })
        .collect()
    }

    /// The largest level whose threshold is at or below the given XP, or
    /// the floor level when none qualifies.
    #[must_use]
    pub fn level_for(&self, xp: i64) -> i32 {
        self.thresholds
            .iter()
            .rev()
            .find(|t| t.required_xp <= xp)
            .map_or(Self::FLOOR_LEVEL, |t| t.level)
    }

    #[must_use]
    pub fn thresholds(&self) -> &[LevelThreshold] {
        &self.thresholds
    }
}

/// The outcome of one XP award.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct XpAward {
    pub new_level: i32,
    pub new_xp: i64,
}

/// A participant's current standing plus the last recorded reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XpSummary {
    pub level: i32,
    pub xp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reason: Option<String>,
}

/// Translates XP deltas into updated cumulative XP and level.
pub struct XpLedger {
    store: Arc<dyn XpStore>,
    table: LevelTable,
}

impl XpLedger {
    pub fn new(store: Arc<dyn XpStore>, table: LevelTable) -> Self {
        Self { store, table }
    }

    /// Applies a (possibly negative, unclamped) XP delta.
    ///
    /// The amount may be a session's focus rate or an arbitrary
    /// teacher-assigned value; negative amounts simply reduce XP and the
    /// total is not clamped at zero. A blank reason is replaced with a
    /// default before being recorded.
    pub fn award(
        &self,
        participant: ParticipantId,
        amount: i64,
        reason: &str,
    ) -> Result<XpAward, ServiceError> {
        self.award_at(participant, amount, reason, Utc::now())
    }

    fn award_at(
        &self,
        participant: ParticipantId,
        amount: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<XpAward, ServiceError> {
        let current = self.store.current_xp(participant)?;
        let new_xp = current + amount;
        let new_level = self.table.level_for(new_xp);

        let reason = if reason.trim().is_empty() {
            DEFAULT_AWARD_REASON
        } else {
            reason
        };
        self.store
            .record_award(participant, new_xp, new_level, amount, reason, at)?;
        tracing::debug!(%participant, amount, new_xp, new_level, "xp awarded");

        Ok(XpAward { new_level, new_xp })
    }

    /// Current level, XP, and the most recent award reason.
    pub fn summary(&self, participant: ParticipantId) -> Result<XpSummary, ServiceError> {
        let xp = self.store.current_xp(participant)?;
        Ok(XpSummary {
            level: self.table.level_for(xp),
            xp,
            last_reason: self.store.latest_reason(participant)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryXpStore {
        xp: Mutex<HashMap<ParticipantId, i64>>,
        history: Mutex<Vec<(ParticipantId, i64, String)>>,
    }

    impl MemoryXpStore {
        fn with_xp(participant: ParticipantId, xp: i64) -> Self {
            let store = Self::default();
            store.xp.lock().unwrap().insert(participant, xp);
            store
        }
    }

    impl XpStore for MemoryXpStore {
        fn current_xp(&self, participant: ParticipantId) -> Result<i64, ServiceError> {
            self.xp
                .lock()
                .unwrap()
                .get(&participant)
                .copied()
                .ok_or_else(|| ServiceError::not_found("participant", participant))
        }

        fn record_award(
            &self,
            participant: ParticipantId,
            new_xp: i64,
            _new_level: i32,
            amount: i64,
            reason: &str,
            _at: DateTime<Utc>,
        ) -> Result<(), ServiceError> {
            self.xp.lock().unwrap().insert(participant, new_xp);
            self.history
                .lock()
                .unwrap()
                .push((participant, amount, reason.to_string()));
            Ok(())
        }

        fn latest_reason(&self, participant: ParticipantId) -> Result<Option<String>, ServiceError> {
            Ok(self
                .history
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(p, _, _)| *p == participant)
                .map(|(_, _, reason)| reason.clone()))
        }
    }

    fn table() -> LevelTable {
        LevelTable::new(LevelTable::default_rules()).expect("default rules are monotonic")
    }

    #[test]
    fn table_rejects_duplicate_levels() {
        let rows = vec![
            LevelThreshold {
                level: 1,
                required_xp: 0,
            },
            LevelThreshold {
                level: 1,
                required_xp: 50,
            },
        ];
        assert!(LevelTable::new(rows).is_err());
    }

    #[test]
    fn table_rejects_decreasing_thresholds() {
        let rows = vec![
            LevelThreshold {
                level: 1,
                required_xp: 100,
            },
            LevelThreshold {
                level: 2,
                required_xp: 50,
            },
        ];
        assert!(LevelTable::new(rows).is_err());
    }

    #[test]
    fn level_for_picks_largest_qualifying_level() {
        let table = table();
        assert_eq!(table.level_for(0), 1);
        assert_eq!(table.level_for(99), 1);
        assert_eq!(table.level_for(100), 2);
        assert_eq!(table.level_for(2699), 9);
        assert_eq!(table.level_for(999_999), 10);
    }

    #[test]
    fn level_for_falls_back_to_floor() {
        let table = table();
        assert_eq!(table.level_for(-5), LevelTable::FLOOR_LEVEL);
    }

    #[test]
    fn award_accumulates_and_levels_up() {
        let participant = ParticipantId::new(1);
        let ledger = XpLedger::new(
            Arc::new(MemoryXpStore::with_xp(participant, 80)),
            table(),
        );

        let award = ledger.award(participant, 95, "session focus").unwrap();
        assert_eq!(award.new_xp, 175);
        assert_eq!(award.new_level, 2);
    }

    // Negative awards are not clamped at zero; a participant at 15 XP
    // awarded -20 lands at -5 XP on the floor level.
    #[test]
    fn negative_award_goes_below_zero_unclamped() {
        let participant = ParticipantId::new(1);
        let ledger = XpLedger::new(
            Arc::new(MemoryXpStore::with_xp(participant, 15)),
            table(),
        );

        let award = ledger.award(participant, -20, "talking in class").unwrap();
        assert_eq!(award.new_xp, -5);
        assert_eq!(award.new_level, 1);
    }

    #[test]
    fn blank_reason_gets_the_default() {
        let participant = ParticipantId::new(1);
        let store = Arc::new(MemoryXpStore::with_xp(participant, 0));
        let ledger = XpLedger::new(store.clone(), table());

        ledger.award(participant, 10, "   ").unwrap();
        assert_eq!(
            store.history.lock().unwrap()[0].2,
            DEFAULT_AWARD_REASON
        );
    }

    #[test]
    fn unknown_participant_is_not_found() {
        let ledger = XpLedger::new(Arc::new(MemoryXpStore::default()), table());
        assert!(matches!(
            ledger.award(ParticipantId::new(9), 10, "x"),
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[test]
    fn summary_reports_level_xp_and_last_reason() {
        let participant = ParticipantId::new(1);
        let store = Arc::new(MemoryXpStore::with_xp(participant, 0));
        let ledger = XpLedger::new(store, table());

        ledger.award(participant, 120, "first").unwrap();
        ledger.award(participant, 30, "second").unwrap();

        let summary = ledger.summary(participant).unwrap();
        assert_eq!(summary.xp, 150);
        assert_eq!(summary.level, 2);
        assert_eq!(summary.last_reason.as_deref(), Some("second"));
    }
}
