//! XP awards and summaries.

use std::sync::Arc;

use anyhow::{Context, Result};

use cm_core::{ParticipantId, XpLedger};
use cm_db::Database;

fn ledger(db: &Arc<Database>) -> Result<XpLedger> {
    let table = db
        .level_table()
        .context("failed to load level table (run `cm init` first)")?;
    Ok(XpLedger::new(db.clone(), table))
}

/// Awards an XP delta to a student.
pub fn run(db: &Arc<Database>, participant: i64, amount: i64, reason: Option<&str>) -> Result<()> {
    let award = ledger(db)?
        .award(
            ParticipantId::new(participant),
            amount,
            reason.unwrap_or(""),
        )
        .context("failed to award XP")?;
    println!(
        "Student {participant}: level {}, {} XP",
        award.new_level, award.new_xp
    );
    Ok(())
}

/// Prints a student's current level, XP, and last award reason.
pub fn summary(db: &Arc<Database>, participant: i64) -> Result<()> {
    let summary = ledger(db)?
        .summary(ParticipantId::new(participant))
        .context("failed to load XP summary")?;
    println!(
        "Student {participant}: level {}, {} XP",
        summary.level, summary.xp
    );
    if let Some(reason) = summary.last_reason {
        println!("Last award: {reason}");
    }
    Ok(())
}
