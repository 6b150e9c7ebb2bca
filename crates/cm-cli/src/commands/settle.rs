//! Run end-of-session settlement.

use std::sync::Arc;

use anyhow::{Context, Result};

use cm_core::{SessionId, SettleRequest, SettlementEngine, XpLedger};
use cm_db::Database;

use super::parse_timestamp_arg;

/// Settles one session window and prints the per-student outcome.
pub fn run(
    db: &Arc<Database>,
    session: i64,
    start: &str,
    end: &str,
    subject: &str,
    period: i32,
    no_xp: bool,
) -> Result<()> {
    let window_start = parse_timestamp_arg(start, "start")?;
    let window_end = parse_timestamp_arg(end, "end")?;

    let mut engine = SettlementEngine::new(db.clone(), db.clone());
    if !no_xp {
        let table = db
            .level_table()
            .context("failed to load level table (run `cm init` first)")?;
        engine = engine.with_ledger(Arc::new(XpLedger::new(db.clone(), table)));
    }

    let records = engine
        .settle(&SettleRequest {
            session_id: SessionId::new(session),
            window_start,
            window_end,
            subject: subject.to_string(),
            period_number: period,
        })
        .context("settlement failed")?;

    if records.is_empty() {
        println!("No records created (already settled, or the class has no students).");
        return Ok(());
    }

    println!("Settled {} student(s).", records.len());
    for record in &records {
        println!(
            "  student {}: focus {}%, away {}",
            record.participant_id, record.focus_rate, record.out_of_seat_count
        );
    }
    Ok(())
}
