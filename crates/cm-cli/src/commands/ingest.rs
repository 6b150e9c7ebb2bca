//! Route one attention event through the alert router.

use std::sync::Arc;

use anyhow::{Context, Result};

use cm_core::{AlertRouter, EventKind, InProcessBus, IngestRequest, ParticipantId, SessionId};
use cm_db::Database;

use super::parse_timestamp_arg;

/// Ingests a single event and prints the broadcast notification.
pub fn run(
    db: &Arc<Database>,
    session: i64,
    participant: i64,
    kind: EventKind,
    detected_at: Option<&str>,
    name: Option<String>,
) -> Result<()> {
    let detected_at = detected_at
        .map(|value| parse_timestamp_arg(value, "detected-at"))
        .transpose()?;

    let router = AlertRouter::new(
        db.clone(),
        db.clone(),
        Arc::new(InProcessBus::new()),
    );
    let notice = router
        .ingest(IngestRequest {
            session_id: SessionId::new(session),
            participant_id: ParticipantId::new(participant),
            display_name: name,
            kind,
            detected_at,
        })
        .context("failed to ingest event")?;

    println!("{}", serde_json::to_string_pretty(&notice)?);
    Ok(())
}
