//! Live session monitor loop.
//!
//! Reads JSONL commands from stdin, routes them through the alert router
//! and presence channel, and prints every broadcast on the session topic —
//! the same feed a dashboard subscriber would see.
//!
//! Input lines:
//!
//! ```json
//! {"cmd": "join", "participant": 1}
//! {"cmd": "alert", "participant": 1, "kind": "away", "detected_at": "2025-03-10T09:05:00Z"}
//! {"cmd": "leave", "connection": "c1"}
//! ```

use std::io::BufRead;
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use cm_core::directory::Directory;
use cm_core::{
    AlertRouter, BusMessage, ConnectionId, EventKind, InProcessBus, IngestRequest, ParticipantId,
    PresenceChannel, PresenceTracker, ServiceError, SessionId, session_topic,
};
use cm_db::Database;

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
enum MonitorCommand {
    Join {
        participant: i64,
        #[serde(default)]
        connection: Option<String>,
    },
    Leave {
        connection: String,
    },
    Alert {
        participant: i64,
        kind: EventKind,
        #[serde(default)]
        detected_at: Option<DateTime<Utc>>,
        #[serde(default)]
        name: Option<String>,
    },
}

/// Runs the monitor loop until stdin closes.
pub fn run(db: &Arc<Database>, session: SessionId) -> Result<()> {
    // Confirm the session before subscribing so typos fail fast.
    db.resolve_session(session)
        .context("unknown session")?;

    let bus = Arc::new(InProcessBus::new());
    let feed = bus.subscribe(session_topic(session));
    let tracker = Arc::new(PresenceTracker::new());
    let presence = PresenceChannel::new(tracker, bus.clone());
    let router = AlertRouter::new(db.clone(), db.clone(), bus);

    println!("Monitoring session {session}; reading commands from stdin.");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        // One bad command must not take the monitor down.
        if let Err(err) = handle_line(db, session, &presence, &router, &line) {
            eprintln!("error: {err:#}");
        }
        drain(&feed);
    }
    drain(&feed);
    Ok(())
}

fn handle_line(
    db: &Arc<Database>,
    session: SessionId,
    presence: &PresenceChannel,
    router: &AlertRouter,
    line: &str,
) -> Result<()> {
    let command: MonitorCommand =
        serde_json::from_str(line).context("unrecognized monitor command")?;
    match command {
        MonitorCommand::Join {
            participant,
            connection,
        } => {
            let participant = db.resolve_participant(ParticipantId::new(participant))?;
            let connection = connection
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let connection =
                ConnectionId::new(connection).map_err(ServiceError::from)?;
            presence.join(connection, session, participant);
        }
        MonitorCommand::Leave { connection } => {
            let connection = ConnectionId::new(connection).map_err(ServiceError::from)?;
            if presence.leave(&connection).is_none() {
                eprintln!("connection was not tracked");
            }
        }
        MonitorCommand::Alert {
            participant,
            kind,
            detected_at,
            name,
        } => {
            router.ingest(IngestRequest {
                session_id: session,
                participant_id: ParticipantId::new(participant),
                display_name: name,
                kind,
                detected_at,
            })?;
        }
    }
    Ok(())
}

fn drain(feed: &Receiver<BusMessage>) {
    while let Ok(message) = feed.try_recv() {
        println!("{}", message.payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_from_jsonl() {
        let join: MonitorCommand =
            serde_json::from_str(r#"{"cmd": "join", "participant": 3}"#).unwrap();
        assert!(matches!(join, MonitorCommand::Join { participant: 3, .. }));

        let alert: MonitorCommand = serde_json::from_str(
            r#"{"cmd": "alert", "participant": 3, "kind": "away", "detected_at": "2025-03-10T09:05:00Z"}"#,
        )
        .unwrap();
        assert!(matches!(
            alert,
            MonitorCommand::Alert {
                kind: EventKind::Away,
                ..
            }
        ));

        let leave: MonitorCommand =
            serde_json::from_str(r#"{"cmd": "leave", "connection": "c1"}"#).unwrap();
        assert!(matches!(leave, MonitorCommand::Leave { .. }));

        assert!(serde_json::from_str::<MonitorCommand>(r#"{"cmd": "dance"}"#).is_err());
    }
}
