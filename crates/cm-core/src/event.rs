//! Attention events and alert message templates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ParticipantId;

/// Canonical attention event kinds, as reported by student devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The student left their seat.
    Away,
    /// The student is present but not focused.
    Unfocus,
    /// The student returned to a focused state.
    Focus,
    /// The student stepped out to the restroom.
    Restroom,
    /// The student is participating in a sanctioned activity.
    Activity,
    /// The student connected to the session.
    Enter,
    /// The student disconnected from the session.
    Exit,
}

impl EventKind {
    /// Whether this kind opens a loss interval during settlement.
    #[must_use]
    pub const fn starts_loss(self) -> bool {
        matches!(self, Self::Away | Self::Unfocus)
    }

    /// Whether this kind closes a loss interval during settlement.
    #[must_use]
    pub const fn ends_loss(self) -> bool {
        matches!(self, Self::Focus | Self::Restroom | Self::Activity)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Away => "away",
            Self::Unfocus => "unfocus",
            Self::Focus => "focus",
            Self::Restroom => "restroom",
            Self::Activity => "activity",
            Self::Enter => "enter",
            Self::Exit => "exit",
        };
        write!(f, "{s}")
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "away" => Ok(Self::Away),
            "unfocus" => Ok(Self::Unfocus),
            "focus" => Ok(Self::Focus),
            "restroom" => Ok(Self::Restroom),
            "activity" => Ok(Self::Activity),
            "enter" => Ok(Self::Enter),
            "exit" => Ok(Self::Exit),
            _ => Err(UnknownEventKind(s.to_string())),
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown event kind strings.
#[derive(Debug, Clone)]
pub struct UnknownEventKind(String);

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event kind: {}", self.0)
    }
}

impl std::error::Error for UnknownEventKind {}

/// Returns the alert message template for an event kind.
///
/// Each kind maps to exactly one template; kinds without a monitored
/// template fall through to a generic one. The rendered message is
/// `"{student name} {template}"`.
#[must_use]
pub const fn alert_message(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Away => "left the session",
        EventKind::Unfocus => "is not focused",
        EventKind::Focus => "is focused",
        EventKind::Restroom => "is at the restroom",
        EventKind::Activity => "is in an activity",
        EventKind::Enter | EventKind::Exit => "has an alert",
    }
}

/// A persisted attention event.
///
/// Events are immutable facts: created once on ingestion, mutated exactly
/// once when a settlement run sets `settlement_id`, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttentionEvent {
    pub id: i64,
    pub participant_id: ParticipantId,
    pub kind: EventKind,
    pub detected_at: DateTime<Utc>,
    /// Set to the consuming settlement record's ID during settlement;
    /// `None` while the event is unsettled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_id: Option<i64>,
}

/// An attention event not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub participant_id: ParticipantId,
    pub kind: EventKind,
    pub detected_at: DateTime<Utc>,
}
