//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// The focus rate was out of range.
    #[error("focus rate must be between 0 and 100, got {value}")]
    FocusRateOutOfRange { value: i64 },

    /// The session window end preceded its start.
    #[error("window end {end} is before window start {start}")]
    WindowInverted { start: String, end: String },

    /// The level table was not monotonically increasing.
    #[error("level table is not monotonic at level {level}")]
    NonMonotonicLevels { level: i32 },

    /// Invalid role string.
    #[error("invalid role: {value}")]
    InvalidRole { value: String },
}

/// Generates an integer ID newtype with common trait implementations.
///
/// Identifiers are assigned by the storage layer; the newtypes exist so a
/// class ID can never be passed where a participant ID is expected.
macro_rules! define_int_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw identifier.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw identifier.
            #[must_use]
            pub const fn value(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

define_int_id!(
    /// Identifies a class group.
    ClassId
);

define_int_id!(
    /// Identifies a monitored session.
    ///
    /// A session is one class's one scheduled meeting instance; it resolves
    /// to its owning [`ClassId`] through the directory.
    SessionId
);

define_int_id!(
    /// Identifies a student enrolled in a class.
    ParticipantId
);

/// A live connection identifier, as issued by the transport layer.
///
/// Connection IDs must be non-empty strings. They are ephemeral and never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Creates a new connection ID after validation.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ValidationError::Empty {
                field: "connection ID",
            });
        }
        Ok(Self(id))
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ConnectionId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ConnectionId> for String {
    fn from(id: ConnectionId) -> Self {
        id.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A student identity as carried through presence tracking and alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    /// Roster number within the class, if assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<i32>,
}

/// A focus percentage in the range \[0, 100\].
///
/// Values are clamped during deserialization to be lenient with external
/// data; construction from computed values goes through [`FocusRate::clamped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FocusRate(u8);

impl FocusRate {
    /// The maximum focus rate (100).
    pub const MAX: Self = Self(100);

    /// The minimum focus rate (0).
    pub const MIN: Self = Self(0);

    /// Creates a focus rate after validation.
    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if !(0..=100).contains(&value) {
            return Err(ValidationError::FocusRateOutOfRange { value });
        }
        Ok(Self::clamped(value))
    }

    /// Creates a focus rate, clamping to \[0, 100\].
    #[expect(clippy::cast_possible_truncation, reason = "clamped to [0, 100] first")]
    #[expect(clippy::cast_sign_loss, reason = "clamped to [0, 100] first")]
    #[must_use]
    pub const fn clamped(value: i64) -> Self {
        if value < 0 {
            Self(0)
        } else if value > 100 {
            Self(100)
        } else {
            Self(value as u8)
        }
    }

    /// Returns the inner percentage.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for FocusRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for FocusRate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FocusRate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = i64::deserialize(deserializer)?;
        Ok(Self::clamped(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_rejects_empty() {
        assert!(ConnectionId::new("").is_err());
        assert!(ConnectionId::new("conn-1").is_ok());
    }

    #[test]
    fn connection_id_serde_roundtrip() {
        let id = ConnectionId::new("conn-42").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"conn-42\"");
        let parsed: ConnectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn connection_id_serde_rejects_empty() {
        let result: Result<ConnectionId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn int_ids_are_distinct_types() {
        let class = ClassId::new(3);
        let session = SessionId::new(3);
        assert_eq!(class.value(), session.value());
        assert_eq!(class.to_string(), "3");
    }

    #[test]
    fn participant_id_serde_is_transparent() {
        let id = ParticipantId::new(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
        let parsed: ParticipantId = serde_json::from_str("7").unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn focus_rate_validates_range() {
        assert!(FocusRate::new(0).is_ok());
        assert!(FocusRate::new(50).is_ok());
        assert!(FocusRate::new(100).is_ok());
        assert!(FocusRate::new(-1).is_err());
        assert!(FocusRate::new(101).is_err());
    }

    #[test]
    fn focus_rate_clamped_handles_edge_cases() {
        assert_eq!(FocusRate::clamped(-10).value(), 0);
        assert_eq!(FocusRate::clamped(250).value(), 100);
        assert_eq!(FocusRate::clamped(73).value(), 73);
    }

    #[test]
    fn focus_rate_serde_clamps_out_of_range() {
        let parsed: FocusRate = serde_json::from_str("140").unwrap();
        assert_eq!(parsed.value(), 100);

        let parsed: FocusRate = serde_json::from_str("-5").unwrap();
        assert_eq!(parsed.value(), 0);
    }
}
