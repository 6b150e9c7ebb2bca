//! Directory collaborator contract.
//!
//! The directory owns the persistent roster (classes, students) and the
//! session-to-class mapping. The core consumes it through this trait; the
//! storage crate ships the default implementation.

use crate::error::ServiceError;
use crate::types::{ClassId, Participant, ParticipantId, SessionId};

/// What a session resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    /// The class group that owns the session.
    pub class_id: ClassId,
}

/// Roster lookups consumed by the alert router and settlement engine.
pub trait Directory: Send + Sync {
    /// Resolves a participant, or `NotFound`.
    fn resolve_participant(&self, id: ParticipantId) -> Result<Participant, ServiceError>;

    /// Lists the full roster of a class. An empty class is not an error.
    fn list_participants_for_class(&self, class: ClassId)
    -> Result<Vec<Participant>, ServiceError>;

    /// Resolves a session to its owning class, or `NotFound`.
    fn resolve_session(&self, session: SessionId) -> Result<SessionInfo, ServiceError>;
}
