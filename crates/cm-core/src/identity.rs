//! Identity collaborator contract.
//!
//! Token issuance and credential storage live in an external identity
//! service; the core only consumes validation to authorize settlement and
//! ingestion calls.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::types::ValidationError;

/// Caller roles recognized by the monitoring backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Teacher => "TEACHER",
            Self::Student => "STUDENT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEACHER" => Ok(Self::Teacher),
            "STUDENT" => Ok(Self::Student),
            _ => Err(ValidationError::InvalidRole {
                value: s.to_string(),
            }),
        }
    }
}

/// The authenticated caller behind an opaque bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Opaque subject identifier assigned by the identity service.
    pub subject: String,
    pub role: Role,
}

/// Opaque bearer-token validation.
pub trait Identity: Send + Sync {
    /// Returns the principal behind the token, or `None` for an invalid or
    /// expired token.
    fn validate(&self, token: &str) -> Option<Principal>;
}

/// Validates a token and requires the given role.
pub fn authorize(
    identity: &dyn Identity,
    token: &str,
    required: Role,
) -> Result<Principal, ServiceError> {
    let principal = identity
        .validate(token)
        .ok_or_else(|| ServiceError::Unauthorized("invalid or expired token".to_string()))?;
    if principal.role != required {
        return Err(ServiceError::Unauthorized(format!(
            "{} role required",
            required
        )));
    }
    Ok(principal)
}
