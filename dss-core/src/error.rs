//! Internal error taxonomy
//!
//! Every layer maps its failures into [`DssError`]; the API crate derives
//! the HTTP status and wire code from [`ErrorKind`]. Layers add one sentence
//! of context on the way up via [`DssError::context`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::scd::EntityOvnRef;

/// Structured detail carried by [`DssError::MissingOvns`].
///
/// Lists every record that blocks the attempted write; the caller must read
/// each one at its current version and resubmit with the collected OVNs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirspaceConflict {
    pub message: String,
    pub missing_operational_intents: Vec<EntityOvnRef>,
    pub missing_constraints: Vec<EntityOvnRef>,
}

/// DSS error kinds, used for wire-code and HTTP-status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    AlreadyExists,
    VersionMismatch,
    PermissionDenied,
    Unauthenticated,
    MissingOvns,
    AreaTooLarge,
    Exhausted,
    Unavailable,
    Internal,
}

/// DSS errors
#[derive(Error, Debug)]
pub enum DssError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    VersionMismatch(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{}", .0.message)]
    MissingOvns(AirspaceConflict),

    #[error("{0}")]
    AreaTooLarge(String),

    #[error("{0}")]
    Exhausted(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl DssError {
    /// The kind of this error, for status mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DssError::BadRequest(_) => ErrorKind::BadRequest,
            DssError::NotFound(_) => ErrorKind::NotFound,
            DssError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            DssError::VersionMismatch(_) => ErrorKind::VersionMismatch,
            DssError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            DssError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            DssError::MissingOvns(_) => ErrorKind::MissingOvns,
            DssError::AreaTooLarge(_) => ErrorKind::AreaTooLarge,
            DssError::Exhausted(_) => ErrorKind::Exhausted,
            DssError::Unavailable(_) => ErrorKind::Unavailable,
            DssError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Prepend one sentence of context, preserving the kind.
    ///
    /// [`DssError::MissingOvns`] keeps its structured detail untouched; the
    /// context goes into the human message.
    pub fn context(self, msg: &str) -> Self {
        match self {
            DssError::BadRequest(m) => DssError::BadRequest(format!("{msg}: {m}")),
            DssError::NotFound(m) => DssError::NotFound(format!("{msg}: {m}")),
            DssError::AlreadyExists(m) => DssError::AlreadyExists(format!("{msg}: {m}")),
            DssError::VersionMismatch(m) => DssError::VersionMismatch(format!("{msg}: {m}")),
            DssError::PermissionDenied(m) => DssError::PermissionDenied(format!("{msg}: {m}")),
            DssError::Unauthenticated(m) => DssError::Unauthenticated(format!("{msg}: {m}")),
            DssError::MissingOvns(mut c) => {
                c.message = format!("{msg}: {}", c.message);
                DssError::MissingOvns(c)
            }
            DssError::AreaTooLarge(m) => DssError::AreaTooLarge(format!("{msg}: {m}")),
            DssError::Exhausted(m) => DssError::Exhausted(format!("{msg}: {m}")),
            DssError::Unavailable(m) => DssError::Unavailable(format!("{msg}: {m}")),
            DssError::Internal(m) => DssError::Internal(format!("{msg}: {m}")),
        }
    }
}

impl From<serde_json::Error> for DssError {
    fn from(err: serde_json::Error) -> Self {
        DssError::Internal(format!("Serialization error: {err}"))
    }
}

/// Result type alias for DSS operations
pub type DssResult<T> = Result<T, DssError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_preserves_kind() {
        let err = DssError::NotFound("Subscription x not found".to_string());
        let err = err.context("Could not get Subscription from repo");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("Subscription x not found"));
        assert!(err.to_string().starts_with("Could not get Subscription"));
    }

    #[test]
    fn test_missing_ovns_keeps_detail() {
        let conflict = AirspaceConflict {
            message: "at least one OVN missing".to_string(),
            missing_operational_intents: vec![],
            missing_constraints: vec![],
        };
        let err = DssError::MissingOvns(conflict).context("Failed to put operational intent");
        match err {
            DssError::MissingOvns(c) => {
                assert!(c.message.starts_with("Failed to put operational intent"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
