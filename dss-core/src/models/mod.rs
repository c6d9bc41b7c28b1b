//! Record model shared by every API surface

pub mod geometry;
pub mod rid;
pub mod scd;

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DssError, DssResult};

/// Maximum number of records returned by any spatial search.
pub const MAX_RESULT_LIMIT: i64 = 10_000;

/// Grace period after a record's end time before it becomes collectable.
pub const EXPIRED_DURATION_MINUTES: i64 = 30;

/// Record identifier. UUID, immutable for the life of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub Uuid);

impl Id {
    pub fn parse(s: &str) -> DssResult<Id> {
        Uuid::parse_str(s)
            .map(Id)
            .map_err(|_| DssError::BadRequest(format!("Invalid ID format: `{s}`")))
    }

    pub fn new_random() -> Id {
        Id(Uuid::new_v4())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The USS that owns a record, extracted from the token subject claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Owner(pub String);

impl Owner {
    pub fn new(s: impl Into<String>) -> Self {
        Owner(s.into())
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Alias of [`Owner`] in SCD vocabulary.
pub type Manager = Owner;

/// Optimistic-concurrency token stamped by the store on every write.
///
/// Two dialects coexist and are deliberately not unified on the wire: RID
/// carries the update timestamp itself, SCD derives a content-bound opaque
/// string ([`scd::Ovn`]) that enters concurrency checks as the `Opaque`
/// variant. Both satisfy: a write succeeds iff the version supplied equals
/// the record's current version.
#[derive(Debug, Clone, PartialEq)]
pub enum Version {
    /// RID dialect: last-updated-at, microsecond precision.
    Timestamp(DateTime<Utc>),
    /// SCD dialect: opaque string.
    Opaque(String),
}

impl Version {
    /// RID version for a store-produced update timestamp.
    pub fn from_time(t: DateTime<Utc>) -> Version {
        Version::Timestamp(t)
    }

    /// The wire form: RFC 3339 with microsecond precision, or the opaque
    /// string unchanged.
    pub fn to_wire(&self) -> String {
        match self {
            Version::Timestamp(t) => t.to_rfc3339_opts(SecondsFormat::Micros, true),
            Version::Opaque(s) => s.clone(),
        }
    }

    /// Uniform optimistic-concurrency check against a client-supplied token.
    pub fn matches(&self, expected: &str) -> bool {
        self.to_wire() == expected
    }

    /// Recovers the update timestamp carried by a RID version token.
    pub fn to_timestamp(expected: &str) -> DssResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(expected)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| DssError::VersionMismatch(format!("Version `{expected}` is not valid")))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}

/// Validates the shared put/delete preconditions for versioned records.
///
/// `existing` carries the current manager and wire version when a record
/// with the same ID is already stored; `supplied_version` is the client's
/// token, empty on a creation attempt.
pub fn validate_put_preconditions(
    entity: &str,
    id: &Id,
    existing: Option<(&Owner, &str)>,
    caller: &Owner,
    supplied_version: &str,
) -> DssResult<()> {
    match existing {
        None => {
            if !supplied_version.is_empty() {
                // An update was requested but there is nothing to update.
                return Err(DssError::NotFound(format!("{entity} {id} not found")));
            }
        }
        Some((manager, current_version)) => {
            if manager != caller {
                return Err(DssError::PermissionDenied(format!(
                    "{entity} is owned by different client: owned by {manager}, but {caller} attempted to modify"
                )));
            }
            if supplied_version.is_empty() {
                return Err(DssError::AlreadyExists(format!(
                    "{entity} {id} already exists"
                )));
            }
            if supplied_version != current_version {
                return Err(DssError::VersionMismatch(format!(
                    "{entity} version {supplied_version} is not current (current version is {current_version})"
                )));
            }
        }
    }
    Ok(())
}

/// Validates a USS base URL: https, no query, no fragment.
pub fn validate_uss_base_url(url: &str) -> DssResult<()> {
    if !url.starts_with("https://") {
        return Err(DssError::BadRequest(format!(
            "USS base URL `{url}` must use https"
        )));
    }
    if url.contains('?') || url.contains('#') {
        return Err(DssError::BadRequest(format!(
            "USS base URL `{url}` must not carry a query or fragment"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn id() -> Id {
        Id::parse("9d158f59-80b7-4dd9-870e-f2013508a9d9").unwrap()
    }

    #[test]
    fn test_id_parse_rejects_garbage() {
        assert!(Id::parse("not-a-uuid").is_err());
        assert!(Id::parse("").is_err());
        assert_eq!(id().to_string(), "9d158f59-80b7-4dd9-870e-f2013508a9d9");
    }

    #[test]
    fn test_version_wire_precision() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
            + chrono::Duration::microseconds(123_456);
        let v = Version::from_time(t);
        let wire = v.to_wire();
        assert_eq!(wire, "2024-03-01T12:00:00.123456Z");
        assert!(v.matches(&wire));
        assert!(!v.matches("2024-03-01T12:00:00.123457Z"));
        assert_eq!(Version::to_timestamp(&wire).unwrap(), t);
    }

    #[test]
    fn test_opaque_version_matches() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let ovn = scd::Ovn::from_time(&id(), t);
        let v = Version::from(&ovn);
        assert_eq!(v.to_wire(), ovn.as_str());
        assert!(v.matches(ovn.as_str()));
        assert!(!v.matches("Available from USS"));
        assert!(!v.matches(""));

        // The two dialects never match each other's tokens.
        let timestamped = Version::from_time(t);
        assert!(!timestamped.matches(ovn.as_str()));
    }

    #[test]
    fn test_put_preconditions_create() {
        let caller = Owner::new("uss1");
        assert!(validate_put_preconditions("Subscription", &id(), None, &caller, "").is_ok());
    }

    #[test]
    fn test_put_preconditions_update_of_missing_record() {
        let caller = Owner::new("uss1");
        let err =
            validate_put_preconditions("Subscription", &id(), None, &caller, "some-version")
                .unwrap_err();
        assert!(matches!(err, DssError::NotFound(_)));
    }

    #[test]
    fn test_put_preconditions_create_over_existing() {
        let caller = Owner::new("uss1");
        let err = validate_put_preconditions(
            "Subscription",
            &id(),
            Some((&caller, "v1")),
            &caller,
            "",
        )
        .unwrap_err();
        assert!(matches!(err, DssError::AlreadyExists(_)));
    }

    #[test]
    fn test_put_preconditions_version_mismatch() {
        let caller = Owner::new("uss1");
        let err = validate_put_preconditions(
            "Subscription",
            &id(),
            Some((&caller, "v1")),
            &caller,
            "garbage",
        )
        .unwrap_err();
        assert!(matches!(err, DssError::VersionMismatch(_)));
    }

    #[test]
    fn test_put_preconditions_cross_manager() {
        let owner = Owner::new("uss1");
        let intruder = Owner::new("uss2");
        let err = validate_put_preconditions(
            "Subscription",
            &id(),
            Some((&owner, "v1")),
            &intruder,
            "v1",
        )
        .unwrap_err();
        assert!(matches!(err, DssError::PermissionDenied(_)));
    }

    #[test]
    fn test_uss_base_url_validation() {
        assert!(validate_uss_base_url("https://uss.example.com/rid").is_ok());
        assert!(validate_uss_base_url("http://uss.example.com").is_err());
        assert!(validate_uss_base_url("https://uss.example.com/x?y=1").is_err());
    }
}
