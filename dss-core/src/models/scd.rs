//! Strategic Conflict Detection records
//!
//! Operational intents, constraints and SCD subscriptions are versioned with
//! Opaque Version Numbers (OVNs). An OVN is derived from the record ID and
//! the store-produced update timestamp, so holding a record's current OVN
//! proves the holder has read that exact revision.

use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{DssError, DssResult};
use crate::geo::CellUnion;
use crate::models::{Id, Manager, Version};

/// Placeholder substituted for OVNs of records the caller does not manage.
pub const NO_OVN_PHRASE: &str = "Available from USS";

/// Opaque Version Number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ovn(pub String);

impl Ovn {
    /// Derives the OVN bound to (entity ID, updated-at).
    pub fn from_time(id: &Id, updated_at: DateTime<Utc>) -> Ovn {
        let salted = format!(
            "{}{}",
            id,
            updated_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
        );
        let digest = Sha256::digest(salted.as_bytes());
        Ovn(base64::engine::general_purpose::STANDARD.encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Optimistic-concurrency checks treat an OVN as the opaque dialect of
/// [`Version`], sharing its `matches` discipline with the RID timestamp
/// tokens.
impl From<&Ovn> for Version {
    fn from(ovn: &Ovn) -> Version {
        Version::Opaque(ovn.0.clone())
    }
}

impl std::fmt::Display for Ovn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operational-intent lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationalIntentState {
    Accepted,
    Activated,
    Nonconforming,
    Contingent,
}

impl OperationalIntentState {
    /// Whether a transition into this state must prove awareness of every
    /// conflicting record by supplying its OVN. Off-nominal states are
    /// exempt: an aircraft already out of conformance cannot be blocked on
    /// a coordination handshake.
    pub fn requires_key(&self) -> bool {
        !matches!(
            self,
            OperationalIntentState::Nonconforming | OperationalIntentState::Contingent
        )
    }

    /// Whether the DSS accepts a PUT targeting this state. All four states
    /// are settable; the variant exists so unknown wire strings fail parse
    /// rather than write.
    pub fn is_valid_in_dss(&self) -> bool {
        true
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationalIntentState::Accepted => "Accepted",
            OperationalIntentState::Activated => "Activated",
            OperationalIntentState::Nonconforming => "Nonconforming",
            OperationalIntentState::Contingent => "Contingent",
        }
    }

    pub fn parse(s: &str) -> DssResult<OperationalIntentState> {
        match s {
            "Accepted" => Ok(OperationalIntentState::Accepted),
            "Activated" => Ok(OperationalIntentState::Activated),
            "Nonconforming" => Ok(OperationalIntentState::Nonconforming),
            "Contingent" => Ok(OperationalIntentState::Contingent),
            other => Err(DssError::BadRequest(format!(
                "Invalid operational intent state: `{other}`"
            ))),
        }
    }

    /// Validates a state transition requested through the DSS.
    ///
    /// Nominal states only interchange with each other; any state may fall
    /// off-nominal. An off-nominal flight ends by deletion, not by
    /// returning to a nominal state.
    pub fn can_transition_to(&self, next: OperationalIntentState) -> bool {
        use OperationalIntentState::*;
        match next {
            Nonconforming | Contingent => true,
            Accepted | Activated => matches!(self, Accepted | Activated),
        }
    }
}

impl std::fmt::Display for OperationalIntentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A planned or active flight volume.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationalIntent {
    pub id: Id,
    pub manager: Manager,
    /// Wire version counter, incremented on every revision.
    pub version: i32,
    pub state: OperationalIntentState,
    pub ovn: Ovn,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub uss_base_url: String,
    pub subscription_id: Id,
    pub altitude_lo: Option<f32>,
    pub altitude_hi: Option<f32>,
    pub cells: CellUnion,
}

impl OperationalIntent {
    /// Validates the §3 time invariants for a new revision.
    pub fn validate_time_range(&self) -> DssResult<()> {
        let start = self.start_time.ok_or_else(|| {
            DssError::BadRequest("Operational intent must have a time_start".to_string())
        })?;
        let end = self.end_time.ok_or_else(|| {
            DssError::BadRequest("Operational intent must have a time_end".to_string())
        })?;
        if end < start {
            return Err(DssError::BadRequest(
                "Operational intent time_end must be after time_start".to_string(),
            ));
        }
        Ok(())
    }

    /// Reference carried in conflict details, with the OVN masked unless
    /// the viewer manages the record.
    pub fn to_ref(&self, viewer: Option<&Manager>) -> EntityOvnRef {
        EntityOvnRef {
            id: self.id,
            manager: self.manager.clone(),
            ovn: if viewer == Some(&self.manager) {
                self.ovn.clone()
            } else {
                Ovn(NO_OVN_PHRASE.to_string())
            },
        }
    }
}

/// A restricted airspace volume.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub id: Id,
    pub manager: Manager,
    pub version: i32,
    pub uss_base_url: String,
    pub altitude_lo: Option<f32>,
    pub altitude_hi: Option<f32>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub cells: CellUnion,
    pub ovn: Ovn,
}

impl Constraint {
    pub fn to_ref(&self, viewer: Option<&Manager>) -> EntityOvnRef {
        EntityOvnRef {
            id: self.id,
            manager: self.manager.clone(),
            ovn: if viewer == Some(&self.manager) {
                self.ovn.clone()
            } else {
                Ovn(NO_OVN_PHRASE.to_string())
            },
        }
    }
}

/// SCD subscription: a volume of interest plus notification triggers.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: Id,
    pub manager: Manager,
    pub version: Ovn,
    pub notify_for_operational_intents: bool,
    pub notify_for_constraints: bool,
    pub uss_base_url: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub altitude_lo: Option<f32>,
    pub altitude_hi: Option<f32>,
    pub cells: CellUnion,
    pub notification_index: i32,
    /// True when the subscription only exists to back an operational
    /// intent and dies with it.
    pub implicit: bool,
}

impl Subscription {
    /// At least one notification trigger must be requested.
    pub fn validate_triggers(&self) -> DssResult<()> {
        if !self.notify_for_operational_intents && !self.notify_for_constraints {
            return Err(DssError::BadRequest(
                "No notification triggers requested for Subscription".to_string(),
            ));
        }
        Ok(())
    }
}

/// (ID, manager, OVN) reference to a blocking record, carried in
/// airspace-conflict details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityOvnRef {
    pub id: Id,
    pub manager: Manager,
    pub ovn: Ovn,
}

/// Computes the key-check result for a write in a `requires_key` state:
/// which blocking references are not proven by the supplied keys.
pub fn missing_ovns<'a, I>(required: I, keys: &[Ovn]) -> Vec<EntityOvnRef>
where
    I: IntoIterator<Item = &'a EntityOvnRef>,
{
    required
        .into_iter()
        .filter(|r| !keys.contains(&r.ovn))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn id() -> Id {
        Id::parse("9d158f59-80b7-4dd9-870e-f2013508a9d9").unwrap()
    }

    #[test]
    fn test_ovn_binds_id_and_time() {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let a = Ovn::from_time(&id(), t);
        let b = Ovn::from_time(&id(), t);
        assert_eq!(a, b);
        let later = Ovn::from_time(&id(), t + chrono::Duration::nanoseconds(1));
        assert_ne!(a, later);
        let other = Ovn::from_time(&Id::new_random(), t);
        assert_ne!(a, other);
    }

    #[test]
    fn test_requires_key() {
        assert!(OperationalIntentState::Accepted.requires_key());
        assert!(OperationalIntentState::Activated.requires_key());
        assert!(!OperationalIntentState::Nonconforming.requires_key());
        assert!(!OperationalIntentState::Contingent.requires_key());
    }

    #[test]
    fn test_state_parse() {
        assert_eq!(
            OperationalIntentState::parse("Accepted").unwrap(),
            OperationalIntentState::Accepted
        );
        assert!(OperationalIntentState::parse("Ended").is_err());
        assert!(OperationalIntentState::parse("accepted").is_err());
    }

    #[test]
    fn test_transitions() {
        use OperationalIntentState::*;
        assert!(Accepted.can_transition_to(Activated));
        assert!(Activated.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(Nonconforming));
        assert!(Contingent.can_transition_to(Contingent));
        assert!(!Nonconforming.can_transition_to(Activated));
    }

    #[test]
    fn test_missing_ovns() {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let blocker = EntityOvnRef {
            id: id(),
            manager: Manager::new("uss2"),
            ovn: Ovn::from_time(&id(), t),
        };
        let required = vec![blocker.clone()];

        let missing = missing_ovns(&required, &[]);
        assert_eq!(missing, vec![blocker.clone()]);

        let missing = missing_ovns(&required, &[blocker.ovn.clone()]);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_ref_masks_foreign_ovn() {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let intent = OperationalIntent {
            id: id(),
            manager: Manager::new("uss1"),
            version: 1,
            state: OperationalIntentState::Accepted,
            ovn: Ovn::from_time(&id(), t),
            start_time: Some(t),
            end_time: Some(t + chrono::Duration::hours(1)),
            uss_base_url: "https://uss1.example.com".to_string(),
            subscription_id: Id::new_random(),
            altitude_lo: None,
            altitude_hi: None,
            cells: CellUnion::default(),
        };
        let own = intent.to_ref(Some(&Manager::new("uss1")));
        assert_eq!(own.ovn, intent.ovn);
        let foreign = intent.to_ref(Some(&Manager::new("uss2")));
        assert_eq!(foreign.ovn.as_str(), NO_OVN_PHRASE);
    }

    #[test]
    fn test_subscription_triggers() {
        let sub = Subscription {
            id: id(),
            manager: Manager::new("uss1"),
            version: Ovn(String::new()),
            notify_for_operational_intents: false,
            notify_for_constraints: false,
            uss_base_url: "https://uss1.example.com".to_string(),
            start_time: None,
            end_time: None,
            altitude_lo: None,
            altitude_hi: None,
            cells: CellUnion::default(),
            notification_index: 0,
            implicit: false,
        };
        assert!(sub.validate_triggers().is_err());
        let mut ok = sub;
        ok.notify_for_constraints = true;
        assert!(ok.validate_triggers().is_ok());
    }
}
