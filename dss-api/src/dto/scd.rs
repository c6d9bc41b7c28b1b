//! SCD wire types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dss_core::models::geometry as core_geo;
use dss_core::models::scd;

pub const TIME_FORMAT_RFC3339: &str = "RFC3339";

/// The availability sub-protocol is not implemented; references always
/// report the unknown state.
pub const USS_AVAILABILITY_UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Time {
    pub value: DateTime<Utc>,
    pub format: String,
}

impl Time {
    pub fn new(value: DateTime<Utc>) -> Time {
        Time {
            value,
            format: TIME_FORMAT_RFC3339.to_string(),
        }
    }

    pub fn wrap(value: Option<DateTime<Utc>>) -> Option<Time> {
        value.map(Time::new)
    }

    pub fn unwrap(time: Option<Time>) -> Option<DateTime<Utc>> {
        time.map(|t| t.value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatLngPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<LatLngPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume3D {
    pub outline_polygon: Polygon,
    #[serde(default)]
    pub altitude_lower: Option<f32>,
    #[serde(default)]
    pub altitude_upper: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume4D {
    pub volume: Volume3D,
    #[serde(default)]
    pub time_start: Option<Time>,
    #[serde(default)]
    pub time_end: Option<Time>,
}

impl From<Volume4D> for core_geo::Volume4D {
    fn from(v: Volume4D) -> Self {
        core_geo::Volume4D {
            spatial_volume: core_geo::Volume3D {
                footprint: core_geo::GeoPolygon {
                    vertices: v
                        .volume
                        .outline_polygon
                        .vertices
                        .into_iter()
                        .map(|p| core_geo::LatLngPoint {
                            lat: p.lat,
                            lng: p.lng,
                        })
                        .collect(),
                },
                altitude_lo: v.volume.altitude_lower,
                altitude_hi: v.volume.altitude_upper,
            },
            start_time: Time::unwrap(v.time_start),
            end_time: Time::unwrap(v.time_end),
        }
    }
}

// ==================== Operational intents ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationalIntentReference {
    pub id: String,
    pub manager: String,
    pub uss_availability: String,
    pub version: i32,
    pub state: String,
    pub ovn: String,
    #[serde(default)]
    pub time_start: Option<Time>,
    #[serde(default)]
    pub time_end: Option<Time>,
    pub uss_base_url: String,
    pub subscription_id: String,
}

impl OperationalIntentReference {
    /// Masks the OVN unless the viewer manages the record.
    pub fn from_model(
        op: &scd::OperationalIntent,
        viewer: Option<&dss_core::models::Manager>,
    ) -> Self {
        let ovn = if viewer == Some(&op.manager) {
            op.ovn.to_string()
        } else {
            scd::NO_OVN_PHRASE.to_string()
        };
        OperationalIntentReference {
            id: op.id.to_string(),
            manager: op.manager.to_string(),
            uss_availability: USS_AVAILABILITY_UNKNOWN.to_string(),
            version: op.version,
            state: op.state.to_string(),
            ovn,
            time_start: Time::wrap(op.start_time),
            time_end: Time::wrap(op.end_time),
            uss_base_url: op.uss_base_url.clone(),
            subscription_id: op.subscription_id.to_string(),
        }
    }
}

/// Parameters for a new implicit subscription backing an operational
/// intent.
#[derive(Debug, Clone, Deserialize)]
pub struct ImplicitSubscriptionParameters {
    pub uss_base_url: String,
    #[serde(default)]
    pub notify_for_constraints: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PutOperationalIntentReferenceParameters {
    pub extents: Vec<Volume4D>,
    #[serde(default)]
    pub key: Vec<String>,
    pub state: String,
    pub uss_base_url: String,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub new_subscription: Option<ImplicitSubscriptionParameters>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub subscription_id: String,
    pub notification_index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberToNotify {
    pub uss_base_url: String,
    pub subscriptions: Vec<SubscriptionState>,
}

/// Groups bumped SCD subscriptions by their USS base URL.
pub fn subscribers_to_notify(subscriptions: &[scd::Subscription]) -> Vec<SubscriberToNotify> {
    let mut by_url: std::collections::BTreeMap<&str, Vec<SubscriptionState>> =
        std::collections::BTreeMap::new();
    for sub in subscriptions {
        by_url
            .entry(&sub.uss_base_url)
            .or_default()
            .push(SubscriptionState {
                subscription_id: sub.id.to_string(),
                notification_index: sub.notification_index,
            });
    }
    by_url
        .into_iter()
        .map(|(url, subscriptions)| SubscriberToNotify {
            uss_base_url: url.to_string(),
            subscriptions,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeOperationalIntentReferenceResponse {
    pub subscribers: Vec<SubscriberToNotify>,
    pub operational_intent_reference: OperationalIntentReference,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetOperationalIntentReferenceResponse {
    pub operational_intent_reference: OperationalIntentReference,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryOperationalIntentReferenceParameters {
    pub area_of_interest: Volume4D,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryOperationalIntentReferenceResponse {
    pub operational_intent_references: Vec<OperationalIntentReference>,
}

// ==================== Constraints ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintReference {
    pub id: String,
    pub manager: String,
    pub uss_availability: String,
    pub version: i32,
    pub ovn: String,
    #[serde(default)]
    pub time_start: Option<Time>,
    #[serde(default)]
    pub time_end: Option<Time>,
    pub uss_base_url: String,
}

impl ConstraintReference {
    pub fn from_model(
        constraint: &scd::Constraint,
        viewer: Option<&dss_core::models::Manager>,
    ) -> Self {
        let ovn = if viewer == Some(&constraint.manager) {
            constraint.ovn.to_string()
        } else {
            scd::NO_OVN_PHRASE.to_string()
        };
        ConstraintReference {
            id: constraint.id.to_string(),
            manager: constraint.manager.to_string(),
            uss_availability: USS_AVAILABILITY_UNKNOWN.to_string(),
            version: constraint.version,
            ovn,
            time_start: Time::wrap(constraint.start_time),
            time_end: Time::wrap(constraint.end_time),
            uss_base_url: constraint.uss_base_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PutConstraintReferenceParameters {
    pub extents: Vec<Volume4D>,
    pub uss_base_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeConstraintReferenceResponse {
    pub subscribers: Vec<SubscriberToNotify>,
    pub constraint_reference: ConstraintReference,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetConstraintReferenceResponse {
    pub constraint_reference: ConstraintReference,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConstraintReferenceParameters {
    pub area_of_interest: Volume4D,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryConstraintReferencesResponse {
    pub constraint_references: Vec<ConstraintReference>,
}

// ==================== Subscriptions ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub version: String,
    pub notification_index: i32,
    #[serde(default)]
    pub time_start: Option<Time>,
    #[serde(default)]
    pub time_end: Option<Time>,
    pub uss_base_url: String,
    pub notify_for_operational_intents: bool,
    pub notify_for_constraints: bool,
    pub implicit_subscription: bool,
    #[serde(default)]
    pub dependent_operational_intents: Vec<String>,
}

impl Subscription {
    pub fn from_model(sub: &scd::Subscription, dependents: &[dss_core::models::Id]) -> Self {
        Subscription {
            id: sub.id.to_string(),
            version: sub.version.to_string(),
            notification_index: sub.notification_index,
            time_start: Time::wrap(sub.start_time),
            time_end: Time::wrap(sub.end_time),
            uss_base_url: sub.uss_base_url.clone(),
            notify_for_operational_intents: sub.notify_for_operational_intents,
            notify_for_constraints: sub.notify_for_constraints,
            implicit_subscription: sub.implicit,
            dependent_operational_intents: dependents.iter().map(|d| d.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PutSubscriptionRequest {
    pub extents: Volume4D,
    pub uss_base_url: String,
    #[serde(default)]
    pub notify_for_operational_intents: bool,
    #[serde(default)]
    pub notify_for_constraints: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PutSubscriptionResponse {
    pub subscription: Subscription,
    pub operational_intent_references: Vec<OperationalIntentReference>,
    pub constraint_references: Vec<ConstraintReference>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetSubscriptionResponse {
    pub subscription: Subscription,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteSubscriptionResponse {
    pub subscription: Subscription,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuerySubscriptionParameters {
    pub area_of_interest: Volume4D,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuerySubscriptionsResponse {
    pub subscriptions: Vec<Subscription>,
}

// ==================== Conflicts ====================

/// Reference to a record blocking a write, as carried in the conflict
/// response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictingEntityReference {
    pub id: String,
    pub manager: String,
    pub ovn: String,
}

impl From<&scd::EntityOvnRef> for ConflictingEntityReference {
    fn from(r: &scd::EntityOvnRef) -> Self {
        ConflictingEntityReference {
            id: r.id.to_string(),
            manager: r.manager.to_string(),
            ovn: r.ovn.to_string(),
        }
    }
}

/// Body returned instead of the standard error envelope when a write is
/// blocked on missing OVNs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirspaceConflictResponse {
    pub message: String,
    pub missing_operational_intents: Vec<ConflictingEntityReference>,
    pub missing_constraints: Vec<ConflictingEntityReference>,
}
