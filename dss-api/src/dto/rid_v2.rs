//! RID v2 wire types
//!
//! v2 renames the ISA callback to `uss_base_url` and wraps timestamps in
//! `{value, format}` objects; the underlying records are shared with v1.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dss_core::models::geometry as core_geo;
use dss_core::models::rid;

pub const TIME_FORMAT_RFC3339: &str = "RFC3339";

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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentificationServiceArea {
    pub id: String,
    pub owner: String,
    pub uss_base_url: String,
    #[serde(default)]
    pub time_start: Option<Time>,
    #[serde(default)]
    pub time_end: Option<Time>,
    pub version: String,
}

impl From<&rid::IdentificationServiceArea> for IdentificationServiceArea {
    fn from(isa: &rid::IdentificationServiceArea) -> Self {
        IdentificationServiceArea {
            id: isa.id.to_string(),
            owner: isa.owner.to_string(),
            uss_base_url: isa.url.clone(),
            time_start: Time::wrap(isa.start_time),
            time_end: Time::wrap(isa.end_time),
            version: isa.version.as_ref().map(|v| v.to_wire()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub subscription_id: String,
    pub notification_index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberToNotify {
    pub subscriptions: Vec<SubscriptionState>,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub owner: String,
    pub uss_base_url: String,
    pub notification_index: i32,
    #[serde(default)]
    pub time_start: Option<Time>,
    #[serde(default)]
    pub time_end: Option<Time>,
    pub version: String,
}

impl From<&rid::Subscription> for Subscription {
    fn from(sub: &rid::Subscription) -> Self {
        Subscription {
            id: sub.id.to_string(),
            owner: sub.owner.to_string(),
            uss_base_url: sub.url.clone(),
            notification_index: sub.notification_index,
            time_start: Time::wrap(sub.start_time),
            time_end: Time::wrap(sub.end_time),
            version: sub.version.as_ref().map(|v| v.to_wire()).unwrap_or_default(),
        }
    }
}

/// Groups bumped subscriptions by callback URL.
pub fn subscribers_to_notify(subscriptions: &[rid::Subscription]) -> Vec<SubscriberToNotify> {
    let mut by_url: std::collections::BTreeMap<&str, Vec<SubscriptionState>> =
        std::collections::BTreeMap::new();
    for sub in subscriptions {
        by_url.entry(&sub.url).or_default().push(SubscriptionState {
            subscription_id: sub.id.to_string(),
            notification_index: sub.notification_index,
        });
    }
    by_url
        .into_iter()
        .map(|(url, subscriptions)| SubscriberToNotify {
            url: url.to_string(),
            subscriptions,
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PutIdentificationServiceAreaRequest {
    pub extents: Volume4D,
    pub uss_base_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PutIdentificationServiceAreaResponse {
    pub service_area: IdentificationServiceArea,
    pub subscribers: Vec<SubscriberToNotify>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteIdentificationServiceAreaResponse {
    pub service_area: IdentificationServiceArea,
    pub subscribers: Vec<SubscriberToNotify>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchIdentificationServiceAreasResponse {
    pub service_areas: Vec<IdentificationServiceArea>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PutSubscriptionRequest {
    pub extents: Volume4D,
    pub uss_base_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PutSubscriptionResponse {
    pub subscription: Subscription,
    pub service_areas: Vec<IdentificationServiceArea>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetSubscriptionResponse {
    pub subscription: Subscription,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteSubscriptionResponse {
    pub subscription: Subscription,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchSubscriptionsResponse {
    pub subscriptions: Vec<Subscription>,
}
