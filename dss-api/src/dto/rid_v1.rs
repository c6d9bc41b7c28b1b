//! RID v1 wire types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dss_core::models::geometry as core_geo;
use dss_core::models::rid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatLngPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoPolygon {
    pub vertices: Vec<LatLngPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume3D {
    pub footprint: GeoPolygon,
    #[serde(default)]
    pub altitude_lo: Option<f32>,
    #[serde(default)]
    pub altitude_hi: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume4D {
    pub spatial_volume: Volume3D,
    #[serde(default)]
    pub time_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_end: Option<DateTime<Utc>>,
}

impl From<Volume4D> for core_geo::Volume4D {
    fn from(v: Volume4D) -> Self {
        core_geo::Volume4D {
            spatial_volume: core_geo::Volume3D {
                footprint: core_geo::GeoPolygon {
                    vertices: v
                        .spatial_volume
                        .footprint
                        .vertices
                        .into_iter()
                        .map(|p| core_geo::LatLngPoint {
                            lat: p.lat,
                            lng: p.lng,
                        })
                        .collect(),
                },
                altitude_lo: v.spatial_volume.altitude_lo,
                altitude_hi: v.spatial_volume.altitude_hi,
            },
            start_time: v.time_start,
            end_time: v.time_end,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentificationServiceArea {
    pub id: String,
    pub owner: String,
    pub flights_url: String,
    #[serde(default)]
    pub time_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_end: Option<DateTime<Utc>>,
    pub version: String,
}

impl From<&rid::IdentificationServiceArea> for IdentificationServiceArea {
    fn from(isa: &rid::IdentificationServiceArea) -> Self {
        IdentificationServiceArea {
            id: isa.id.to_string(),
            owner: isa.owner.to_string(),
            flights_url: isa.url.clone(),
            time_start: isa.start_time,
            time_end: isa.end_time,
            version: isa.version.as_ref().map(|v| v.to_wire()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub subscription_id: String,
    pub notification_index: i32,
}

/// One subscriber URL with every subscription of theirs that was bumped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberToNotify {
    pub subscriptions: Vec<SubscriptionState>,
    pub url: String,
}

/// Groups bumped subscriptions by callback URL.
pub fn subscribers_to_notify(subscriptions: &[rid::Subscription]) -> Vec<SubscriberToNotify> {
    let mut by_url: BTreeMap<&str, Vec<SubscriptionState>> = BTreeMap::new();
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionCallbacks {
    #[serde(default)]
    pub identification_service_area_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub owner: String,
    pub callbacks: SubscriptionCallbacks,
    pub notification_index: i32,
    #[serde(default)]
    pub time_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_end: Option<DateTime<Utc>>,
    pub version: String,
}

impl From<&rid::Subscription> for Subscription {
    fn from(sub: &rid::Subscription) -> Self {
        Subscription {
            id: sub.id.to_string(),
            owner: sub.owner.to_string(),
            callbacks: SubscriptionCallbacks {
                identification_service_area_url: Some(sub.url.clone()),
            },
            notification_index: sub.notification_index,
            time_start: sub.start_time,
            time_end: sub.end_time,
            version: sub.version.as_ref().map(|v| v.to_wire()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PutIdentificationServiceAreaRequest {
    pub extents: Volume4D,
    pub flights_url: String,
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
    pub callbacks: SubscriptionCallbacks,
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

#[cfg(test)]
mod tests {
    use super::*;
    use dss_core::geo::CellUnion;
    use dss_core::models::{Id, Owner};

    fn sub(url: &str, id: &str, index: i32) -> rid::Subscription {
        rid::Subscription {
            id: Id::parse(id).unwrap(),
            owner: Owner::new("uss1"),
            url: url.to_string(),
            notification_index: index,
            cells: CellUnion::default(),
            start_time: None,
            end_time: None,
            writer: String::new(),
            version: None,
        }
    }

    #[test]
    fn test_subscribers_grouped_by_url() {
        let subs = vec![
            sub(
                "https://a.example.com",
                "9d158f59-80b7-4dd9-870e-f2013508a9d9",
                3,
            ),
            sub(
                "https://b.example.com",
                "3d5ea2e9-36db-4fb1-be09-c8d7ae9dd606",
                1,
            ),
            sub(
                "https://a.example.com",
                "e77dbe9d-b4a5-41ac-9c1e-9c24b0d637f1",
                7,
            ),
        ];
        let grouped = subscribers_to_notify(&subs);
        assert_eq!(grouped.len(), 2);
        let a = grouped
            .iter()
            .find(|g| g.url == "https://a.example.com")
            .unwrap();
        assert_eq!(a.subscriptions.len(), 2);
    }
}
