//! Service-level flows against a live PostgreSQL
//!
//! Run with a scratch database:
//!
//! ```text
//! DSS_TEST_DATABASE_URL=postgres://localhost/dss_test \
//!     cargo test -p dss-api -- --ignored
//! ```
//!
//! Every test uses fresh random IDs so reruns do not collide.

use std::sync::Arc;

use chrono::{Duration, Utc};

use dss_api::services::scd::{NewSubscriptionParams, PutOperationalIntentParams};
use dss_api::services::{RidService, ScdService};
use dss_core::models::geometry::{GeoPolygon, LatLngPoint, Volume3D, Volume4D};
use dss_core::models::scd::OperationalIntentState;
use dss_core::models::{Id, Owner};
use dss_core::DssError;
use dss_db::Store;

async fn test_store() -> Arc<Store> {
    let url = std::env::var("DSS_TEST_DATABASE_URL")
        .expect("DSS_TEST_DATABASE_URL must point at a scratch database");
    let store = Store::connect(&url, 3).await.expect("connect test database");
    store.init_schema().await.expect("apply schema");
    Arc::new(store)
}

fn unique_owner(prefix: &str) -> Owner {
    Owner::new(format!("{prefix}-{}", Id::new_random()))
}

fn triangle() -> GeoPolygon {
    GeoPolygon {
        vertices: vec![
            LatLngPoint { lat: 37.427636, lng: -122.170502 },
            LatLngPoint { lat: 37.408799, lng: -122.064069 },
            LatLngPoint { lat: 37.421265, lng: -122.086504 },
        ],
    }
}

fn extents(minutes_from_now: i64, duration_min: i64) -> Volume4D {
    let start = Utc::now() + Duration::minutes(minutes_from_now);
    Volume4D {
        spatial_volume: Volume3D {
            footprint: triangle(),
            altitude_lo: Some(0.0),
            altitude_hi: Some(120.0),
        },
        start_time: Some(start),
        end_time: Some(start + Duration::minutes(duration_min)),
    }
}

fn intent_params(keys: Vec<dss_core::models::scd::Ovn>) -> PutOperationalIntentParams {
    PutOperationalIntentParams {
        extents: vec![extents(1, 60)],
        keys,
        state: OperationalIntentState::Accepted,
        uss_base_url: "https://uss.example.com/utm".to_string(),
        subscription_id: None,
        new_subscription: Some(NewSubscriptionParams {
            uss_base_url: "https://uss.example.com/utm".to_string(),
            notify_for_constraints: false,
        }),
    }
}

#[tokio::test]
#[ignore = "requires DSS_TEST_DATABASE_URL"]
async fn test_create_then_conflict() {
    let store = test_store().await;
    let scd = ScdService::new(store);
    let uss1 = unique_owner("scenario-uss1");
    let uss2 = unique_owner("scenario-uss2");

    // A standing subscription observing the area.
    let sub_id = Id::new_random();
    let (watcher, _, _, _) = scd
        .put_subscription(
            &uss1,
            sub_id,
            "",
            &extents(0, 120),
            "https://uss1.example.com/utm",
            true,
            false,
        )
        .await
        .expect("create watching subscription");
    let base_index = watcher.notification_index;

    // First intent lands with no keys: nothing else overlaps... unless a
    // previous run left records behind, in which case keys are collected
    // from the conflict and the write retried.
    let a_id = Id::new_random();
    let a = match scd
        .put_operational_intent(&uss1, a_id, "", &intent_params(vec![]))
        .await
    {
        Ok((a, _)) => a,
        Err(DssError::MissingOvns(conflict)) => {
            let keys = conflict
                .missing_operational_intents
                .iter()
                .chain(conflict.missing_constraints.iter())
                .map(|r| r.ovn.clone())
                .collect();
            scd.put_operational_intent(&uss1, a_id, "", &intent_params(keys))
                .await
                .expect("create intent A with collected keys")
                .0
        }
        Err(e) => panic!("create intent A: {e}"),
    };
    let ovn1 = a.ovn.clone();

    // Second overlapping intent without keys is blocked, and the conflict
    // names A at its current OVN.
    let b_id = Id::new_random();
    let err = scd
        .put_operational_intent(&uss2, b_id, "", &intent_params(vec![]))
        .await
        .expect_err("intent B without keys must be blocked");
    let conflict = match err {
        DssError::MissingOvns(conflict) => conflict,
        other => panic!("expected MissingOvns, got {other}"),
    };
    let a_ref = conflict
        .missing_operational_intents
        .iter()
        .find(|r| r.id == a_id)
        .expect("conflict must reference intent A");
    assert_eq!(a_ref.ovn, ovn1);

    // Re-put with the collected keys succeeds and yields a fresh OVN.
    let keys = conflict
        .missing_operational_intents
        .iter()
        .chain(conflict.missing_constraints.iter())
        .map(|r| r.ovn.clone())
        .collect();
    let (b, subscribers) = scd
        .put_operational_intent(&uss2, b_id, "", &intent_params(keys))
        .await
        .expect("intent B with keys");
    assert_ne!(b.ovn, ovn1);

    // The watcher saw both writes.
    let watcher_state = subscribers
        .iter()
        .find(|s| s.id == sub_id)
        .expect("watcher must be notified");
    assert_eq!(watcher_state.notification_index, base_index + 2);
}

#[tokio::test]
#[ignore = "requires DSS_TEST_DATABASE_URL"]
async fn test_rid_version_discipline() {
    let store = test_store().await;
    let rid = RidService::new(store, "test-writer".to_string());
    let owner = unique_owner("scenario-uss1");
    let id = Id::new_random();

    let (sub, _) = rid
        .put_subscription(&owner, id, "", &extents(0, 60), "https://uss1.example.com/rid")
        .await
        .expect("create subscription");
    let version = sub.version.expect("stored subscription carries a version");

    // Creating over an existing record is rejected.
    let err = rid
        .put_subscription(&owner, id, "", &extents(0, 60), "https://uss1.example.com/rid")
        .await
        .expect_err("second create must fail");
    assert!(matches!(err, DssError::AlreadyExists(_)), "got {err}");

    // A stale or garbage version is rejected.
    let err = rid
        .put_subscription(
            &owner,
            id,
            "garbage",
            &extents(0, 60),
            "https://uss1.example.com/rid",
        )
        .await
        .expect_err("garbage version must fail");
    assert!(matches!(err, DssError::VersionMismatch(_)), "got {err}");

    // The current version is accepted, and the version advances.
    let (updated, _) = rid
        .put_subscription(
            &owner,
            id,
            &version.to_wire(),
            &extents(0, 60),
            "https://uss1.example.com/rid",
        )
        .await
        .expect("update at current version");
    assert_ne!(updated.version.unwrap().to_wire(), version.to_wire());
}

#[tokio::test]
#[ignore = "requires DSS_TEST_DATABASE_URL"]
async fn test_cross_manager_protection() {
    let store = test_store().await;
    let rid = RidService::new(store, "test-writer".to_string());
    let owner = unique_owner("scenario-uss1");
    let intruder = unique_owner("scenario-uss2");
    let id = Id::new_random();

    let (sub, _) = rid
        .put_subscription(&owner, id, "", &extents(0, 60), "https://uss1.example.com/rid")
        .await
        .expect("create subscription");
    let version = sub.version.unwrap().to_wire();

    let err = rid
        .delete_subscription(&intruder, id, &version)
        .await
        .expect_err("foreign delete must fail");
    assert!(matches!(err, DssError::PermissionDenied(_)), "got {err}");

    // The record is untouched and the owner can still read it.
    let still_there = rid
        .get_subscription(&owner, id)
        .await
        .expect("owner read after foreign delete");
    assert_eq!(still_there.id, id);
}

#[tokio::test]
#[ignore = "requires DSS_TEST_DATABASE_URL"]
async fn test_isa_write_notifies_overlapping_subscription() {
    let store = test_store().await;
    let rid = RidService::new(store, "test-writer".to_string());
    let provider = unique_owner("scenario-provider");
    let display = unique_owner("scenario-display");

    let sub_id = Id::new_random();
    let (sub, _) = rid
        .put_subscription(
            &display,
            sub_id,
            "",
            &extents(0, 120),
            "https://display.example.com/rid",
        )
        .await
        .expect("create subscription");
    let base_index = sub.notification_index;

    let isa_id = Id::new_random();
    let (isa, subscribers) = rid
        .put_isa(
            &provider,
            isa_id,
            "",
            &extents(1, 60),
            "https://provider.example.com/flights",
        )
        .await
        .expect("create ISA");
    assert!(isa.version.is_some());

    let notified = subscribers
        .iter()
        .find(|s| s.id == sub_id)
        .expect("overlapping subscription must be notified");
    assert_eq!(notified.notification_index, base_index + 1);
    assert_eq!(notified.url, "https://display.example.com/rid");

    // The subscriber's view of the area includes the new ISA.
    let (_, isas) = rid
        .put_subscription(
            &display,
            sub_id,
            &notified.version.as_ref().unwrap().to_wire(),
            &extents(0, 120),
            "https://display.example.com/rid",
        )
        .await
        .expect("refresh subscription");
    assert!(isas.iter().any(|found| found.id == isa_id));
}
