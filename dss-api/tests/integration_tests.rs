//! Router-level integration tests
//!
//! These cover the parts of the frame that never reach the database: the
//! health endpoint, the authorization boundary, the error envelope, and
//! the aux surface. Flows that need PostgreSQL live in `scd_flow.rs`.

use std::collections::HashMap;
use std::sync::Arc;

use axum_test::TestServer;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use serde_json::Value;

use dss_api::auth::{Authorizer, VerificationKey};
use dss_api::server::{create_router, ServerConfig};
use dss_api::{routes, AppState};
use dss_db::Store;

const SECRET: &[u8] = b"test-secret-for-integration-tests";

#[derive(Serialize)]
struct TestClaims<'a> {
    sub: &'a str,
    scope: &'a str,
    exp: u64,
}

fn token(sub: &str, scope: &str) -> String {
    let claims = TestClaims {
        sub,
        scope,
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as u64,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET),
    )
    .unwrap()
}

fn bearer(token: &str) -> axum::http::HeaderValue {
    axum::http::HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
}

fn test_server(enable_scd: bool) -> TestServer {
    // The pool is lazy: these tests never touch the database.
    let store = Arc::new(Store::connect_lazy("postgres://localhost/dss_unused", 3).unwrap());
    let authorizer = Authorizer::for_testing(
        vec![VerificationKey::from_secret(SECRET)],
        routes::scopes_registry(enable_scd),
        vec![],
    );
    let state = AppState::new(store, authorizer, "test-writer".to_string());
    let config = ServerConfig {
        enable_scd,
        ..ServerConfig::default()
    };
    TestServer::new(create_router(state, &config)).unwrap()
}

// ============ Health ============

#[tokio::test]
async fn test_healthy_needs_no_token() {
    let server = test_server(false);
    let response = server.get("/healthy").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "ok");
}

// ============ Authorization boundary ============

#[tokio::test]
async fn test_missing_token_yields_envelope() {
    let server = test_server(false);
    let response = server
        .get("/v1/dss/identification_service_areas/9d158f59-80b7-4dd9-870e-f2013508a9d9")
        .await;
    response.assert_status_unauthorized();

    let body: Value = response.json();
    assert_eq!(body["message"], "Missing access token");
    assert_eq!(body["error"], "Missing access token");
    assert_eq!(body["code"], 16);
    assert!(body["error_id"].as_str().unwrap().starts_with("E:"));
}

#[tokio::test]
async fn test_insufficient_scope_names_expectation() {
    let server = test_server(false);
    let response = server
        .put("/v1/dss/identification_service_areas/9d158f59-80b7-4dd9-870e-f2013508a9d9")
        .add_header(
            axum::http::header::AUTHORIZATION,
            bearer(&token("uss1", "dss.read.identification_service_areas")),
        )
        .json(&serde_json::json!({}))
        .await;
    response.assert_status_forbidden();

    let body: Value = response.json();
    let message = body["message"].as_str().unwrap();
    assert!(
        message.contains("dss.write.identification_service_areas"),
        "message: {message}"
    );
    assert!(message.contains("missing scopes"), "message: {message}");
}

#[tokio::test]
async fn test_bad_token_rejected() {
    let server = test_server(false);
    let response = server
        .get("/v1/dss/identification_service_areas/9d158f59-80b7-4dd9-870e-f2013508a9d9")
        .add_header(
            axum::http::header::AUTHORIZATION,
            bearer("not-even-a-jwt"),
        )
        .await;
    response.assert_status_unauthorized();
}

// ============ Surface registration ============

#[tokio::test]
async fn test_scd_surface_absent_when_disabled() {
    let server = test_server(false);
    let response = server
        .post("/dss/v1/operational_intent_references/query")
        .add_header(
            axum::http::header::AUTHORIZATION,
            bearer(&token("uss1", "utm.strategic_coordination")),
        )
        .json(&serde_json::json!({}))
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn test_scd_surface_present_when_enabled() {
    let server = test_server(true);
    // Malformed body: the route exists, so the failure is a client error
    // rather than a 404.
    let response = server
        .post("/dss/v1/operational_intent_references/query")
        .add_header(
            axum::http::header::AUTHORIZATION,
            bearer(&token("uss1", "utm.strategic_coordination")),
        )
        .json(&serde_json::json!({}))
        .await;
    assert_ne!(response.status_code(), 404);
}

// ============ Aux ============

#[tokio::test]
async fn test_aux_version() {
    let server = test_server(false);
    let response = server
        .get("/aux/v1/version")
        .add_header(axum::http::header::AUTHORIZATION, bearer(&token("uss1", "")))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert!(!body["version"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_aux_validate_oauth() {
    let server = test_server(false);
    let response = server
        .get("/aux/v1/validate_oauth")
        .add_header(axum::http::header::AUTHORIZATION, bearer(&token("uss1", "")))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["owner"], "uss1");

    let mismatch = server
        .get("/aux/v1/validate_oauth?owner=uss2")
        .add_header(axum::http::header::AUTHORIZATION, bearer(&token("uss1", "")))
        .await;
    mismatch.assert_status_forbidden();
}

// ============ Request validation before the store ============

#[tokio::test]
async fn test_invalid_id_rejected_before_db() {
    let server = test_server(false);
    let response = server
        .get("/v1/dss/identification_service_areas/not-a-uuid")
        .add_header(
            axum::http::header::AUTHORIZATION,
            bearer(&token("uss1", "dss.read.identification_service_areas")),
        )
        .await;
    response.assert_status_bad_request();
    let body: Value = response.json();
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Invalid ID format"));
}

#[tokio::test]
async fn test_search_rejects_odd_area() {
    let server = test_server(false);
    let response = server
        .get("/v1/dss/identification_service_areas?area=37.42,-122.17,37.40")
        .add_header(
            axum::http::header::AUTHORIZATION,
            bearer(&token("uss1", "dss.read.identification_service_areas")),
        )
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_search_rejects_oversized_area() {
    let server = test_server(false);
    let response = server
        .get("/v1/dss/identification_service_areas?area=30,-120,30,-110,40,-110,40,-120")
        .add_header(
            axum::http::header::AUTHORIZATION,
            bearer(&token("uss1", "dss.read.identification_service_areas")),
        )
        .await;
    assert_eq!(response.status_code(), 413);
}
