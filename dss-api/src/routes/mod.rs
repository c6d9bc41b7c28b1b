//! Route tables and per-operation scope registry
//!
//! Operations are keyed as "METHOD /route/pattern"; the same strings index
//! both the axum router and the authorizer's scope registry, so a route
//! cannot be added without deciding its scope requirement.

pub mod aux;
pub mod health;
pub mod rid_v1;
pub mod rid_v2;
pub mod scd;

use std::collections::HashMap;

use axum::middleware;
use axum::routing::get;
use axum::Router;

use crate::auth::{self, require_all_scopes, require_any_scope, ScopesValidator};
use crate::state::AppState;

// RID v1 scopes.
pub const SCOPE_RID_READ: &str = "dss.read.identification_service_areas";
pub const SCOPE_RID_WRITE: &str = "dss.write.identification_service_areas";

// RID v2 scopes.
pub const SCOPE_RID_V2_DISPLAY_PROVIDER: &str = "rid.display_provider";
pub const SCOPE_RID_V2_SERVICE_PROVIDER: &str = "rid.service_provider";

// SCD scopes.
pub const SCOPE_STRATEGIC_COORDINATION: &str = "utm.strategic_coordination";
pub const SCOPE_CONSTRAINT_MANAGEMENT: &str = "utm.constraint_management";
pub const SCOPE_CONSTRAINT_PROCESSING: &str = "utm.constraint_processing";

/// Builds the complete router. The SCD surface is only mounted when
/// enabled; `/healthy` stays outside the authorization boundary.
pub fn create_router(state: AppState, enable_scd: bool) -> Router {
    let mut authed = Router::new()
        .merge(rid_v1::router())
        .merge(rid_v2::router())
        .merge(aux::router());
    if enable_scd {
        authed = authed.merge(scd::router());
    }
    let authed = authed.route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_auth,
    ));

    Router::new()
        .route("/healthy", get(health::healthy))
        .merge(authed)
        .with_state(state)
}

/// Scope requirements for every authorized operation.
pub fn scopes_registry(enable_scd: bool) -> HashMap<String, ScopesValidator> {
    let mut registry = HashMap::new();

    // RID v1: display providers hold the read scope and manage
    // subscriptions with it; service providers hold the write scope.
    for operation in [
        "GET /v1/dss/identification_service_areas",
        "GET /v1/dss/identification_service_areas/:id",
    ] {
        registry.insert(
            operation.to_string(),
            require_any_scope(&[SCOPE_RID_READ, SCOPE_RID_WRITE]),
        );
    }
    for operation in [
        "PUT /v1/dss/identification_service_areas/:id",
        "PUT /v1/dss/identification_service_areas/:id/:version",
        "DELETE /v1/dss/identification_service_areas/:id/:version",
    ] {
        registry.insert(operation.to_string(), require_all_scopes(&[SCOPE_RID_WRITE]));
    }
    for operation in [
        "GET /v1/dss/subscriptions",
        "GET /v1/dss/subscriptions/:id",
        "PUT /v1/dss/subscriptions/:id",
        "PUT /v1/dss/subscriptions/:id/:version",
        "DELETE /v1/dss/subscriptions/:id/:version",
    ] {
        registry.insert(operation.to_string(), require_all_scopes(&[SCOPE_RID_READ]));
    }

    // RID v2.
    for operation in [
        "GET /rid/v2/dss/identification_service_areas",
        "GET /rid/v2/dss/identification_service_areas/:id",
    ] {
        registry.insert(
            operation.to_string(),
            require_any_scope(&[
                SCOPE_RID_V2_DISPLAY_PROVIDER,
                SCOPE_RID_V2_SERVICE_PROVIDER,
            ]),
        );
    }
    for operation in [
        "PUT /rid/v2/dss/identification_service_areas/:id",
        "PUT /rid/v2/dss/identification_service_areas/:id/:version",
        "DELETE /rid/v2/dss/identification_service_areas/:id/:version",
    ] {
        registry.insert(
            operation.to_string(),
            require_all_scopes(&[SCOPE_RID_V2_SERVICE_PROVIDER]),
        );
    }
    for operation in [
        "GET /rid/v2/dss/subscriptions",
        "GET /rid/v2/dss/subscriptions/:id",
        "PUT /rid/v2/dss/subscriptions/:id",
        "PUT /rid/v2/dss/subscriptions/:id/:version",
        "DELETE /rid/v2/dss/subscriptions/:id/:version",
    ] {
        registry.insert(
            operation.to_string(),
            require_all_scopes(&[SCOPE_RID_V2_DISPLAY_PROVIDER]),
        );
    }

    if enable_scd {
        for operation in [
            "PUT /dss/v1/operational_intent_references/:entityid",
            "PUT /dss/v1/operational_intent_references/:entityid/:ovn",
            "GET /dss/v1/operational_intent_references/:entityid",
            "DELETE /dss/v1/operational_intent_references/:entityid/:ovn",
            "POST /dss/v1/operational_intent_references/query",
            "PUT /dss/v1/subscriptions/:subscriptionid",
            "PUT /dss/v1/subscriptions/:subscriptionid/:version",
            "GET /dss/v1/subscriptions/:subscriptionid",
            "DELETE /dss/v1/subscriptions/:subscriptionid/:version",
            "POST /dss/v1/subscriptions/query",
        ] {
            registry.insert(
                operation.to_string(),
                require_all_scopes(&[SCOPE_STRATEGIC_COORDINATION]),
            );
        }
        for operation in [
            "PUT /dss/v1/constraint_references/:entityid",
            "PUT /dss/v1/constraint_references/:entityid/:ovn",
            "DELETE /dss/v1/constraint_references/:entityid/:ovn",
        ] {
            registry.insert(
                operation.to_string(),
                require_all_scopes(&[SCOPE_CONSTRAINT_MANAGEMENT]),
            );
        }
        for operation in [
            "GET /dss/v1/constraint_references/:entityid",
            "POST /dss/v1/constraint_references/query",
        ] {
            registry.insert(
                operation.to_string(),
                require_any_scope(&[SCOPE_CONSTRAINT_MANAGEMENT, SCOPE_CONSTRAINT_PROCESSING]),
            );
        }
    }

    // Aux operations require a valid token but no particular scope, so
    // they are absent from the registry.

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_scd_only_when_enabled() {
        let without = scopes_registry(false);
        assert!(!without
            .keys()
            .any(|k| k.contains("operational_intent_references")));
        let with = scopes_registry(true);
        assert!(with
            .keys()
            .any(|k| k.contains("operational_intent_references")));
        assert!(with.len() > without.len());
    }

    #[test]
    fn test_constraint_read_accepts_either_scope() {
        let registry = scopes_registry(true);
        let validator = registry
            .get("GET /dss/v1/constraint_references/:entityid")
            .unwrap();
        assert_eq!(
            validator.expectation(),
            format!("{SCOPE_CONSTRAINT_MANAGEMENT} or {SCOPE_CONSTRAINT_PROCESSING}")
        );
    }
}
