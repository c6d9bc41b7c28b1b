//! SCD endpoints

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};

use dss_core::models::scd::{OperationalIntentState, Ovn};
use dss_core::models::{Id, Owner};
use dss_core::DssError;

use crate::dto::scd::{
    subscribers_to_notify, ChangeConstraintReferenceResponse,
    ChangeOperationalIntentReferenceResponse, ConstraintReference, DeleteSubscriptionResponse,
    GetConstraintReferenceResponse, GetOperationalIntentReferenceResponse,
    GetSubscriptionResponse, OperationalIntentReference, PutConstraintReferenceParameters,
    PutOperationalIntentReferenceParameters, PutSubscriptionRequest, PutSubscriptionResponse,
    QueryConstraintReferenceParameters, QueryConstraintReferencesResponse,
    QueryOperationalIntentReferenceParameters, QueryOperationalIntentReferenceResponse,
    QuerySubscriptionParameters, QuerySubscriptionsResponse, Subscription,
};
use crate::error::ApiResult;
use crate::services::scd::{NewSubscriptionParams, PutOperationalIntentParams};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/dss/v1/operational_intent_references/query",
            post(query_operational_intents),
        )
        .route(
            "/dss/v1/operational_intent_references/:entityid",
            get(get_operational_intent).put(create_operational_intent),
        )
        .route(
            "/dss/v1/operational_intent_references/:entityid/:ovn",
            put(update_operational_intent).delete(delete_operational_intent),
        )
        .route(
            "/dss/v1/constraint_references/query",
            post(query_constraints),
        )
        .route(
            "/dss/v1/constraint_references/:entityid",
            get(get_constraint).put(create_constraint),
        )
        .route(
            "/dss/v1/constraint_references/:entityid/:ovn",
            put(update_constraint).delete(delete_constraint),
        )
        .route("/dss/v1/subscriptions/query", post(query_subscriptions))
        .route(
            "/dss/v1/subscriptions/:subscriptionid",
            get(get_subscription).put(create_subscription),
        )
        .route(
            "/dss/v1/subscriptions/:subscriptionid/:version",
            put(update_subscription).delete(delete_subscription),
        )
}

fn intent_params(
    req: PutOperationalIntentReferenceParameters,
) -> Result<PutOperationalIntentParams, DssError> {
    let state = OperationalIntentState::parse(&req.state)?;
    let subscription_id = req
        .subscription_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(Id::parse)
        .transpose()?;
    Ok(PutOperationalIntentParams {
        extents: req.extents.into_iter().map(Into::into).collect(),
        keys: req.key.into_iter().map(Ovn).collect(),
        state,
        uss_base_url: req.uss_base_url,
        subscription_id,
        new_subscription: req.new_subscription.map(|s| NewSubscriptionParams {
            uss_base_url: s.uss_base_url,
            notify_for_constraints: s.notify_for_constraints,
        }),
    })
}

// ==================== Operational intents ====================

pub async fn create_operational_intent(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(entityid): Path<String>,
    Json(req): Json<PutOperationalIntentReferenceParameters>,
) -> ApiResult<Json<ChangeOperationalIntentReferenceResponse>> {
    put_operational_intent(state, owner, entityid, String::new(), req).await
}

pub async fn update_operational_intent(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path((entityid, ovn)): Path<(String, String)>,
    Json(req): Json<PutOperationalIntentReferenceParameters>,
) -> ApiResult<Json<ChangeOperationalIntentReferenceResponse>> {
    put_operational_intent(state, owner, entityid, ovn, req).await
}

async fn put_operational_intent(
    state: AppState,
    owner: Owner,
    entityid: String,
    ovn: String,
    req: PutOperationalIntentReferenceParameters,
) -> ApiResult<Json<ChangeOperationalIntentReferenceResponse>> {
    let id = Id::parse(&entityid)?;
    let params = intent_params(req)?;
    let (intent, subscribers) = state
        .scd
        .put_operational_intent(&owner, id, &ovn, &params)
        .await?;
    Ok(Json(ChangeOperationalIntentReferenceResponse {
        subscribers: subscribers_to_notify(&subscribers),
        operational_intent_reference: OperationalIntentReference::from_model(
            &intent,
            Some(&owner),
        ),
    }))
}

pub async fn get_operational_intent(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(entityid): Path<String>,
) -> ApiResult<Json<GetOperationalIntentReferenceResponse>> {
    let id = Id::parse(&entityid)?;
    let intent = state.scd.get_operational_intent(id).await?;
    Ok(Json(GetOperationalIntentReferenceResponse {
        operational_intent_reference: OperationalIntentReference::from_model(
            &intent,
            Some(&owner),
        ),
    }))
}

pub async fn delete_operational_intent(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path((entityid, ovn)): Path<(String, String)>,
) -> ApiResult<Json<ChangeOperationalIntentReferenceResponse>> {
    let id = Id::parse(&entityid)?;
    let (intent, subscribers) = state
        .scd
        .delete_operational_intent(&owner, id, &ovn)
        .await?;
    Ok(Json(ChangeOperationalIntentReferenceResponse {
        subscribers: subscribers_to_notify(&subscribers),
        operational_intent_reference: OperationalIntentReference::from_model(
            &intent,
            Some(&owner),
        ),
    }))
}

pub async fn query_operational_intents(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Json(req): Json<QueryOperationalIntentReferenceParameters>,
) -> ApiResult<Json<QueryOperationalIntentReferenceResponse>> {
    let aoi = req.area_of_interest.into();
    let intents = state.scd.query_operational_intents(&aoi).await?;
    Ok(Json(QueryOperationalIntentReferenceResponse {
        operational_intent_references: intents
            .iter()
            .map(|o| OperationalIntentReference::from_model(o, Some(&owner)))
            .collect(),
    }))
}

// ==================== Constraints ====================

pub async fn create_constraint(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(entityid): Path<String>,
    Json(req): Json<PutConstraintReferenceParameters>,
) -> ApiResult<Json<ChangeConstraintReferenceResponse>> {
    put_constraint(state, owner, entityid, String::new(), req).await
}

pub async fn update_constraint(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path((entityid, ovn)): Path<(String, String)>,
    Json(req): Json<PutConstraintReferenceParameters>,
) -> ApiResult<Json<ChangeConstraintReferenceResponse>> {
    put_constraint(state, owner, entityid, ovn, req).await
}

async fn put_constraint(
    state: AppState,
    owner: Owner,
    entityid: String,
    ovn: String,
    req: PutConstraintReferenceParameters,
) -> ApiResult<Json<ChangeConstraintReferenceResponse>> {
    let id = Id::parse(&entityid)?;
    let extents: Vec<_> = req.extents.into_iter().map(Into::into).collect();
    let (constraint, subscribers) = state
        .scd
        .put_constraint(&owner, id, &ovn, &extents, &req.uss_base_url)
        .await?;
    Ok(Json(ChangeConstraintReferenceResponse {
        subscribers: subscribers_to_notify(&subscribers),
        constraint_reference: ConstraintReference::from_model(&constraint, Some(&owner)),
    }))
}

pub async fn get_constraint(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(entityid): Path<String>,
) -> ApiResult<Json<GetConstraintReferenceResponse>> {
    let id = Id::parse(&entityid)?;
    let constraint = state.scd.get_constraint(id).await?;
    Ok(Json(GetConstraintReferenceResponse {
        constraint_reference: ConstraintReference::from_model(&constraint, Some(&owner)),
    }))
}

pub async fn delete_constraint(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path((entityid, ovn)): Path<(String, String)>,
) -> ApiResult<Json<ChangeConstraintReferenceResponse>> {
    let id = Id::parse(&entityid)?;
    let (constraint, subscribers) = state.scd.delete_constraint(&owner, id, &ovn).await?;
    Ok(Json(ChangeConstraintReferenceResponse {
        subscribers: subscribers_to_notify(&subscribers),
        constraint_reference: ConstraintReference::from_model(&constraint, Some(&owner)),
    }))
}

pub async fn query_constraints(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Json(req): Json<QueryConstraintReferenceParameters>,
) -> ApiResult<Json<QueryConstraintReferencesResponse>> {
    let aoi = req.area_of_interest.into();
    let constraints = state.scd.query_constraints(&aoi).await?;
    Ok(Json(QueryConstraintReferencesResponse {
        constraint_references: constraints
            .iter()
            .map(|c| ConstraintReference::from_model(c, Some(&owner)))
            .collect(),
    }))
}

// ==================== Subscriptions ====================

pub async fn create_subscription(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(subscriptionid): Path<String>,
    Json(req): Json<PutSubscriptionRequest>,
) -> ApiResult<Json<PutSubscriptionResponse>> {
    put_subscription(state, owner, subscriptionid, String::new(), req).await
}

pub async fn update_subscription(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path((subscriptionid, version)): Path<(String, String)>,
    Json(req): Json<PutSubscriptionRequest>,
) -> ApiResult<Json<PutSubscriptionResponse>> {
    put_subscription(state, owner, subscriptionid, version, req).await
}

async fn put_subscription(
    state: AppState,
    owner: Owner,
    subscriptionid: String,
    version: String,
    req: PutSubscriptionRequest,
) -> ApiResult<Json<PutSubscriptionResponse>> {
    let id = Id::parse(&subscriptionid)?;
    let extents = req.extents.into();
    let (subscription, dependents, intents, constraints) = state
        .scd
        .put_subscription(
            &owner,
            id,
            &version,
            &extents,
            &req.uss_base_url,
            req.notify_for_operational_intents,
            req.notify_for_constraints,
        )
        .await?;
    Ok(Json(PutSubscriptionResponse {
        subscription: Subscription::from_model(&subscription, &dependents),
        operational_intent_references: intents
            .iter()
            .map(|o| OperationalIntentReference::from_model(o, Some(&owner)))
            .collect(),
        constraint_references: constraints
            .iter()
            .map(|c| ConstraintReference::from_model(c, Some(&owner)))
            .collect(),
    }))
}

pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(subscriptionid): Path<String>,
) -> ApiResult<Json<GetSubscriptionResponse>> {
    let id = Id::parse(&subscriptionid)?;
    let (subscription, dependents) = state.scd.get_subscription(&owner, id).await?;
    Ok(Json(GetSubscriptionResponse {
        subscription: Subscription::from_model(&subscription, &dependents),
    }))
}

pub async fn delete_subscription(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path((subscriptionid, version)): Path<(String, String)>,
) -> ApiResult<Json<DeleteSubscriptionResponse>> {
    let id = Id::parse(&subscriptionid)?;
    let subscription = state.scd.delete_subscription(&owner, id, &version).await?;
    Ok(Json(DeleteSubscriptionResponse {
        subscription: Subscription::from_model(&subscription, &[]),
    }))
}

pub async fn query_subscriptions(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Json(req): Json<QuerySubscriptionParameters>,
) -> ApiResult<Json<QuerySubscriptionsResponse>> {
    let aoi = req.area_of_interest.into();
    let subscriptions = state.scd.query_subscriptions(&owner, &aoi).await?;
    Ok(Json(QuerySubscriptionsResponse {
        subscriptions: subscriptions
            .iter()
            .map(|(sub, dependents)| Subscription::from_model(sub, dependents))
            .collect(),
    }))
}
