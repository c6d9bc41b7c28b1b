//! RID v1 endpoints

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Extension, Json, Router};

use dss_core::models::{Id, Owner};

use crate::dto::rid_v1::{
    subscribers_to_notify, DeleteIdentificationServiceAreaResponse,
    DeleteSubscriptionResponse, GetSubscriptionResponse, IdentificationServiceArea,
    PutIdentificationServiceAreaRequest, PutIdentificationServiceAreaResponse,
    PutSubscriptionRequest, PutSubscriptionResponse, SearchIdentificationServiceAreasResponse,
    SearchSubscriptionsResponse, Subscription,
};
use crate::dto::{parse_area, SearchQuery};
use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/dss/identification_service_areas", get(search_isas))
        .route(
            "/v1/dss/identification_service_areas/:id",
            get(get_isa).put(create_isa),
        )
        .route(
            "/v1/dss/identification_service_areas/:id/:version",
            put(update_isa).delete(delete_isa),
        )
        .route("/v1/dss/subscriptions", get(search_subscriptions))
        .route(
            "/v1/dss/subscriptions/:id",
            get(get_subscription).put(create_subscription),
        )
        .route(
            "/v1/dss/subscriptions/:id/:version",
            put(update_subscription).delete(delete_subscription),
        )
}

// ==================== ISAs ====================

pub async fn create_isa(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(id): Path<String>,
    Json(req): Json<PutIdentificationServiceAreaRequest>,
) -> ApiResult<Json<PutIdentificationServiceAreaResponse>> {
    put_isa(state, owner, id, String::new(), req).await
}

pub async fn update_isa(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path((id, version)): Path<(String, String)>,
    Json(req): Json<PutIdentificationServiceAreaRequest>,
) -> ApiResult<Json<PutIdentificationServiceAreaResponse>> {
    put_isa(state, owner, id, version, req).await
}

async fn put_isa(
    state: AppState,
    owner: Owner,
    id: String,
    version: String,
    req: PutIdentificationServiceAreaRequest,
) -> ApiResult<Json<PutIdentificationServiceAreaResponse>> {
    let id = Id::parse(&id)?;
    let extents = req.extents.into();
    let (isa, subscribers) = state
        .rid
        .put_isa(&owner, id, &version, &extents, &req.flights_url)
        .await?;
    Ok(Json(PutIdentificationServiceAreaResponse {
        service_area: (&isa).into(),
        subscribers: subscribers_to_notify(&subscribers),
    }))
}

pub async fn get_isa(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<IdentificationServiceArea>> {
    let id = Id::parse(&id)?;
    let isa = state.rid.get_isa(id).await?;
    Ok(Json((&isa).into()))
}

pub async fn delete_isa(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path((id, version)): Path<(String, String)>,
) -> ApiResult<Json<DeleteIdentificationServiceAreaResponse>> {
    let id = Id::parse(&id)?;
    let (isa, subscribers) = state.rid.delete_isa(&owner, id, &version).await?;
    Ok(Json(DeleteIdentificationServiceAreaResponse {
        service_area: (&isa).into(),
        subscribers: subscribers_to_notify(&subscribers),
    }))
}

pub async fn search_isas(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchIdentificationServiceAreasResponse>> {
    let area = parse_area(&query.area)?;
    let isas = state
        .rid
        .search_isas(&area, query.earliest_time, query.latest_time)
        .await?;
    Ok(Json(SearchIdentificationServiceAreasResponse {
        service_areas: isas.iter().map(Into::into).collect(),
    }))
}

// ==================== Subscriptions ====================

pub async fn create_subscription(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(id): Path<String>,
    Json(req): Json<PutSubscriptionRequest>,
) -> ApiResult<Json<PutSubscriptionResponse>> {
    put_subscription(state, owner, id, String::new(), req).await
}

pub async fn update_subscription(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path((id, version)): Path<(String, String)>,
    Json(req): Json<PutSubscriptionRequest>,
) -> ApiResult<Json<PutSubscriptionResponse>> {
    put_subscription(state, owner, id, version, req).await
}

async fn put_subscription(
    state: AppState,
    owner: Owner,
    id: String,
    version: String,
    req: PutSubscriptionRequest,
) -> ApiResult<Json<PutSubscriptionResponse>> {
    let id = Id::parse(&id)?;
    let url = req
        .callbacks
        .identification_service_area_url
        .unwrap_or_default();
    let extents = req.extents.into();
    let (subscription, service_areas) = state
        .rid
        .put_subscription(&owner, id, &version, &extents, &url)
        .await?;
    Ok(Json(PutSubscriptionResponse {
        subscription: (&subscription).into(),
        service_areas: service_areas.iter().map(Into::into).collect(),
    }))
}

pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path(id): Path<String>,
) -> ApiResult<Json<GetSubscriptionResponse>> {
    let id = Id::parse(&id)?;
    let subscription = state.rid.get_subscription(&owner, id).await?;
    Ok(Json(GetSubscriptionResponse {
        subscription: (&subscription).into(),
    }))
}

pub async fn delete_subscription(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Path((id, version)): Path<(String, String)>,
) -> ApiResult<Json<DeleteSubscriptionResponse>> {
    let id = Id::parse(&id)?;
    let subscription = state.rid.delete_subscription(&owner, id, &version).await?;
    Ok(Json(DeleteSubscriptionResponse {
        subscription: (&subscription).into(),
    }))
}

pub async fn search_subscriptions(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchSubscriptionsResponse>> {
    let area = parse_area(&query.area)?;
    let subscriptions = state.rid.search_subscriptions(&owner, &area).await?;
    Ok(Json(SearchSubscriptionsResponse {
        subscriptions: subscriptions.iter().map(Subscription::from).collect(),
    }))
}
