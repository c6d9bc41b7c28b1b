//! Aux endpoints

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Extension, Json, Router};

use dss_core::models::Owner;

use crate::dto::aux::{ValidateOauthQuery, ValidateOauthResponse, VersionResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/aux/v1/version", get(version))
        .route("/aux/v1/validate_oauth", get(validate_oauth))
}

/// Reports the running build's version.
pub async fn version(State(state): State<AppState>) -> Json<VersionResponse> {
    Json(VersionResponse {
        version: state.aux.version().to_string(),
    })
}

/// Confirms the caller's token was accepted by this DSS instance.
pub async fn validate_oauth(
    State(state): State<AppState>,
    Extension(owner): Extension<Owner>,
    Query(query): Query<ValidateOauthQuery>,
) -> ApiResult<Json<ValidateOauthResponse>> {
    let owner = state.aux.validate_oauth(&owner, query.owner.as_deref())?;
    Ok(Json(ValidateOauthResponse {
        owner: owner.to_string(),
    }))
}
