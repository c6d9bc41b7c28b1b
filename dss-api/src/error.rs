//! HTTP error envelope
//!
//! Every failed request serializes `{error, message, code, error_id}`; the
//! `error_id` is logged next to the full error chain so operators can
//! correlate a client report with the server-side context, which is never
//! sent to the client. The SCD missing-OVN conflict instead serializes an
//! `AirspaceConflictResponse` carrying the blocking references.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use dss_core::error::AirspaceConflict;
use dss_core::{DssError, ErrorKind};

use crate::dto::scd::AirspaceConflictResponse;

/// Standard wire error body.
#[derive(Debug, Serialize)]
pub struct StandardErrorResponse {
    pub error: String,
    pub message: String,
    pub code: i32,
    pub error_id: String,
}

/// API-layer error wrapper carrying the internal error up to the frame.
#[derive(Debug)]
pub struct ApiError(pub DssError);

impl From<DssError> for ApiError {
    fn from(err: DssError) -> Self {
        ApiError(err)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// HTTP status for each internal error kind.
pub fn http_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::VersionMismatch => StatusCode::CONFLICT,
        ErrorKind::MissingOvns => StatusCode::CONFLICT,
        ErrorKind::AreaTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::Exhausted => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Numeric wire code for each internal error kind. Standard kinds reuse
/// the gRPC code space; DSS-specific kinds extend it.
pub fn wire_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::NotFound => 5,
        ErrorKind::AlreadyExists => 6,
        ErrorKind::PermissionDenied => 7,
        ErrorKind::Exhausted => 8,
        ErrorKind::BadRequest => 3,
        ErrorKind::Internal => 13,
        ErrorKind::Unavailable => 14,
        ErrorKind::Unauthenticated => 16,
        ErrorKind::AreaTooLarge => 18,
        ErrorKind::MissingOvns => 19,
        ErrorKind::VersionMismatch => 20,
    }
}

fn make_error_id() -> String {
    format!("E:{}", Uuid::new_v4())
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = http_status(kind);
        let error_id = make_error_id();

        if let DssError::MissingOvns(conflict) = &self.0 {
            error!(
                %error_id,
                code = wire_code(kind),
                intents = conflict.missing_operational_intents.len(),
                constraints = conflict.missing_constraints.len(),
                "Request blocked on missing OVNs"
            );
            let body = airspace_conflict_response(conflict);
            return (status, Json(body)).into_response();
        }

        let message = self.0.to_string();
        error!(%error_id, code = wire_code(kind), %message, "Request failed");

        let body = StandardErrorResponse {
            error: message.clone(),
            message,
            code: wire_code(kind),
            error_id,
        };
        (status, Json(body)).into_response()
    }
}

fn airspace_conflict_response(conflict: &AirspaceConflict) -> AirspaceConflictResponse {
    AirspaceConflictResponse {
        message: conflict.message.clone(),
        missing_operational_intents: conflict
            .missing_operational_intents
            .iter()
            .map(Into::into)
            .collect(),
        missing_constraints: conflict.missing_constraints.iter().map(Into::into).collect(),
    }
}

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table() {
        assert_eq!(http_status(ErrorKind::BadRequest), StatusCode::BAD_REQUEST);
        assert_eq!(
            http_status(ErrorKind::Unauthenticated),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            http_status(ErrorKind::PermissionDenied),
            StatusCode::FORBIDDEN
        );
        assert_eq!(http_status(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(http_status(ErrorKind::AlreadyExists), StatusCode::CONFLICT);
        assert_eq!(http_status(ErrorKind::VersionMismatch), StatusCode::CONFLICT);
        assert_eq!(http_status(ErrorKind::MissingOvns), StatusCode::CONFLICT);
        assert_eq!(
            http_status(ErrorKind::AreaTooLarge),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            http_status(ErrorKind::Exhausted),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            http_status(ErrorKind::Unavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            http_status(ErrorKind::Internal),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_wire_codes_are_distinct() {
        let kinds = [
            ErrorKind::BadRequest,
            ErrorKind::NotFound,
            ErrorKind::AlreadyExists,
            ErrorKind::VersionMismatch,
            ErrorKind::PermissionDenied,
            ErrorKind::Unauthenticated,
            ErrorKind::MissingOvns,
            ErrorKind::AreaTooLarge,
            ErrorKind::Exhausted,
            ErrorKind::Unavailable,
            ErrorKind::Internal,
        ];
        let codes: std::collections::HashSet<i32> = kinds.iter().map(|k| wire_code(*k)).collect();
        assert_eq!(codes.len(), kinds.len());
    }
}
