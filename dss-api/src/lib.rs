//! DSS API layer
//!
//! One service per wire surface (RID v1, RID v2, SCD, Aux), an authorizer
//! that gates every operation on scope-bearing bearer tokens, and the axum
//! frame that dispatches requests and serializes the structured error
//! envelope.

pub mod auth;
pub mod dto;
pub mod error;
pub mod routes;
pub mod server;
pub mod services;
pub mod state;

pub use auth::{Authorizer, AuthorizerConfig, KeyResolver, ScopesValidator};
pub use error::{ApiError, ApiResult};
pub use server::{create_router, run_server, ServerConfig};
pub use state::AppState;
