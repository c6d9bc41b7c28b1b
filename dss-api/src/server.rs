//! Server setup
//!
//! Builds the router, binds the listener, and touches `service.ready` in
//! the working directory once the process can accept traffic, which is the
//! readiness signal container orchestration watches for.

use std::net::SocketAddr;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use dss_core::{DssError, DssResult};

use crate::routes;
use crate::state::AppState;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen endpoint.
    pub address: String,
    /// Gates registration of the SCD surface.
    pub enable_scd: bool,
    /// Logs request/response pairs when set.
    pub trace_requests: bool,
    /// Permissive CORS for browser-based display applications.
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: "0.0.0.0:8080".to_string(),
            enable_scd: false,
            trace_requests: false,
            enable_cors: false,
        }
    }
}

/// Builds the application router with the configured middleware stack.
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let mut router = routes::create_router(state, config.enable_scd);
    if config.trace_requests {
        router = router.layer(TraceLayer::new_for_http());
    }
    if config.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }
    router
}

/// Runs the server until the process is stopped.
pub async fn run_server(state: AppState, config: ServerConfig) -> DssResult<()> {
    let router = create_router(state, &config);

    let addr: SocketAddr = config
        .address
        .parse()
        .map_err(|e| DssError::Internal(format!("Invalid listen address {}: {e}", config.address)))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| DssError::Unavailable(format!("Error binding {addr}: {e}")))?;

    info!(%addr, scd = config.enable_scd, "DSS server listening");

    // Indicate ready for container health checks.
    tokio::fs::write("service.ready", b"")
        .await
        .map_err(|e| DssError::Internal(format!("Error touching service.ready: {e}")))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| DssError::Internal(format!("Server error: {e}")))
}
