//! DSS server process
//!
//! Boots the store (retrying until the database is reachable), builds the
//! authorizer from the configured key source, and serves the configured
//! API surfaces.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use dss_api::auth::{
    AuthorizerConfig, JwksKeyResolver, KeyResolver, PemFileKeyResolver, StaticKeyResolver,
    VerificationKey,
};
use dss_api::{routes, server, AppState, Authorizer, ServerConfig};
use dss_core::{DssError, DssResult};
use dss_db::Store;

/// Wait schedule while prerequisites (the database) come up; the last
/// entry repeats.
const BOOTSTRAP_BACKOFF_SECS: [u64; 6] = [5, 15, 60, 60, 60, 300];

#[derive(Parser)]
#[command(name = "dss")]
#[command(about = "Discovery and Synchronization Service")]
#[command(version)]
struct Args {
    /// Local address the server binds to and listens on
    #[arg(long, default_value = "0.0.0.0:8080")]
    addr: String,

    /// PostgreSQL connection URL
    #[arg(long, env = "DSS_DATABASE_URL")]
    db_url: String,

    /// Enables the Strategic Conflict Detection API
    #[arg(long, default_value_t = false)]
    enable_scd: bool,

    /// Logs HTTP request/response pairs
    #[arg(long, default_value_t = false)]
    trace_requests: bool,

    /// Allows cross-origin requests from display applications
    #[arg(long, default_value_t = false)]
    enable_cors: bool,

    /// PEM files holding RSA public keys for token verification
    #[arg(long, value_delimiter = ',')]
    public_key_files: Vec<PathBuf>,

    /// JWKS endpoint serving token verification keys
    #[arg(long)]
    jwks_endpoint: Option<String>,

    /// Key IDs to select from the JWKS endpoint; all keys if empty
    #[arg(long, value_delimiter = ',')]
    jwks_key_ids: Vec<String>,

    /// Accepted `aud` claims. When empty, only tokens without an
    /// audience are accepted
    #[arg(long, value_delimiter = ',')]
    accepted_audiences: Vec<String>,

    /// Token verification keys are refreshed on this cadence
    #[arg(long, default_value_t = 300)]
    key_refresh_interval_secs: u64,

    /// HS256 secret for local development. Never set in production
    #[arg(long, env = "DSS_DEV_HS256_SECRET", hide = true)]
    dev_hs256_secret: Option<String>,

    /// Identity stamped on created records, keying expired-record
    /// cleanup to this replica. Defaults to a random identity
    #[arg(long)]
    writer: Option<String>,

    /// Bound on serializable-transaction retries
    #[arg(long, default_value_t = 3)]
    max_tx_retries: u32,

    /// Collect this writer's expired records on this cadence; disabled
    /// when unset
    #[arg(long)]
    gc_interval_secs: Option<u64>,
}

fn key_resolver(args: &Args) -> DssResult<Arc<dyn KeyResolver>> {
    if let Some(endpoint) = &args.jwks_endpoint {
        return Ok(Arc::new(JwksKeyResolver::new(
            endpoint.clone(),
            args.jwks_key_ids.clone(),
        )));
    }
    if !args.public_key_files.is_empty() {
        return Ok(Arc::new(PemFileKeyResolver {
            paths: args.public_key_files.clone(),
        }));
    }
    if let Some(secret) = &args.dev_hs256_secret {
        warn!("Using a development HS256 secret for token verification");
        return Ok(Arc::new(StaticKeyResolver {
            keys: vec![VerificationKey::from_secret(secret.as_bytes())],
        }));
    }
    Err(DssError::Internal(
        "No token verification key source configured; set --jwks-endpoint or --public-key-files"
            .to_string(),
    ))
}

/// Connects to the store, waiting for the database to become reachable.
async fn connect_store(args: &Args) -> DssResult<Store> {
    let mut backoff = 0usize;
    loop {
        match Store::connect(&args.db_url, args.max_tx_retries).await {
            Ok(store) => return Ok(store),
            Err(DssError::Unavailable(msg)) => {
                let wait = BOOTSTRAP_BACKOFF_SECS[backoff];
                info!(error = %msg, wait_secs = wait, "Prerequisites not yet satisfied; waiting to retry");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                if backoff < BOOTSTRAP_BACKOFF_SECS.len() - 1 {
                    backoff += 1;
                }
            }
            Err(e) => return Err(e),
        }
    }
}

async fn run(args: Args) -> DssResult<()> {
    let store = Arc::new(connect_store(&args).await?);
    store.init_schema().await?;

    let authorizer = Authorizer::new(AuthorizerConfig {
        key_resolver: key_resolver(&args)?,
        key_refresh_interval: Duration::from_secs(args.key_refresh_interval_secs),
        scopes_validators: routes::scopes_registry(args.enable_scd),
        accepted_audiences: args.accepted_audiences.clone(),
    })
    .await?;

    let writer = args
        .writer
        .clone()
        .unwrap_or_else(|| format!("dss-{}", uuid::Uuid::new_v4()));
    let state = AppState::new(store, authorizer, writer);

    if let Some(interval_secs) = args.gc_interval_secs {
        let rid = state.rid.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                if let Err(e) = rid.garbage_collect().await {
                    warn!(error = %e, "Expired-record collection failed");
                }
            }
        });
    }

    server::run_server(
        state,
        ServerConfig {
            address: args.addr.clone(),
            enable_scd: args.enable_scd,
            trace_requests: args.trace_requests,
            enable_cors: args.enable_cors,
        },
    )
    .await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!(error = %e, "Failed to execute service");
        std::process::exit(1);
    }
}
