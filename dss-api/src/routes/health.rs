//! Health endpoint

/// Liveness probe. Deliberately touches nothing: a DSS with a degraded
/// database must still answer so the orchestrator can tell "process hung"
/// from "dependency down".
pub async fn healthy() -> &'static str {
    "ok"
}
