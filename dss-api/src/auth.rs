//! Bearer-token authorization
//!
//! Validates JWTs against a rotating public-key set, enforces per-operation
//! scope requirements, and attaches the caller's identity (the token
//! subject) to the request. Keys come from a pluggable [`KeyResolver`] and
//! are refreshed on a fixed cadence by a background task.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{MatchedPath, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use dss_core::models::Owner;
use dss_core::{DssError, DssResult};

use crate::error::ApiError;
use crate::state::AppState;

/// A public key the authorizer may verify tokens under.
#[derive(Clone)]
pub struct VerificationKey {
    pub key: DecodingKey,
    pub algorithm: Algorithm,
}

impl VerificationKey {
    /// HS256 key for test tokens.
    pub fn from_secret(secret: &[u8]) -> VerificationKey {
        VerificationKey {
            key: DecodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
        }
    }

    /// RS256 key from a PEM-encoded public key.
    pub fn from_rsa_pem(pem: &[u8]) -> DssResult<VerificationKey> {
        let key = DecodingKey::from_rsa_pem(pem)
            .map_err(|e| DssError::Internal(format!("Error parsing RSA public key: {e}")))?;
        Ok(VerificationKey {
            key,
            algorithm: Algorithm::RS256,
        })
    }
}

/// Abstracts resolving the token verification key set.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve_keys(&self) -> DssResult<Vec<VerificationKey>>;
}

/// Serves a fixed key set from memory.
pub struct StaticKeyResolver {
    pub keys: Vec<VerificationKey>,
}

#[async_trait]
impl KeyResolver for StaticKeyResolver {
    async fn resolve_keys(&self) -> DssResult<Vec<VerificationKey>> {
        Ok(self.keys.clone())
    }
}

/// Resolves RSA public keys from PEM files.
pub struct PemFileKeyResolver {
    pub paths: Vec<PathBuf>,
}

#[async_trait]
impl KeyResolver for PemFileKeyResolver {
    async fn resolve_keys(&self) -> DssResult<Vec<VerificationKey>> {
        let mut keys = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            let pem = tokio::fs::read(path).await.map_err(|e| {
                DssError::Internal(format!("Error reading key file {}: {e}", path.display()))
            })?;
            keys.push(
                VerificationKey::from_rsa_pem(&pem)
                    .map_err(|e| e.context(&format!("Error parsing key file {}", path.display())))?,
            );
        }
        Ok(keys)
    }
}

#[derive(Deserialize)]
struct JsonWebKey {
    kty: String,
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

#[derive(Deserialize)]
struct JsonWebKeySet {
    keys: Vec<JsonWebKey>,
}

/// Resolves keys from a remote JWKS endpoint, optionally restricted to a
/// set of key IDs.
pub struct JwksKeyResolver {
    pub endpoint: String,
    /// If empty, every key served by the endpoint is used.
    pub key_ids: Vec<String>,
    client: reqwest::Client,
}

impl JwksKeyResolver {
    pub fn new(endpoint: String, key_ids: Vec<String>) -> JwksKeyResolver {
        JwksKeyResolver {
            endpoint,
            key_ids,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl KeyResolver for JwksKeyResolver {
    async fn resolve_keys(&self) -> DssResult<Vec<VerificationKey>> {
        let jwks: JsonWebKeySet = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| {
                DssError::Unavailable(format!("Error retrieving JWKS at {}: {e}", self.endpoint))
            })?
            .json()
            .await
            .map_err(|e| DssError::Internal(format!("Error decoding JWKS: {e}")))?;

        let selected: Vec<&JsonWebKey> = if self.key_ids.is_empty() {
            jwks.keys.iter().collect()
        } else {
            let mut selected = Vec::new();
            for kid in &self.key_ids {
                let matches: Vec<&JsonWebKey> = jwks
                    .keys
                    .iter()
                    .filter(|k| k.kid.as_deref() == Some(kid))
                    .collect();
                if matches.is_empty() {
                    return Err(DssError::Internal(format!(
                        "Failed to resolve key(s) for ID: {kid}"
                    )));
                }
                selected.extend(matches);
            }
            selected
        };

        let mut keys = Vec::with_capacity(selected.len());
        for jwk in selected {
            if jwk.kty != "RSA" {
                continue;
            }
            let (n, e) = match (&jwk.n, &jwk.e) {
                (Some(n), Some(e)) => (n, e),
                _ => continue,
            };
            let key = DecodingKey::from_rsa_components(n, e)
                .map_err(|err| DssError::Internal(format!("Error building JWKS key: {err}")))?;
            keys.push(VerificationKey {
                key,
                algorithm: Algorithm::RS256,
            });
        }
        Ok(keys)
    }
}

/// Per-operation scope requirement.
#[derive(Debug, Clone)]
pub enum ScopesValidator {
    /// Every listed scope must be claimed.
    All(Vec<&'static str>),
    /// At least one listed scope must be claimed.
    Any(Vec<&'static str>),
}

impl ScopesValidator {
    /// Returns the missing scopes, empty when satisfied.
    pub fn validate(&self, claimed: &HashSet<String>) -> Result<(), Vec<String>> {
        match self {
            ScopesValidator::All(required) => {
                let missing: Vec<String> = required
                    .iter()
                    .filter(|s| !claimed.contains(**s))
                    .map(|s| s.to_string())
                    .collect();
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(missing)
                }
            }
            ScopesValidator::Any(required) => {
                if required.iter().any(|s| claimed.contains(*s)) {
                    Ok(())
                } else {
                    Err(required.iter().map(|s| s.to_string()).collect())
                }
            }
        }
    }

    /// Human form of the requirement, used verbatim in error messages.
    pub fn expectation(&self) -> String {
        match self {
            ScopesValidator::All(scopes) => scopes.join(" and "),
            ScopesValidator::Any(scopes) => scopes.join(" or "),
        }
    }
}

/// Requires every listed scope.
pub fn require_all_scopes(scopes: &[&'static str]) -> ScopesValidator {
    ScopesValidator::All(scopes.to_vec())
}

/// Requires at least one listed scope.
pub fn require_any_scope(scopes: &[&'static str]) -> ScopesValidator {
    ScopesValidator::Any(scopes.to_vec())
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    aud: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[allow(dead_code)]
    exp: u64,
}

/// Creation-time parameters for an [`Authorizer`].
pub struct AuthorizerConfig {
    /// Used to initialize and periodically refresh keys.
    pub key_resolver: Arc<dyn KeyResolver>,
    /// Keys are refreshed on this cadence.
    pub key_refresh_interval: Duration,
    /// Scope requirements keyed by operation ("METHOD /route/pattern").
    pub scopes_validators: HashMap<String, ScopesValidator>,
    /// Accepted `aud` claims. An empty set accepts only tokens that carry
    /// no audience at all; accepting arbitrary audiences must be opted
    /// into by listing them.
    pub accepted_audiences: Vec<String>,
}

/// Authorizes incoming requests.
pub struct Authorizer {
    keys: RwLock<Vec<VerificationKey>>,
    scopes_validators: HashMap<String, ScopesValidator>,
    accepted_audiences: HashSet<String>,
}

impl Authorizer {
    /// Resolves the initial key set and starts the background refresher.
    ///
    /// Initial resolution failure fails startup; a resolution failure
    /// during a scheduled refresh panics the refresher task, since a DSS
    /// that cannot rotate keys must not keep serving indefinitely.
    pub async fn new(config: AuthorizerConfig) -> DssResult<Arc<Authorizer>> {
        let keys = config
            .key_resolver
            .resolve_keys()
            .await
            .map_err(|e| e.context("Unable to resolve keys"))?;
        info!(count = keys.len(), "Resolved token verification keys");

        let authorizer = Arc::new(Authorizer {
            keys: RwLock::new(keys),
            scopes_validators: config.scopes_validators,
            accepted_audiences: config.accepted_audiences.into_iter().collect(),
        });

        let refresher = Arc::downgrade(&authorizer);
        let resolver = config.key_resolver;
        let interval = config.key_refresh_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let Some(authorizer) = refresher.upgrade() else {
                    return;
                };
                match resolver.resolve_keys().await {
                    Ok(keys) => {
                        let mut guard = authorizer.keys.write().await;
                        *guard = keys;
                    }
                    Err(e) => panic!("failed to refresh token verification keys: {e}"),
                }
            }
        });

        Ok(authorizer)
    }

    /// Builds an authorizer without a refresher task, for tests.
    pub fn for_testing(
        keys: Vec<VerificationKey>,
        scopes_validators: HashMap<String, ScopesValidator>,
        accepted_audiences: Vec<String>,
    ) -> Arc<Authorizer> {
        Arc::new(Authorizer {
            keys: RwLock::new(keys),
            scopes_validators,
            accepted_audiences: accepted_audiences.into_iter().collect(),
        })
    }

    /// An empty configured audience set accepts only tokens with an empty
    /// or absent audience; any claimed audience must be explicitly listed.
    fn audience_accepted(&self, audience: &str) -> bool {
        if self.accepted_audiences.is_empty() {
            return audience.is_empty();
        }
        self.accepted_audiences.contains(audience)
    }

    /// Validates the bearer token for `operation` and returns the caller.
    pub async fn authorize(&self, token: &str, operation: &str) -> DssResult<Owner> {
        let keys = self.keys.read().await;
        let mut claims = None;
        let mut last_error = None;
        for key in keys.iter() {
            let mut validation = Validation::new(key.algorithm);
            // Audience membership is checked below with empty-set
            // semantics the library cannot express.
            validation.validate_aud = false;
            match decode::<Claims>(token, &key.key, &validation) {
                Ok(data) => {
                    claims = Some(data.claims);
                    break;
                }
                Err(e) => last_error = Some(e),
            }
        }
        drop(keys);

        let claims = claims.ok_or_else(|| {
            DssError::Unauthenticated(format!(
                "Access token validation failed: {}",
                last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no verification keys resolved".to_string())
            ))
        })?;

        let audience = claims.aud.as_deref().unwrap_or("");
        if !self.audience_accepted(audience) {
            return Err(DssError::Unauthenticated(format!(
                "Invalid access token audience: {audience}"
            )));
        }

        let claimed: HashSet<String> = claims
            .scope
            .as_deref()
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_string)
            .collect();

        if let Some(validator) = self.scopes_validators.get(operation) {
            if validator.validate(&claimed).is_err() {
                let mut found: Vec<String> = claimed.into_iter().collect();
                found.sort();
                return Err(DssError::PermissionDenied(format!(
                    "Access token missing scopes; found [{}] while expecting {}",
                    found.join(", "),
                    validator.expectation()
                )));
            }
        }

        Ok(Owner(claims.sub))
    }
}

/// Axum middleware enforcing the token contract on every matched route.
///
/// The operation key is "METHOD /route/pattern", taken from the router's
/// matched path so that path parameters do not fragment the registry.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let operation = match request.extensions().get::<MatchedPath>() {
        Some(path) => format!("{} {}", request.method(), path.as_str()),
        None => format!("{} {}", request.method(), request.uri().path()),
    };

    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| {
            warn!(operation, "Request without access token");
            ApiError::from(DssError::Unauthenticated("Missing access token".to_string()))
        })?
        .to_string();

    let owner = state.authorizer.authorize(&token, &operation).await?;
    request.extensions_mut().insert(owner);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims<'a> {
        sub: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        aud: Option<&'a str>,
        scope: &'a str,
        exp: u64,
    }

    const SECRET: &[u8] = b"test-secret-for-unit-testing-only";

    fn token(sub: &str, aud: Option<&str>, scope: &str) -> String {
        let claims = TestClaims {
            sub,
            aud,
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

    fn authorizer(
        validators: HashMap<String, ScopesValidator>,
        audiences: Vec<String>,
    ) -> Arc<Authorizer> {
        Authorizer::for_testing(
            vec![VerificationKey::from_secret(SECRET)],
            validators,
            audiences,
        )
    }

    #[tokio::test]
    async fn test_valid_token_yields_owner() {
        let auth = authorizer(HashMap::new(), vec![]);
        let owner = auth
            .authorize(&token("uss1", None, ""), "GET /x")
            .await
            .unwrap();
        assert_eq!(owner, Owner::new("uss1"));
    }

    #[tokio::test]
    async fn test_bad_signature_rejected() {
        let auth = authorizer(HashMap::new(), vec![]);
        let other = encode(
            &Header::default(),
            &TestClaims {
                sub: "uss1",
                aud: None,
                scope: "",
                exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as u64,
            },
            &EncodingKey::from_secret(b"a-different-secret-entirely!!"),
        )
        .unwrap();
        let err = auth.authorize(&other, "GET /x").await.unwrap_err();
        assert!(matches!(err, DssError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_scope_failure_names_claimed_and_expected() {
        let mut validators = HashMap::new();
        validators.insert(
            "PUT /x".to_string(),
            require_all_scopes(&["scope.a", "scope.b"]),
        );
        let auth = authorizer(validators, vec![]);
        let err = auth
            .authorize(&token("uss1", None, "scope.a"), "PUT /x")
            .await
            .unwrap_err();
        match err {
            DssError::PermissionDenied(msg) => {
                assert!(msg.contains("scope.a and scope.b"), "message: {msg}");
                assert!(msg.contains("scope.a"), "message: {msg}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_any_scope_accepts_one_of() {
        let mut validators = HashMap::new();
        validators.insert(
            "GET /x".to_string(),
            require_any_scope(&["scope.a", "scope.b"]),
        );
        let auth = authorizer(validators, vec![]);
        assert!(auth
            .authorize(&token("uss1", None, "scope.b scope.z"), "GET /x")
            .await
            .is_ok());
        let err = auth
            .authorize(&token("uss1", None, "scope.z"), "GET /x")
            .await
            .unwrap_err();
        assert!(matches!(err, DssError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_empty_audience_set_accepts_only_empty_audience() {
        let auth = authorizer(HashMap::new(), vec![]);
        assert!(auth.authorize(&token("u", None, ""), "GET /x").await.is_ok());
        let err = auth
            .authorize(&token("u", Some("dss.example.com"), ""), "GET /x")
            .await
            .unwrap_err();
        assert!(matches!(err, DssError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_configured_audience_membership() {
        let auth = authorizer(HashMap::new(), vec!["dss.example.com".to_string()]);
        assert!(auth
            .authorize(&token("u", Some("dss.example.com"), ""), "GET /x")
            .await
            .is_ok());
        assert!(auth
            .authorize(&token("u", Some("other.example.com"), ""), "GET /x")
            .await
            .is_err());
        // With a configured audience list, tokens without an audience no
        // longer pass.
        assert!(auth.authorize(&token("u", None, ""), "GET /x").await.is_err());
    }

    #[test]
    fn test_expectation_strings() {
        assert_eq!(
            require_all_scopes(&["s1", "s2"]).expectation(),
            "s1 and s2"
        );
        assert_eq!(require_any_scope(&["s1", "s2"]).expectation(), "s1 or s2");
    }
}
