//! Transactional store
//!
//! `Store::transact` is the only way repositories are reached: it opens a
//! serializable transaction, hands the closure a [`Repository`], and commits
//! on success. Serialization conflicts (SQLSTATE 40001) rerun the closure
//! from the start with exponential backoff, so closures must recompute every
//! derived value inside and keep nothing from a previous attempt.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};

use dss_core::{DssError, DssResult};

use crate::repos::Repository;
use crate::schema::{schema_statements, DSS_SCHEMA};

/// Boxed future returned by transaction closures.
pub type TxFuture<'a, T> = Pin<Box<dyn Future<Output = DssResult<T>> + Send + 'a>>;

/// Default bound on serialization-conflict retries.
pub const DEFAULT_MAX_TX_RETRIES: u32 = 3;

const RETRY_BASE_DELAY_MS: u64 = 10;

/// Marker kept in [`DssError::Unavailable`] messages for conflicts that are
/// safe to rerun. Only the store layer inspects it.
pub(crate) const SERIALIZATION_CONFLICT: &str = "transaction serialization conflict";

/// Maps a driver error into the DSS taxonomy, tagging retryable conflicts.
pub(crate) fn db_err(context: &str, err: sqlx::Error) -> DssError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("40001") {
            return DssError::Unavailable(format!("{SERIALIZATION_CONFLICT}: {context}: {db}"));
        }
    }
    DssError::Internal(format!("{context}: {err}"))
}

pub(crate) fn is_serialization_conflict(err: &DssError) -> bool {
    matches!(err, DssError::Unavailable(msg) if msg.starts_with(SERIALIZATION_CONFLICT))
}

/// Which RID subscription schema dialect the database speaks.
///
/// v3 predates the `writer` column used for replica-sharded cleanup. The
/// dialect is probed once at store construction, never per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RidSchemaVersion {
    V3,
    V4,
}

impl RidSchemaVersion {
    /// Parses a `schema_versions.schema_version` value such as "v4.0.0".
    pub fn from_probe(version: &str) -> RidSchemaVersion {
        let major = version
            .trim_start_matches('v')
            .split('.')
            .next()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(4);
        if major >= 4 {
            RidSchemaVersion::V4
        } else {
            RidSchemaVersion::V3
        }
    }
}

/// PostgreSQL-backed DSS store.
pub struct Store {
    pool: PgPool,
    rid_schema: RidSchemaVersion,
    max_tx_retries: u32,
}

impl Store {
    /// Connects to the database and probes the schema dialect.
    pub async fn connect(database_url: &str, max_tx_retries: u32) -> DssResult<Store> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await
            .map_err(|e| DssError::Unavailable(format!("Error connecting to database: {e}")))?;

        let rid_schema = probe_rid_schema(&pool).await?;
        info!(schema = ?rid_schema, "Connected to DSS database");

        Ok(Store {
            pool,
            rid_schema,
            max_tx_retries,
        })
    }

    /// Builds a store over an existing pool, for tests.
    pub async fn from_pool(pool: PgPool, max_tx_retries: u32) -> DssResult<Store> {
        let rid_schema = probe_rid_schema(&pool).await?;
        Ok(Store {
            pool,
            rid_schema,
            max_tx_retries,
        })
    }

    /// Builds a store without establishing a connection, assuming the
    /// latest schema dialect. For tests of layers that never reach the
    /// database.
    pub fn connect_lazy(database_url: &str, max_tx_retries: u32) -> DssResult<Store> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_lazy(database_url)
            .map_err(|e| DssError::Unavailable(format!("Error preparing database pool: {e}")))?;
        Ok(Store {
            pool,
            rid_schema: RidSchemaVersion::V4,
            max_tx_retries,
        })
    }

    /// Applies the DSS schema.
    pub async fn init_schema(&self) -> DssResult<()> {
        for statement in schema_statements(DSS_SCHEMA) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| db_err("Error applying schema statement", e))?;
        }
        info!("DSS schema applied");
        Ok(())
    }

    pub fn rid_schema(&self) -> RidSchemaVersion {
        self.rid_schema
    }

    /// Liveness probe for the connection pool.
    pub async fn ping(&self) -> DssResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DssError::Unavailable(format!("Database ping failed: {e}")))?;
        Ok(())
    }

    /// Runs `action` inside a serializable transaction.
    ///
    /// The closure sees a consistent snapshot via the [`Repository`]; all
    /// writes commit atomically on return. On a serialization conflict the
    /// closure reruns from the start, up to the configured bound. Every
    /// other error rolls back and propagates unchanged.
    pub async fn transact<T, F>(&self, action: F) -> DssResult<T>
    where
        T: Send,
        F: for<'a> Fn(&'a mut Repository) -> TxFuture<'a, T> + Send + Sync,
    {
        let mut attempt = 0u32;
        loop {
            let mut repo = self.begin().await?;
            let result = action(&mut repo).await;
            let result: Result<T, DssError> = match result {
                Ok(value) => match repo.commit().await {
                    Ok(()) => return Ok(value),
                    Err(err) => Err(err),
                },
                Err(err) => {
                    repo.rollback().await;
                    Err(err)
                }
            };

            match result {
                Err(err) if is_serialization_conflict(&err) && attempt < self.max_tx_retries => {
                    attempt += 1;
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS << attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "Retrying transaction after serialization conflict");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
                Ok(_) => unreachable!("successful transactions return above"),
            }
        }
    }

    async fn begin(&self) -> DssResult<Repository> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_err("Error opening transaction", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("Error setting isolation level", e))?;
        Ok(Repository::new(tx, self.rid_schema))
    }
}

async fn probe_rid_schema(pool: &PgPool) -> DssResult<RidSchemaVersion> {
    let row = sqlx::query("SELECT schema_version FROM schema_versions LIMIT 1")
        .fetch_optional(pool)
        .await;
    match row {
        Ok(Some(row)) => {
            let version: String = row
                .try_get("schema_version")
                .map_err(|e| db_err("Error reading schema version", e))?;
            Ok(RidSchemaVersion::from_probe(&version))
        }
        // A missing probe table or empty row means a fresh database, which
        // init_schema will bring to the latest dialect.
        Ok(None) => Ok(RidSchemaVersion::V4),
        Err(e) => {
            debug!(error = %e, "Schema version probe failed; assuming latest schema");
            Ok(RidSchemaVersion::V4)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rid_schema_probe_parsing() {
        assert_eq!(RidSchemaVersion::from_probe("v4.0.0"), RidSchemaVersion::V4);
        assert_eq!(RidSchemaVersion::from_probe("v5.1.2"), RidSchemaVersion::V4);
        assert_eq!(RidSchemaVersion::from_probe("v3.1.0"), RidSchemaVersion::V3);
        assert_eq!(RidSchemaVersion::from_probe("3.0.0"), RidSchemaVersion::V3);
        assert_eq!(RidSchemaVersion::from_probe("garbage"), RidSchemaVersion::V4);
    }

    #[test]
    fn test_serialization_conflict_detection() {
        let conflict =
            DssError::Unavailable(format!("{SERIALIZATION_CONFLICT}: UPDATE subscriptions"));
        assert!(is_serialization_conflict(&conflict));

        let other = DssError::Unavailable("database offline".to_string());
        assert!(!is_serialization_conflict(&other));

        let not_found = DssError::NotFound("nope".to_string());
        assert!(!is_serialization_conflict(&not_found));
    }
}
