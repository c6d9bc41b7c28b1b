//! Per-entity repositories
//!
//! All repository methods live on [`Repository`], which owns one open
//! transaction; a `Repository` is only obtainable through
//! [`crate::Store::transact`], so every read sees the transaction snapshot
//! and every write commits atomically with its notification-index bumps.

mod constraint;
mod isa;
mod operational_intent;
mod scd_subscription;
mod subscription;

pub use scd_subscription::NotifyTrigger;

use sqlx::{Postgres, Transaction};
use tracing::warn;

use dss_core::geo::{validate_cell, CellUnion};
use dss_core::{DssError, DssResult};

use crate::store::RidSchemaVersion;

/// Transaction-scoped repository handle.
pub struct Repository {
    tx: Transaction<'static, Postgres>,
    rid_schema: RidSchemaVersion,
}

impl Repository {
    pub(crate) fn new(tx: Transaction<'static, Postgres>, rid_schema: RidSchemaVersion) -> Self {
        Repository { tx, rid_schema }
    }

    pub(crate) async fn commit(self) -> DssResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| crate::store::db_err("Error committing transaction", e))
    }

    pub(crate) async fn rollback(self) {
        if let Err(e) = self.tx.rollback().await {
            warn!(error = %e, "Error rolling back transaction");
        }
    }

    pub(crate) fn conn(&mut self) -> &mut sqlx::PgConnection {
        &mut self.tx
    }

    pub(crate) fn rid_schema(&self) -> RidSchemaVersion {
        self.rid_schema
    }
}

/// Converts a cell union to its array-column form, validating every cell
/// against the allowed storage level.
pub(crate) fn cells_to_db(cells: &CellUnion) -> DssResult<Vec<i64>> {
    for cell in &cells.0 {
        validate_cell(*cell).map_err(|e| e.context("Error validating cell"))?;
    }
    Ok(cells.to_i64s())
}

/// Converts search cells, rejecting empty inputs.
pub(crate) fn search_cells_to_db(cells: &CellUnion) -> DssResult<Vec<i64>> {
    if cells.is_empty() {
        return Err(DssError::BadRequest("No location provided".to_string()));
    }
    cells_to_db(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dss_core::geo::{CellId, LatLng};

    #[test]
    fn test_cells_to_db_validates_levels() {
        let cell = CellId::from_lat_lng(LatLng::from_degrees(37.42, -122.08)).parent(13);
        let ok = CellUnion(vec![cell]);
        assert_eq!(cells_to_db(&ok).unwrap(), ok.to_i64s());

        let coarse = CellUnion(vec![cell.parent(12)]);
        assert!(matches!(cells_to_db(&coarse), Err(DssError::BadRequest(_))));
    }

    #[test]
    fn test_search_cells_reject_empty() {
        assert!(matches!(
            search_cells_to_db(&CellUnion::default()),
            Err(DssError::BadRequest(_))
        ));
    }
}
