//! Operational intent repository

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

use dss_core::geo::CellUnion;
use dss_core::models::scd::{OperationalIntent, OperationalIntentState, Ovn};
use dss_core::models::{Id, Owner, MAX_RESULT_LIMIT};
use dss_core::DssResult;

use super::{cells_to_db, search_cells_to_db, Repository};
use crate::store::db_err;

const OPERATION_FIELDS: &str = "id, owner, version, state, uss_base_url, subscription_id, \
     altitude_lower, altitude_upper, starts_at, ends_at, cells, updated_at";

fn scan_operation(row: &PgRow) -> DssResult<OperationalIntent> {
    let scan = || -> DssResult<OperationalIntent> {
        let map = |e: sqlx::Error| db_err("Error scanning OperationalIntent row", e);
        let id = Id(row.try_get("id").map_err(map)?);
        let cells: Vec<i64> = row.try_get("cells").map_err(map)?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(map)?;
        let state: String = row.try_get("state").map_err(map)?;
        Ok(OperationalIntent {
            id,
            manager: Owner(row.try_get("owner").map_err(map)?),
            version: row.try_get("version").map_err(map)?,
            state: OperationalIntentState::parse(&state)?,
            ovn: Ovn::from_time(&id, updated_at),
            start_time: row.try_get("starts_at").map_err(map)?,
            end_time: row.try_get("ends_at").map_err(map)?,
            uss_base_url: row.try_get("uss_base_url").map_err(map)?,
            subscription_id: Id(row.try_get("subscription_id").map_err(map)?),
            altitude_lo: row.try_get("altitude_lower").map_err(map)?,
            altitude_hi: row.try_get("altitude_upper").map_err(map)?,
            cells: CellUnion::from_i64s(&cells),
        })
    };
    scan()
}

impl Repository {
    /// Returns the operational intent identified by `id`, or `None`.
    pub async fn get_operational_intent(
        &mut self,
        id: &Id,
    ) -> DssResult<Option<OperationalIntent>> {
        let query = format!("SELECT {OPERATION_FIELDS} FROM scd_operations WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id.0)
            .fetch_optional(self.conn())
            .await
            .map_err(|e| db_err("Error in OperationalIntent get query", e))?;
        row.as_ref().map(scan_operation).transpose()
    }

    /// Inserts a new operational intent at wire version 1; the stamped
    /// `updated_at` yields the returned OVN.
    pub async fn insert_operational_intent(
        &mut self,
        op: &OperationalIntent,
    ) -> DssResult<OperationalIntent> {
        let cells = cells_to_db(&op.cells)?;
        let query = format!(
            "INSERT INTO scd_operations ({OPERATION_FIELDS}) \
             VALUES ($1, $2, 1, $3, $4, $5, $6, $7, $8, $9, $10, transaction_timestamp()) \
             RETURNING {OPERATION_FIELDS}"
        );
        let row = sqlx::query(&query)
            .bind(op.id.0)
            .bind(&op.manager.0)
            .bind(op.state.as_str())
            .bind(&op.uss_base_url)
            .bind(op.subscription_id.0)
            .bind(op.altitude_lo)
            .bind(op.altitude_hi)
            .bind(op.start_time)
            .bind(op.end_time)
            .bind(&cells)
            .fetch_one(self.conn())
            .await
            .map_err(|e| db_err("Error in OperationalIntent insert query", e))?;
        scan_operation(&row)
    }

    /// Replaces an existing operational intent, bumping its wire version.
    ///
    /// OVN agreement was already proven by the caller inside this
    /// transaction, so the row is addressed by ID alone.
    pub async fn update_operational_intent(
        &mut self,
        op: &OperationalIntent,
    ) -> DssResult<Option<OperationalIntent>> {
        let cells = cells_to_db(&op.cells)?;
        let query = format!(
            "UPDATE scd_operations \
             SET version = version + 1, state = $2, uss_base_url = $3, subscription_id = $4, \
                 altitude_lower = $5, altitude_upper = $6, starts_at = $7, ends_at = $8, \
                 cells = $9, updated_at = transaction_timestamp() \
             WHERE id = $1 \
             RETURNING {OPERATION_FIELDS}"
        );
        let row = sqlx::query(&query)
            .bind(op.id.0)
            .bind(op.state.as_str())
            .bind(&op.uss_base_url)
            .bind(op.subscription_id.0)
            .bind(op.altitude_lo)
            .bind(op.altitude_hi)
            .bind(op.start_time)
            .bind(op.end_time)
            .bind(&cells)
            .fetch_optional(self.conn())
            .await
            .map_err(|e| db_err("Error in OperationalIntent update query", e))?;
        row.as_ref().map(scan_operation).transpose()
    }

    /// Deletes the operational intent; `false` if no row matched.
    pub async fn delete_operational_intent(&mut self, id: &Id) -> DssResult<bool> {
        let result = sqlx::query("DELETE FROM scd_operations WHERE id = $1")
            .bind(id.0)
            .execute(self.conn())
            .await
            .map_err(|e| db_err("Error in OperationalIntent delete query", e))?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns all operational intents overlapping the cells and window.
    pub async fn search_operational_intents(
        &mut self,
        cells: &CellUnion,
        earliest: Option<DateTime<Utc>>,
        latest: Option<DateTime<Utc>>,
    ) -> DssResult<Vec<OperationalIntent>> {
        let cells = search_cells_to_db(cells)?;
        let query = format!(
            "SELECT {OPERATION_FIELDS} FROM scd_operations \
             WHERE cells && $1 \
               AND COALESCE(ends_at >= $2, TRUE) \
               AND COALESCE(starts_at <= $3, TRUE) \
             LIMIT $4"
        );
        let rows = sqlx::query(&query)
            .bind(&cells)
            .bind(earliest)
            .bind(latest)
            .bind(MAX_RESULT_LIMIT)
            .fetch_all(self.conn())
            .await
            .map_err(|e| db_err("Error in OperationalIntent search query", e))?;
        rows.iter().map(scan_operation).collect()
    }

    /// IDs of operational intents attached to the given subscription.
    pub async fn get_dependent_operational_intents(
        &mut self,
        subscription_id: &Id,
    ) -> DssResult<Vec<Id>> {
        let rows = sqlx::query("SELECT id FROM scd_operations WHERE subscription_id = $1")
            .bind(subscription_id.0)
            .fetch_all(self.conn())
            .await
            .map_err(|e| db_err("Error in dependent OperationalIntent query", e))?;
        rows.iter()
            .map(|row| {
                row.try_get("id")
                    .map(Id)
                    .map_err(|e| db_err("Error scanning dependent intent id", e))
            })
            .collect()
    }
}
