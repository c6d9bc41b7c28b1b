//! Constraint repository

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

use dss_core::geo::CellUnion;
use dss_core::models::scd::{Constraint, Ovn};
use dss_core::models::{Id, Owner, MAX_RESULT_LIMIT};
use dss_core::DssResult;

use super::{cells_to_db, search_cells_to_db, Repository};
use crate::store::db_err;

const CONSTRAINT_FIELDS: &str = "id, owner, version, uss_base_url, altitude_lower, \
     altitude_upper, starts_at, ends_at, cells, updated_at";

fn scan_constraint(row: &PgRow) -> DssResult<Constraint> {
    let scan = || -> Result<Constraint, sqlx::Error> {
        let id = Id(row.try_get("id")?);
        let cells: Vec<i64> = row.try_get("cells")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
        Ok(Constraint {
            id,
            manager: Owner(row.try_get("owner")?),
            version: row.try_get("version")?,
            uss_base_url: row.try_get("uss_base_url")?,
            altitude_lo: row.try_get("altitude_lower")?,
            altitude_hi: row.try_get("altitude_upper")?,
            start_time: row.try_get("starts_at")?,
            end_time: row.try_get("ends_at")?,
            cells: CellUnion::from_i64s(&cells),
            ovn: Ovn::from_time(&id, updated_at),
        })
    };
    scan().map_err(|e| db_err("Error scanning Constraint row", e))
}

impl Repository {
    /// Returns the constraint identified by `id`, or `None`.
    pub async fn get_constraint(&mut self, id: &Id) -> DssResult<Option<Constraint>> {
        let query = format!("SELECT {CONSTRAINT_FIELDS} FROM scd_constraints WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id.0)
            .fetch_optional(self.conn())
            .await
            .map_err(|e| db_err("Error in Constraint get query", e))?;
        row.as_ref().map(scan_constraint).transpose()
    }

    /// Inserts a new constraint at wire version 1.
    pub async fn insert_constraint(&mut self, constraint: &Constraint) -> DssResult<Constraint> {
        let cells = cells_to_db(&constraint.cells)?;
        let query = format!(
            "INSERT INTO scd_constraints ({CONSTRAINT_FIELDS}) \
             VALUES ($1, $2, 1, $3, $4, $5, $6, $7, $8, transaction_timestamp()) \
             RETURNING {CONSTRAINT_FIELDS}"
        );
        let row = sqlx::query(&query)
            .bind(constraint.id.0)
            .bind(&constraint.manager.0)
            .bind(&constraint.uss_base_url)
            .bind(constraint.altitude_lo)
            .bind(constraint.altitude_hi)
            .bind(constraint.start_time)
            .bind(constraint.end_time)
            .bind(&cells)
            .fetch_one(self.conn())
            .await
            .map_err(|e| db_err("Error in Constraint insert query", e))?;
        scan_constraint(&row)
    }

    /// Replaces an existing constraint, bumping its wire version. OVN
    /// agreement is the caller's responsibility within this transaction.
    pub async fn update_constraint(
        &mut self,
        constraint: &Constraint,
    ) -> DssResult<Option<Constraint>> {
        let cells = cells_to_db(&constraint.cells)?;
        let query = format!(
            "UPDATE scd_constraints \
             SET version = version + 1, uss_base_url = $2, altitude_lower = $3, \
                 altitude_upper = $4, starts_at = $5, ends_at = $6, cells = $7, \
                 updated_at = transaction_timestamp() \
             WHERE id = $1 \
             RETURNING {CONSTRAINT_FIELDS}"
        );
        let row = sqlx::query(&query)
            .bind(constraint.id.0)
            .bind(&constraint.uss_base_url)
            .bind(constraint.altitude_lo)
            .bind(constraint.altitude_hi)
            .bind(constraint.start_time)
            .bind(constraint.end_time)
            .bind(&cells)
            .fetch_optional(self.conn())
            .await
            .map_err(|e| db_err("Error in Constraint update query", e))?;
        row.as_ref().map(scan_constraint).transpose()
    }

    /// Deletes the constraint; `false` if no row matched.
    pub async fn delete_constraint(&mut self, id: &Id) -> DssResult<bool> {
        let result = sqlx::query("DELETE FROM scd_constraints WHERE id = $1")
            .bind(id.0)
            .execute(self.conn())
            .await
            .map_err(|e| db_err("Error in Constraint delete query", e))?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns all constraints overlapping the cells and window.
    pub async fn search_constraints(
        &mut self,
        cells: &CellUnion,
        earliest: Option<DateTime<Utc>>,
        latest: Option<DateTime<Utc>>,
    ) -> DssResult<Vec<Constraint>> {
        let cells = search_cells_to_db(cells)?;
        let query = format!(
            "SELECT {CONSTRAINT_FIELDS} FROM scd_constraints \
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
            .map_err(|e| db_err("Error in Constraint search query", e))?;
        rows.iter().map(scan_constraint).collect()
    }
}
