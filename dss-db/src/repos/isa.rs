//! Identification service area repository

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

use dss_core::geo::CellUnion;
use dss_core::models::rid::IdentificationServiceArea;
use dss_core::models::{Id, Owner, Version, EXPIRED_DURATION_MINUTES, MAX_RESULT_LIMIT};
use dss_core::DssResult;

use super::{cells_to_db, search_cells_to_db, Repository};
use crate::store::db_err;

const ISA_FIELDS: &str =
    "id, owner, url, altitude_lower, altitude_upper, starts_at, ends_at, cells, writer, updated_at";

fn scan_isa(row: &PgRow) -> DssResult<IdentificationServiceArea> {
    let scan = || -> Result<IdentificationServiceArea, sqlx::Error> {
        let cells: Vec<i64> = row.try_get("cells")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
        Ok(IdentificationServiceArea {
            id: Id(row.try_get("id")?),
            owner: Owner(row.try_get("owner")?),
            url: row.try_get("url")?,
            altitude_lo: row.try_get("altitude_lower")?,
            altitude_hi: row.try_get("altitude_upper")?,
            start_time: row.try_get("starts_at")?,
            end_time: row.try_get("ends_at")?,
            cells: CellUnion::from_i64s(&cells),
            writer: row.try_get::<Option<String>, _>("writer")?.unwrap_or_default(),
            version: Some(Version::from_time(updated_at)),
        })
    };
    scan().map_err(|e| db_err("Error scanning ISA row", e))
}

impl Repository {
    /// Returns the ISA identified by `id`, or `None` if not present.
    pub async fn get_isa(&mut self, id: &Id) -> DssResult<Option<IdentificationServiceArea>> {
        let query =
            format!("SELECT {ISA_FIELDS} FROM identification_service_areas WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id.0)
            .fetch_optional(self.conn())
            .await
            .map_err(|e| db_err("Error in ISA get query", e))?;
        row.as_ref().map(scan_isa).transpose()
    }

    /// Inserts a new ISA; the store stamps `updated_at`, which becomes the
    /// returned version.
    pub async fn insert_isa(
        &mut self,
        isa: &IdentificationServiceArea,
    ) -> DssResult<IdentificationServiceArea> {
        let cells = cells_to_db(&isa.cells)?;
        let query = format!(
            "INSERT INTO identification_service_areas ({ISA_FIELDS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, transaction_timestamp()) \
             RETURNING {ISA_FIELDS}"
        );
        let row = sqlx::query(&query)
            .bind(isa.id.0)
            .bind(&isa.owner.0)
            .bind(&isa.url)
            .bind(isa.altitude_lo)
            .bind(isa.altitude_hi)
            .bind(isa.start_time)
            .bind(isa.end_time)
            .bind(&cells)
            .bind(&isa.writer)
            .fetch_one(self.conn())
            .await
            .map_err(|e| db_err("Error in ISA insert query", e))?;
        scan_isa(&row)
    }

    /// Updates the ISA whose version matches `expected`; returns `None` on
    /// a version mismatch (or a concurrently deleted row).
    pub async fn update_isa(
        &mut self,
        isa: &IdentificationServiceArea,
        expected: DateTime<Utc>,
    ) -> DssResult<Option<IdentificationServiceArea>> {
        let cells = cells_to_db(&isa.cells)?;
        let query = format!(
            "UPDATE identification_service_areas \
             SET url = $2, altitude_lower = $3, altitude_upper = $4, starts_at = $5, \
                 ends_at = $6, cells = $7, writer = $8, updated_at = transaction_timestamp() \
             WHERE id = $1 AND updated_at = $9 \
             RETURNING {ISA_FIELDS}"
        );
        let row = sqlx::query(&query)
            .bind(isa.id.0)
            .bind(&isa.url)
            .bind(isa.altitude_lo)
            .bind(isa.altitude_hi)
            .bind(isa.start_time)
            .bind(isa.end_time)
            .bind(&cells)
            .bind(&isa.writer)
            .bind(expected)
            .fetch_optional(self.conn())
            .await
            .map_err(|e| db_err("Error in ISA update query", e))?;
        row.as_ref().map(scan_isa).transpose()
    }

    /// Deletes the ISA whose version matches `expected`; returns the
    /// deleted record, or `None` on mismatch.
    pub async fn delete_isa(
        &mut self,
        id: &Id,
        expected: DateTime<Utc>,
    ) -> DssResult<Option<IdentificationServiceArea>> {
        let query = format!(
            "DELETE FROM identification_service_areas \
             WHERE id = $1 AND updated_at = $2 \
             RETURNING {ISA_FIELDS}"
        );
        let row = sqlx::query(&query)
            .bind(id.0)
            .bind(expected)
            .fetch_optional(self.conn())
            .await
            .map_err(|e| db_err("Error in ISA delete query", e))?;
        row.as_ref().map(scan_isa).transpose()
    }

    /// Returns all ISAs overlapping the cells and time window.
    pub async fn search_isas(
        &mut self,
        cells: &CellUnion,
        earliest: Option<DateTime<Utc>>,
        latest: Option<DateTime<Utc>>,
    ) -> DssResult<Vec<IdentificationServiceArea>> {
        let cells = search_cells_to_db(cells)?;
        let query = format!(
            "SELECT {ISA_FIELDS} FROM identification_service_areas \
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
            .map_err(|e| db_err("Error in ISA search query", e))?;
        rows.iter().map(scan_isa).collect()
    }

    /// Lists ISAs past their grace period, restricted to one writer's
    /// records so replicas do not collect each other's garbage. An empty
    /// writer also matches rows with no writer recorded.
    pub async fn list_expired_isas(
        &mut self,
        writer: &str,
    ) -> DssResult<Vec<IdentificationServiceArea>> {
        let query = format!(
            "SELECT {ISA_FIELDS} FROM identification_service_areas \
             WHERE ends_at + make_interval(mins => $1) <= transaction_timestamp() \
               AND (writer = $2 OR ($2 = '' AND writer IS NULL))"
        );
        let rows = sqlx::query(&query)
            .bind(EXPIRED_DURATION_MINUTES as i32)
            .bind(writer)
            .fetch_all(self.conn())
            .await
            .map_err(|e| db_err("Error in expired ISA query", e))?;
        rows.iter().map(scan_isa).collect()
    }
}
