//! Remote-ID subscription repository
//!
//! Two schema dialects coexist: v4 carries a `writer` column for
//! replica-sharded cleanup, v3 predates it. The dialect is fixed at store
//! construction; every method branches on it exactly once.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

use dss_core::geo::CellUnion;
use dss_core::models::rid::Subscription;
use dss_core::models::{Id, Owner, Version, EXPIRED_DURATION_MINUTES, MAX_RESULT_LIMIT};
use dss_core::DssResult;

use super::{cells_to_db, search_cells_to_db, Repository};
use crate::store::{db_err, RidSchemaVersion};

const SUBSCRIPTION_FIELDS: &str =
    "id, owner, url, notification_index, cells, starts_at, ends_at, writer, updated_at";

const SUBSCRIPTION_FIELDS_V3: &str =
    "id, owner, url, notification_index, cells, starts_at, ends_at, updated_at";

fn fields(schema: RidSchemaVersion) -> &'static str {
    match schema {
        RidSchemaVersion::V4 => SUBSCRIPTION_FIELDS,
        RidSchemaVersion::V3 => SUBSCRIPTION_FIELDS_V3,
    }
}

fn scan_subscription(schema: RidSchemaVersion, row: &PgRow) -> DssResult<Subscription> {
    let scan = || -> Result<Subscription, sqlx::Error> {
        let cells: Vec<i64> = row.try_get("cells")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
        let writer = match schema {
            RidSchemaVersion::V4 => row
                .try_get::<Option<String>, _>("writer")?
                .unwrap_or_default(),
            RidSchemaVersion::V3 => String::new(),
        };
        Ok(Subscription {
            id: Id(row.try_get("id")?),
            owner: Owner(row.try_get("owner")?),
            url: row.try_get("url")?,
            notification_index: row.try_get("notification_index")?,
            cells: CellUnion::from_i64s(&cells),
            start_time: row.try_get("starts_at")?,
            end_time: row.try_get("ends_at")?,
            writer,
            version: Some(Version::from_time(updated_at)),
        })
    };
    scan().map_err(|e| db_err("Error scanning Subscription row", e))
}

impl Repository {
    /// Returns the subscription identified by `id`, or `None`.
    pub async fn get_rid_subscription(&mut self, id: &Id) -> DssResult<Option<Subscription>> {
        let schema = self.rid_schema();
        let query = format!(
            "SELECT {} FROM subscriptions WHERE id = $1",
            fields(schema)
        );
        let row = sqlx::query(&query)
            .bind(id.0)
            .fetch_optional(self.conn())
            .await
            .map_err(|e| db_err("Error in Subscription get query", e))?;
        row.as_ref().map(|r| scan_subscription(schema, r)).transpose()
    }

    /// Inserts a new subscription and returns it with its stamped version.
    pub async fn insert_rid_subscription(
        &mut self,
        sub: &Subscription,
    ) -> DssResult<Subscription> {
        let schema = self.rid_schema();
        let cells = cells_to_db(&sub.cells)?;
        let row = match schema {
            RidSchemaVersion::V4 => {
                let query = format!(
                    "INSERT INTO subscriptions ({SUBSCRIPTION_FIELDS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, transaction_timestamp()) \
                     RETURNING {SUBSCRIPTION_FIELDS}"
                );
                sqlx::query(&query)
                    .bind(sub.id.0)
                    .bind(&sub.owner.0)
                    .bind(&sub.url)
                    .bind(sub.notification_index)
                    .bind(&cells)
                    .bind(sub.start_time)
                    .bind(sub.end_time)
                    .bind(&sub.writer)
                    .fetch_one(self.conn())
                    .await
            }
            RidSchemaVersion::V3 => {
                let query = format!(
                    "INSERT INTO subscriptions ({SUBSCRIPTION_FIELDS_V3}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, transaction_timestamp()) \
                     RETURNING {SUBSCRIPTION_FIELDS_V3}"
                );
                sqlx::query(&query)
                    .bind(sub.id.0)
                    .bind(&sub.owner.0)
                    .bind(&sub.url)
                    .bind(sub.notification_index)
                    .bind(&cells)
                    .bind(sub.start_time)
                    .bind(sub.end_time)
                    .fetch_one(self.conn())
                    .await
            }
        }
        .map_err(|e| db_err("Error in Subscription insert query", e))?;
        scan_subscription(schema, &row)
    }

    /// Updates the subscription whose version matches `expected`; `None` on
    /// mismatch.
    pub async fn update_rid_subscription(
        &mut self,
        sub: &Subscription,
        expected: DateTime<Utc>,
    ) -> DssResult<Option<Subscription>> {
        let schema = self.rid_schema();
        let cells = cells_to_db(&sub.cells)?;
        let row = match schema {
            RidSchemaVersion::V4 => {
                let query = format!(
                    "UPDATE subscriptions \
                     SET url = $2, notification_index = $3, cells = $4, starts_at = $5, \
                         ends_at = $6, writer = $7, updated_at = transaction_timestamp() \
                     WHERE id = $1 AND updated_at = $8 \
                     RETURNING {SUBSCRIPTION_FIELDS}"
                );
                sqlx::query(&query)
                    .bind(sub.id.0)
                    .bind(&sub.url)
                    .bind(sub.notification_index)
                    .bind(&cells)
                    .bind(sub.start_time)
                    .bind(sub.end_time)
                    .bind(&sub.writer)
                    .bind(expected)
                    .fetch_optional(self.conn())
                    .await
            }
            RidSchemaVersion::V3 => {
                let query = format!(
                    "UPDATE subscriptions \
                     SET url = $2, notification_index = $3, cells = $4, starts_at = $5, \
                         ends_at = $6, updated_at = transaction_timestamp() \
                     WHERE id = $1 AND updated_at = $7 \
                     RETURNING {SUBSCRIPTION_FIELDS_V3}"
                );
                sqlx::query(&query)
                    .bind(sub.id.0)
                    .bind(&sub.url)
                    .bind(sub.notification_index)
                    .bind(&cells)
                    .bind(sub.start_time)
                    .bind(sub.end_time)
                    .bind(expected)
                    .fetch_optional(self.conn())
                    .await
            }
        }
        .map_err(|e| db_err("Error in Subscription update query", e))?;
        row.as_ref().map(|r| scan_subscription(schema, r)).transpose()
    }

    /// Deletes the subscription whose version matches `expected`; returns
    /// the deleted record, or `None` on mismatch.
    pub async fn delete_rid_subscription(
        &mut self,
        id: &Id,
        expected: DateTime<Utc>,
    ) -> DssResult<Option<Subscription>> {
        let schema = self.rid_schema();
        let query = format!(
            "DELETE FROM subscriptions WHERE id = $1 AND updated_at = $2 RETURNING {}",
            fields(schema)
        );
        let row = sqlx::query(&query)
            .bind(id.0)
            .bind(expected)
            .fetch_optional(self.conn())
            .await
            .map_err(|e| db_err("Error in Subscription delete query", e))?;
        row.as_ref().map(|r| scan_subscription(schema, r)).transpose()
    }

    /// Returns all live subscriptions overlapping `cells`.
    pub async fn search_rid_subscriptions(
        &mut self,
        cells: &CellUnion,
    ) -> DssResult<Vec<Subscription>> {
        let schema = self.rid_schema();
        let cells = search_cells_to_db(cells)?;
        let query = format!(
            "SELECT {} FROM subscriptions \
             WHERE cells && $1 AND ends_at >= $2 \
             LIMIT $3",
            fields(schema)
        );
        let rows = sqlx::query(&query)
            .bind(&cells)
            .bind(Utc::now())
            .bind(MAX_RESULT_LIMIT)
            .fetch_all(self.conn())
            .await
            .map_err(|e| db_err("Error in Subscription search query", e))?;
        rows.iter().map(|r| scan_subscription(schema, r)).collect()
    }

    /// Returns all live subscriptions of `owner` overlapping `cells`.
    pub async fn search_rid_subscriptions_by_owner(
        &mut self,
        cells: &CellUnion,
        owner: &Owner,
    ) -> DssResult<Vec<Subscription>> {
        let schema = self.rid_schema();
        let cells = search_cells_to_db(cells)?;
        let query = format!(
            "SELECT {} FROM subscriptions \
             WHERE cells && $1 AND owner = $2 AND ends_at >= $3 \
             LIMIT $4",
            fields(schema)
        );
        let rows = sqlx::query(&query)
            .bind(&cells)
            .bind(&owner.0)
            .bind(Utc::now())
            .bind(MAX_RESULT_LIMIT)
            .fetch_all(self.conn())
            .await
            .map_err(|e| db_err("Error in Subscription owner search query", e))?;
        rows.iter().map(|r| scan_subscription(schema, r)).collect()
    }

    /// Atomically increments the notification index of every live
    /// subscription overlapping `cells`, returning the updated records so
    /// the caller can forward the new indices.
    pub async fn update_rid_notification_indices(
        &mut self,
        cells: &CellUnion,
    ) -> DssResult<Vec<Subscription>> {
        let schema = self.rid_schema();
        let cells = search_cells_to_db(cells)?;
        let query = format!(
            "UPDATE subscriptions \
             SET notification_index = notification_index + 1 \
             WHERE cells && $1 AND ends_at >= $2 \
             RETURNING {}",
            fields(schema)
        );
        let rows = sqlx::query(&query)
            .bind(&cells)
            .bind(Utc::now())
            .fetch_all(self.conn())
            .await
            .map_err(|e| db_err("Error in notification index update query", e))?;
        rows.iter().map(|r| scan_subscription(schema, r)).collect()
    }

    /// Counts the owner's live subscriptions in each of the given cells and
    /// returns the highest count, for enforcing the per-area density limit.
    pub async fn max_subscription_count_in_cells(
        &mut self,
        cells: &CellUnion,
        owner: &Owner,
    ) -> DssResult<i64> {
        let cells = search_cells_to_db(cells)?;
        let query = "SELECT COALESCE(MAX(subscriptions_per_cell_id), 0) FROM ( \
                       SELECT COUNT(*) AS subscriptions_per_cell_id FROM ( \
                         SELECT unnest(cells) AS cell_id FROM subscriptions \
                         WHERE owner = $1 AND ends_at >= $2 \
                       ) AS owner_cells \
                       WHERE cell_id = ANY($3) \
                       GROUP BY cell_id \
                     ) AS counts";
        let row = sqlx::query(query)
            .bind(&owner.0)
            .bind(Utc::now())
            .bind(&cells)
            .fetch_one(self.conn())
            .await
            .map_err(|e| db_err("Error in subscription count query", e))?;
        row.try_get::<i64, _>(0)
            .map_err(|e| db_err("Error scanning subscription count row", e))
    }

    /// Lists subscriptions past their grace period for one writer; an
    /// empty writer also matches rows with no writer recorded.
    pub async fn list_expired_rid_subscriptions(
        &mut self,
        writer: &str,
    ) -> DssResult<Vec<Subscription>> {
        let schema = self.rid_schema();
        let rows = match schema {
            RidSchemaVersion::V4 => {
                let query = format!(
                    "SELECT {SUBSCRIPTION_FIELDS} FROM subscriptions \
                     WHERE ends_at + make_interval(mins => $1) <= transaction_timestamp() \
                       AND (writer = $2 OR ($2 = '' AND writer IS NULL))"
                );
                sqlx::query(&query)
                    .bind(EXPIRED_DURATION_MINUTES as i32)
                    .bind(writer)
                    .fetch_all(self.conn())
                    .await
            }
            // v3 has no writer column; every expired row belongs to whoever
            // asks.
            RidSchemaVersion::V3 => {
                let query = format!(
                    "SELECT {SUBSCRIPTION_FIELDS_V3} FROM subscriptions \
                     WHERE ends_at + make_interval(mins => $1) <= transaction_timestamp()"
                );
                sqlx::query(&query)
                    .bind(EXPIRED_DURATION_MINUTES as i32)
                    .fetch_all(self.conn())
                    .await
            }
        }
        .map_err(|e| db_err("Error in expired Subscription query", e))?;
        rows.iter().map(|r| scan_subscription(schema, r)).collect()
    }
}
