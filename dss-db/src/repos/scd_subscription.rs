//! SCD subscription repository

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

use dss_core::geo::CellUnion;
use dss_core::models::scd::{Ovn, Subscription};
use dss_core::models::{Id, Owner, MAX_RESULT_LIMIT};
use dss_core::DssResult;

use super::{cells_to_db, search_cells_to_db, Repository};
use crate::store::db_err;

const SCD_SUBSCRIPTION_FIELDS: &str = "id, owner, uss_base_url, notification_index, \
     notify_for_operational_intents, notify_for_constraints, implicit, altitude_lower, \
     altitude_upper, starts_at, ends_at, cells, updated_at";

/// Which record family a write notifies for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyTrigger {
    OperationalIntents,
    Constraints,
}

fn scan_scd_subscription(row: &PgRow) -> DssResult<Subscription> {
    let scan = || -> Result<Subscription, sqlx::Error> {
        let id = Id(row.try_get("id")?);
        let cells: Vec<i64> = row.try_get("cells")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
        Ok(Subscription {
            id,
            manager: Owner(row.try_get("owner")?),
            version: Ovn::from_time(&id, updated_at),
            notify_for_operational_intents: row.try_get("notify_for_operational_intents")?,
            notify_for_constraints: row.try_get("notify_for_constraints")?,
            uss_base_url: row.try_get("uss_base_url")?,
            start_time: row.try_get("starts_at")?,
            end_time: row.try_get("ends_at")?,
            altitude_lo: row.try_get("altitude_lower")?,
            altitude_hi: row.try_get("altitude_upper")?,
            cells: CellUnion::from_i64s(&cells),
            notification_index: row.try_get("notification_index")?,
            implicit: row.try_get("implicit")?,
        })
    };
    scan().map_err(|e| db_err("Error scanning SCD Subscription row", e))
}

impl Repository {
    /// Returns the SCD subscription identified by `id`, or `None`.
    pub async fn get_scd_subscription(&mut self, id: &Id) -> DssResult<Option<Subscription>> {
        let query =
            format!("SELECT {SCD_SUBSCRIPTION_FIELDS} FROM scd_subscriptions WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id.0)
            .fetch_optional(self.conn())
            .await
            .map_err(|e| db_err("Error in SCD Subscription get query", e))?;
        row.as_ref().map(scan_scd_subscription).transpose()
    }

    /// Inserts a new SCD subscription.
    pub async fn insert_scd_subscription(
        &mut self,
        sub: &Subscription,
    ) -> DssResult<Subscription> {
        let cells = cells_to_db(&sub.cells)?;
        let query = format!(
            "INSERT INTO scd_subscriptions ({SCD_SUBSCRIPTION_FIELDS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, transaction_timestamp()) \
             RETURNING {SCD_SUBSCRIPTION_FIELDS}"
        );
        let row = sqlx::query(&query)
            .bind(sub.id.0)
            .bind(&sub.manager.0)
            .bind(&sub.uss_base_url)
            .bind(sub.notification_index)
            .bind(sub.notify_for_operational_intents)
            .bind(sub.notify_for_constraints)
            .bind(sub.implicit)
            .bind(sub.altitude_lo)
            .bind(sub.altitude_hi)
            .bind(sub.start_time)
            .bind(sub.end_time)
            .bind(&cells)
            .fetch_one(self.conn())
            .await
            .map_err(|e| db_err("Error in SCD Subscription insert query", e))?;
        scan_scd_subscription(&row)
    }

    /// Replaces an existing SCD subscription. OVN agreement is the
    /// caller's responsibility within this transaction.
    pub async fn update_scd_subscription(
        &mut self,
        sub: &Subscription,
    ) -> DssResult<Option<Subscription>> {
        let cells = cells_to_db(&sub.cells)?;
        let query = format!(
            "UPDATE scd_subscriptions \
             SET uss_base_url = $2, notification_index = $3, \
                 notify_for_operational_intents = $4, notify_for_constraints = $5, \
                 implicit = $6, altitude_lower = $7, altitude_upper = $8, starts_at = $9, \
                 ends_at = $10, cells = $11, updated_at = transaction_timestamp() \
             WHERE id = $1 \
             RETURNING {SCD_SUBSCRIPTION_FIELDS}"
        );
        let row = sqlx::query(&query)
            .bind(sub.id.0)
            .bind(&sub.uss_base_url)
            .bind(sub.notification_index)
            .bind(sub.notify_for_operational_intents)
            .bind(sub.notify_for_constraints)
            .bind(sub.implicit)
            .bind(sub.altitude_lo)
            .bind(sub.altitude_hi)
            .bind(sub.start_time)
            .bind(sub.end_time)
            .bind(&cells)
            .fetch_optional(self.conn())
            .await
            .map_err(|e| db_err("Error in SCD Subscription update query", e))?;
        row.as_ref().map(scan_scd_subscription).transpose()
    }

    /// Deletes the SCD subscription; `false` if no row matched.
    pub async fn delete_scd_subscription(&mut self, id: &Id) -> DssResult<bool> {
        let result = sqlx::query("DELETE FROM scd_subscriptions WHERE id = $1")
            .bind(id.0)
            .execute(self.conn())
            .await
            .map_err(|e| db_err("Error in SCD Subscription delete query", e))?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns all live SCD subscriptions overlapping `cells`.
    pub async fn search_scd_subscriptions(
        &mut self,
        cells: &CellUnion,
    ) -> DssResult<Vec<Subscription>> {
        let cells = search_cells_to_db(cells)?;
        let query = format!(
            "SELECT {SCD_SUBSCRIPTION_FIELDS} FROM scd_subscriptions \
             WHERE cells && $1 AND ends_at >= $2 \
             LIMIT $3"
        );
        let rows = sqlx::query(&query)
            .bind(&cells)
            .bind(Utc::now())
            .bind(MAX_RESULT_LIMIT)
            .fetch_all(self.conn())
            .await
            .map_err(|e| db_err("Error in SCD Subscription search query", e))?;
        rows.iter().map(scan_scd_subscription).collect()
    }

    /// Atomically increments the notification index of every live SCD
    /// subscription overlapping `cells` that requested the given trigger,
    /// returning the updated records.
    pub async fn update_scd_notification_indices(
        &mut self,
        cells: &CellUnion,
        trigger: NotifyTrigger,
    ) -> DssResult<Vec<Subscription>> {
        let cells = search_cells_to_db(cells)?;
        let flag = match trigger {
            NotifyTrigger::OperationalIntents => "notify_for_operational_intents",
            NotifyTrigger::Constraints => "notify_for_constraints",
        };
        let query = format!(
            "UPDATE scd_subscriptions \
             SET notification_index = notification_index + 1 \
             WHERE cells && $1 AND ends_at >= $2 AND {flag} \
             RETURNING {SCD_SUBSCRIPTION_FIELDS}"
        );
        let rows = sqlx::query(&query)
            .bind(&cells)
            .bind(Utc::now())
            .fetch_all(self.conn())
            .await
            .map_err(|e| db_err("Error in SCD notification index update query", e))?;
        rows.iter().map(scan_scd_subscription).collect()
    }
}
