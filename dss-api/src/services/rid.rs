//! Remote-ID service
//!
//! Shared by the v1 and v2 surfaces; only the wire casing differs. ISA
//! writes are symmetric to operational-intent writes but carry no OVN key
//! step, since Remote ID has no conflict protocol.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use dss_core::models::geometry::{GeoPolygon, Volume4D};
use dss_core::models::rid::{
    IdentificationServiceArea, Subscription, MAX_SUBSCRIPTIONS_PER_AREA,
};
use dss_core::models::{validate_put_preconditions, Id, Owner, Version};
use dss_core::{DssError, DssResult};

use dss_db::Store;

/// Remote-ID business operations.
pub struct RidService {
    store: Arc<Store>,
    /// Writer identity stamped on created records, keying expired-record
    /// cleanup to this process.
    writer: String,
}

fn wire_version(version: &Option<Version>) -> String {
    version.as_ref().map(|v| v.to_wire()).unwrap_or_default()
}

impl RidService {
    pub fn new(store: Arc<Store>, writer: String) -> RidService {
        RidService { store, writer }
    }

    /// Creates or updates an ISA, returning it and the subscribers whose
    /// notification index was bumped by the write.
    pub async fn put_isa(
        &self,
        owner: &Owner,
        id: Id,
        version: &str,
        extents: &Volume4D,
        url: &str,
    ) -> DssResult<(IdentificationServiceArea, Vec<Subscription>)> {
        extents.validate()?;
        let cells = extents.calculate_spatial_covering()?;
        let template = IdentificationServiceArea {
            id,
            owner: owner.clone(),
            url: url.to_string(),
            start_time: extents.start_time,
            end_time: extents.end_time,
            altitude_lo: extents.spatial_volume.altitude_lo,
            altitude_hi: extents.spatial_volume.altitude_hi,
            cells,
            writer: self.writer.clone(),
            version: None,
        };

        self.store
            .transact(|r| {
                let mut isa = template.clone();
                let owner = owner.clone();
                let version = version.to_string();
                Box::pin(async move {
                    let now = Utc::now();
                    let old = r
                        .get_isa(&isa.id)
                        .await
                        .map_err(|e| e.context("Could not get ISA from repo"))?;

                    let existing = old
                        .as_ref()
                        .map(|o| (o.owner.clone(), wire_version(&o.version)));
                    validate_put_preconditions(
                        "IdentificationServiceArea",
                        &isa.id,
                        existing.as_ref().map(|(o, v)| (o, v.as_str())),
                        &owner,
                        &version,
                    )?;

                    isa.adjust_time_range(now, old.as_ref())
                        .map_err(|e| e.context("Error adjusting time range of ISA"))?;

                    let stored = match &old {
                        None => r
                            .insert_isa(&isa)
                            .await
                            .map_err(|e| e.context("Could not insert ISA into repo"))?,
                        Some(_) => {
                            let expected = Version::to_timestamp(&version)?;
                            r.update_isa(&isa, expected)
                                .await
                                .map_err(|e| e.context("Could not update ISA in repo"))?
                                .ok_or_else(|| {
                                    DssError::VersionMismatch(format!(
                                        "IdentificationServiceArea version {version} is not current"
                                    ))
                                })?
                        }
                    };

                    let notify_cells = match &old {
                        Some(o) => o.cells.merged_with(&stored.cells),
                        None => stored.cells.clone(),
                    };
                    let subscribers = r
                        .update_rid_notification_indices(&notify_cells)
                        .await
                        .map_err(|e| e.context("Could not bump notification indices"))?;

                    Ok((stored, subscribers))
                })
            })
            .await
    }

    /// Returns the ISA identified by `id`.
    pub async fn get_isa(&self, id: Id) -> DssResult<IdentificationServiceArea> {
        self.store
            .transact(|r| {
                Box::pin(async move {
                    r.get_isa(&id)
                        .await
                        .map_err(|e| e.context("Could not get ISA from repo"))?
                        .ok_or_else(|| {
                            DssError::NotFound(format!("IdentificationServiceArea {id} not found"))
                        })
                })
            })
            .await
    }

    /// Deletes an ISA at the expected version, returning it and the
    /// subscribers notified of its disappearance.
    pub async fn delete_isa(
        &self,
        owner: &Owner,
        id: Id,
        version: &str,
    ) -> DssResult<(IdentificationServiceArea, Vec<Subscription>)> {
        self.store
            .transact(|r| {
                let owner = owner.clone();
                let version = version.to_string();
                Box::pin(async move {
                    let old = r
                        .get_isa(&id)
                        .await
                        .map_err(|e| e.context("Could not get ISA from repo"))?
                        .ok_or_else(|| {
                            DssError::NotFound(format!("IdentificationServiceArea {id} not found"))
                        })?;
                    if old.owner != owner {
                        return Err(DssError::PermissionDenied(format!(
                            "IdentificationServiceArea is owned by {}, but {} attempted to delete",
                            old.owner, owner
                        )));
                    }
                    let expected = Version::to_timestamp(&version)?;
                    let deleted = r
                        .delete_isa(&id, expected)
                        .await
                        .map_err(|e| e.context("Could not delete ISA from repo"))?
                        .ok_or_else(|| {
                            DssError::VersionMismatch(format!(
                                "IdentificationServiceArea version {version} is not current"
                            ))
                        })?;
                    let subscribers = r
                        .update_rid_notification_indices(&deleted.cells)
                        .await
                        .map_err(|e| e.context("Could not bump notification indices"))?;
                    Ok((deleted, subscribers))
                })
            })
            .await
    }

    /// Searches ISAs intersecting the area and time window.
    pub async fn search_isas(
        &self,
        area: &GeoPolygon,
        earliest: Option<DateTime<Utc>>,
        latest: Option<DateTime<Utc>>,
    ) -> DssResult<Vec<IdentificationServiceArea>> {
        if let (Some(earliest), Some(latest)) = (earliest, latest) {
            if earliest > latest {
                return Err(DssError::BadRequest(
                    "earliest_time must not be after latest_time".to_string(),
                ));
            }
        }
        let cells = area
            .calculate_covering()
            .map_err(|e| e.context("Invalid area"))?;
        self.store
            .transact(|r| {
                let cells = cells.clone();
                Box::pin(async move {
                    r.search_isas(&cells, earliest, latest)
                        .await
                        .map_err(|e| e.context("Could not search ISAs in repo"))
                })
            })
            .await
    }

    /// Creates or updates a subscription, returning it and the ISAs
    /// already present in its volume.
    pub async fn put_subscription(
        &self,
        owner: &Owner,
        id: Id,
        version: &str,
        extents: &Volume4D,
        url: &str,
    ) -> DssResult<(Subscription, Vec<IdentificationServiceArea>)> {
        extents.validate()?;
        let cells = extents.calculate_spatial_covering()?;
        let template = Subscription {
            id,
            owner: owner.clone(),
            url: url.to_string(),
            notification_index: 0,
            cells,
            start_time: extents.start_time,
            end_time: extents.end_time,
            writer: self.writer.clone(),
            version: None,
        };

        self.store
            .transact(|r| {
                let mut sub = template.clone();
                let owner = owner.clone();
                let version = version.to_string();
                Box::pin(async move {
                    let now = Utc::now();
                    let old = r
                        .get_rid_subscription(&sub.id)
                        .await
                        .map_err(|e| e.context("Could not get Subscription from repo"))?;

                    let existing = old
                        .as_ref()
                        .map(|o| (o.owner.clone(), wire_version(&o.version)));
                    validate_put_preconditions(
                        "Subscription",
                        &sub.id,
                        existing.as_ref().map(|(o, v)| (o, v.as_str())),
                        &owner,
                        &version,
                    )?;

                    if old.is_none() {
                        let count = r
                            .max_subscription_count_in_cells(&sub.cells, &owner)
                            .await
                            .map_err(|e| e.context("Could not count existing subscriptions"))?;
                        if count >= MAX_SUBSCRIPTIONS_PER_AREA {
                            return Err(DssError::Exhausted(format!(
                                "Too many existing subscriptions in this area ({count})"
                            )));
                        }
                    }

                    sub.adjust_time_range(now, old.as_ref())
                        .map_err(|e| e.context("Error adjusting time range of Subscription"))?;
                    if let Some(o) = &old {
                        sub.notification_index = o.notification_index;
                    }

                    let stored = match &old {
                        None => r
                            .insert_rid_subscription(&sub)
                            .await
                            .map_err(|e| e.context("Could not insert Subscription into repo"))?,
                        Some(_) => {
                            let expected = Version::to_timestamp(&version)?;
                            r.update_rid_subscription(&sub, expected)
                                .await
                                .map_err(|e| e.context("Could not update Subscription in repo"))?
                                .ok_or_else(|| {
                                    DssError::VersionMismatch(format!(
                                        "Subscription version {version} is not current"
                                    ))
                                })?
                        }
                    };

                    let service_areas = r
                        .search_isas(&stored.cells, stored.start_time, stored.end_time)
                        .await
                        .map_err(|e| e.context("Could not search ISAs in repo"))?;

                    Ok((stored, service_areas))
                })
            })
            .await
    }

    /// Returns the caller's subscription.
    pub async fn get_subscription(&self, owner: &Owner, id: Id) -> DssResult<Subscription> {
        self.store
            .transact(|r| {
                let owner = owner.clone();
                Box::pin(async move {
                    let sub = r
                        .get_rid_subscription(&id)
                        .await
                        .map_err(|e| e.context("Could not get Subscription from repo"))?
                        .ok_or_else(|| {
                            DssError::NotFound(format!("Subscription {id} not found"))
                        })?;
                    if sub.owner != owner {
                        return Err(DssError::PermissionDenied(format!(
                            "Subscription is owned by {}, but {} attempted to view",
                            sub.owner, owner
                        )));
                    }
                    Ok(sub)
                })
            })
            .await
    }

    /// Deletes the caller's subscription at the expected version.
    pub async fn delete_subscription(
        &self,
        owner: &Owner,
        id: Id,
        version: &str,
    ) -> DssResult<Subscription> {
        self.store
            .transact(|r| {
                let owner = owner.clone();
                let version = version.to_string();
                Box::pin(async move {
                    let old = r
                        .get_rid_subscription(&id)
                        .await
                        .map_err(|e| e.context("Could not get Subscription from repo"))?
                        .ok_or_else(|| {
                            DssError::NotFound(format!("Subscription {id} not found"))
                        })?;
                    if old.owner != owner {
                        return Err(DssError::PermissionDenied(format!(
                            "Subscription is owned by {}, but {} attempted to delete",
                            old.owner, owner
                        )));
                    }
                    let expected = Version::to_timestamp(&version)?;
                    r.delete_rid_subscription(&id, expected)
                        .await
                        .map_err(|e| e.context("Could not delete Subscription from repo"))?
                        .ok_or_else(|| {
                            DssError::VersionMismatch(format!(
                                "Subscription version {version} is not current"
                            ))
                        })
                })
            })
            .await
    }

    /// Searches the caller's subscriptions in the area.
    pub async fn search_subscriptions(
        &self,
        owner: &Owner,
        area: &GeoPolygon,
    ) -> DssResult<Vec<Subscription>> {
        let cells = area
            .calculate_covering()
            .map_err(|e| e.context("Invalid area"))?;
        self.store
            .transact(|r| {
                let owner = owner.clone();
                let cells = cells.clone();
                Box::pin(async move {
                    r.search_rid_subscriptions_by_owner(&cells, &owner)
                        .await
                        .map_err(|e| e.context("Could not search Subscriptions in repo"))
                })
            })
            .await
    }

    /// Deletes this writer's expired records. Returns the number of ISAs
    /// and subscriptions collected.
    pub async fn garbage_collect(&self) -> DssResult<(usize, usize)> {
        let writer = self.writer.clone();
        let collected = self
            .store
            .transact(|r| {
                let writer = writer.clone();
                Box::pin(async move {
                    let mut isas = 0usize;
                    for isa in r.list_expired_isas(&writer).await? {
                        if let Some(Version::Timestamp(ts)) = isa.version {
                            if r.delete_isa(&isa.id, ts).await?.is_some() {
                                isas += 1;
                            }
                        }
                    }
                    let mut subs = 0usize;
                    for sub in r.list_expired_rid_subscriptions(&writer).await? {
                        if let Some(Version::Timestamp(ts)) = sub.version {
                            if r.delete_rid_subscription(&sub.id, ts).await?.is_some() {
                                subs += 1;
                            }
                        }
                    }
                    Ok((isas, subs))
                })
            })
            .await?;
        if collected != (0, 0) {
            info!(
                isas = collected.0,
                subscriptions = collected.1,
                "Collected expired Remote-ID records"
            );
        }
        Ok(collected)
    }
}
