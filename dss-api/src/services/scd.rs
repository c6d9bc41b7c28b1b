//! Strategic Conflict Detection service
//!
//! The core of the deconfliction protocol lives in
//! [`ScdService::put_operational_intent`]: before a nominal-state write
//! lands, the caller must prove it has read every overlapping operational
//! intent and constraint at its current revision by presenting their OVNs.
//! Off-nominal states skip the proof; the write and the notification-index
//! bumps commit in one transaction either way.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use dss_core::error::AirspaceConflict;
use dss_core::geo::CellUnion;
use dss_core::models::geometry::Volume4D;
use dss_core::models::scd::{
    missing_ovns, Constraint, OperationalIntent, OperationalIntentState, Ovn, Subscription,
};
use dss_core::models::{
    validate_put_preconditions, validate_uss_base_url, Id, Manager, Version,
};
use dss_core::{DssError, DssResult};

use dss_db::{NotifyTrigger, Repository, Store};

/// Parameters for creating an implicit subscription alongside an
/// operational intent.
#[derive(Debug, Clone)]
pub struct NewSubscriptionParams {
    pub uss_base_url: String,
    pub notify_for_constraints: bool,
}

/// Model-level parameters of a PutOperationalIntent request.
#[derive(Debug, Clone)]
pub struct PutOperationalIntentParams {
    pub extents: Vec<Volume4D>,
    pub keys: Vec<Ovn>,
    pub state: OperationalIntentState,
    pub uss_base_url: String,
    pub subscription_id: Option<Id>,
    pub new_subscription: Option<NewSubscriptionParams>,
}

/// The 4-D union of a request's extents.
#[derive(Debug, Clone)]
struct UnionedExtents {
    cells: CellUnion,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    altitude_lo: Option<f32>,
    altitude_hi: Option<f32>,
}

fn union_extents(extents: &[Volume4D]) -> DssResult<UnionedExtents> {
    if extents.is_empty() {
        return Err(DssError::BadRequest("Missing extents".to_string()));
    }
    let mut cells = CellUnion::default();
    let mut start_time: Option<DateTime<Utc>> = None;
    let mut end_time: Option<DateTime<Utc>> = None;
    let mut altitude_lo: Option<f32> = None;
    let mut altitude_hi: Option<f32> = None;
    for volume in extents {
        volume.validate()?;
        let covering = volume
            .calculate_spatial_covering()
            .map_err(|e| e.context("Invalid area"))?;
        cells = cells.merged_with(&covering);
        start_time = match (start_time, volume.start_time) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        end_time = match (end_time, volume.end_time) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        altitude_lo = match (altitude_lo, volume.spatial_volume.altitude_lo) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        altitude_hi = match (altitude_hi, volume.spatial_volume.altitude_hi) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
    Ok(UnionedExtents {
        cells,
        start_time,
        end_time,
        altitude_lo,
        altitude_hi,
    })
}

/// Strategic Conflict Detection business operations.
pub struct ScdService {
    store: Arc<Store>,
}

impl ScdService {
    pub fn new(store: Arc<Store>) -> ScdService {
        ScdService { store }
    }

    // ==================== Operational intents ====================

    /// Creates, updates, or transitions an operational intent.
    pub async fn put_operational_intent(
        &self,
        manager: &Manager,
        id: Id,
        ovn: &str,
        params: &PutOperationalIntentParams,
    ) -> DssResult<(OperationalIntent, Vec<Subscription>)> {
        validate_uss_base_url(&params.uss_base_url)?;
        if let Some(new_sub) = &params.new_subscription {
            validate_uss_base_url(&new_sub.uss_base_url)?;
        }
        let union = union_extents(&params.extents)
            .map_err(|e| e.context("Unable to parse extents"))?;

        self.store
            .transact(|r| {
                let manager = manager.clone();
                let ovn = ovn.to_string();
                let params = params.clone();
                let union = union.clone();
                Box::pin(async move {
                    let old = r
                        .get_operational_intent(&id)
                        .await
                        .map_err(|e| e.context("Could not get OperationalIntent from repo"))?;

                    let existing = old.as_ref().map(|o| (o.manager.clone(), o.ovn.to_string()));
                    validate_put_preconditions(
                        "OperationalIntent",
                        &id,
                        existing.as_ref().map(|(m, v)| (m, v.as_str())),
                        &manager,
                        &ovn,
                    )?;

                    match &old {
                        Some(o) if !o.state.can_transition_to(params.state) => {
                            return Err(DssError::BadRequest(format!(
                                "Invalid state transition from {} to {}",
                                o.state, params.state
                            )));
                        }
                        None if !matches!(
                            params.state,
                            OperationalIntentState::Accepted | OperationalIntentState::Activated
                        ) =>
                        {
                            return Err(DssError::BadRequest(format!(
                                "New operational intents must be Accepted or Activated, not {}",
                                params.state
                            )));
                        }
                        _ => {}
                    }

                    let subscription =
                        resolve_subscription(r, &manager, &params, &union, old.as_ref()).await?;

                    if params.state.requires_key() {
                        check_keys(r, &id, &union, &params.keys).await?;
                    }

                    let intent = OperationalIntent {
                        id,
                        manager: manager.clone(),
                        version: old.as_ref().map(|o| o.version).unwrap_or(0),
                        state: params.state,
                        ovn: Ovn(String::new()),
                        start_time: union.start_time,
                        end_time: union.end_time,
                        uss_base_url: params.uss_base_url.clone(),
                        subscription_id: subscription.id,
                        altitude_lo: union.altitude_lo,
                        altitude_hi: union.altitude_hi,
                        cells: union.cells.clone(),
                    };
                    intent.validate_time_range()?;

                    let stored = match &old {
                        None => r
                            .insert_operational_intent(&intent)
                            .await
                            .map_err(|e| e.context("Could not insert OperationalIntent"))?,
                        Some(_) => r
                            .update_operational_intent(&intent)
                            .await
                            .map_err(|e| e.context("Could not update OperationalIntent"))?
                            .ok_or_else(|| {
                                DssError::VersionMismatch(format!(
                                    "OperationalIntent {ovn} is not current"
                                ))
                            })?,
                    };

                    // A subscription swap may strand the old implicit one.
                    if let Some(o) = &old {
                        if o.subscription_id != stored.subscription_id {
                            release_implicit_subscription(r, &o.subscription_id).await?;
                        }
                    }

                    let notify_cells = match &old {
                        Some(o) => o.cells.merged_with(&stored.cells),
                        None => stored.cells.clone(),
                    };
                    let subscribers = r
                        .update_scd_notification_indices(
                            &notify_cells,
                            NotifyTrigger::OperationalIntents,
                        )
                        .await
                        .map_err(|e| e.context("Could not bump notification indices"))?;

                    Ok((stored, subscribers))
                })
            })
            .await
    }

    /// Returns the operational intent identified by `id`.
    pub async fn get_operational_intent(&self, id: Id) -> DssResult<OperationalIntent> {
        self.store
            .transact(|r| {
                Box::pin(async move {
                    r.get_operational_intent(&id)
                        .await
                        .map_err(|e| e.context("Could not get OperationalIntent from repo"))?
                        .ok_or_else(|| {
                            DssError::NotFound(format!("OperationalIntent {id} not found"))
                        })
                })
            })
            .await
    }

    /// Deletes an operational intent at the expected OVN.
    pub async fn delete_operational_intent(
        &self,
        manager: &Manager,
        id: Id,
        ovn: &str,
    ) -> DssResult<(OperationalIntent, Vec<Subscription>)> {
        self.store
            .transact(|r| {
                let manager = manager.clone();
                let ovn = ovn.to_string();
                Box::pin(async move {
                    let old = r
                        .get_operational_intent(&id)
                        .await
                        .map_err(|e| e.context("Could not get OperationalIntent from repo"))?
                        .ok_or_else(|| {
                            DssError::NotFound(format!("OperationalIntent {id} not found"))
                        })?;
                    if old.manager != manager {
                        return Err(DssError::PermissionDenied(format!(
                            "OperationalIntent is managed by {}, but {} attempted to delete",
                            old.manager, manager
                        )));
                    }
                    if !Version::from(&old.ovn).matches(&ovn) {
                        return Err(DssError::VersionMismatch(format!(
                            "OperationalIntent OVN {ovn} is not current"
                        )));
                    }

                    r.delete_operational_intent(&id)
                        .await
                        .map_err(|e| e.context("Could not delete OperationalIntent"))?;

                    release_implicit_subscription(r, &old.subscription_id).await?;

                    let subscribers = r
                        .update_scd_notification_indices(
                            &old.cells,
                            NotifyTrigger::OperationalIntents,
                        )
                        .await
                        .map_err(|e| e.context("Could not bump notification indices"))?;
                    Ok((old, subscribers))
                })
            })
            .await
    }

    /// Searches operational intents in the area of interest.
    pub async fn query_operational_intents(
        &self,
        aoi: &Volume4D,
    ) -> DssResult<Vec<OperationalIntent>> {
        aoi.validate()?;
        let cells = aoi
            .calculate_spatial_covering()
            .map_err(|e| e.context("Invalid area of interest"))?;
        let (start, end) = (aoi.start_time, aoi.end_time);
        self.store
            .transact(|r| {
                let cells = cells.clone();
                Box::pin(async move {
                    r.search_operational_intents(&cells, start, end)
                        .await
                        .map_err(|e| e.context("Could not search OperationalIntents in repo"))
                })
            })
            .await
    }

    // ==================== Constraints ====================

    /// Creates or updates a constraint. Constraint writes carry no key
    /// check; they only gate on version and ownership.
    pub async fn put_constraint(
        &self,
        manager: &Manager,
        id: Id,
        ovn: &str,
        extents: &[Volume4D],
        uss_base_url: &str,
    ) -> DssResult<(Constraint, Vec<Subscription>)> {
        validate_uss_base_url(uss_base_url)?;
        let union = union_extents(extents).map_err(|e| e.context("Unable to parse extents"))?;

        self.store
            .transact(|r| {
                let manager = manager.clone();
                let ovn = ovn.to_string();
                let uss_base_url = uss_base_url.to_string();
                let union = union.clone();
                Box::pin(async move {
                    let old = r
                        .get_constraint(&id)
                        .await
                        .map_err(|e| e.context("Could not get Constraint from repo"))?;

                    let existing = old.as_ref().map(|o| (o.manager.clone(), o.ovn.to_string()));
                    validate_put_preconditions(
                        "Constraint",
                        &id,
                        existing.as_ref().map(|(m, v)| (m, v.as_str())),
                        &manager,
                        &ovn,
                    )?;

                    let constraint = Constraint {
                        id,
                        manager: manager.clone(),
                        version: old.as_ref().map(|o| o.version).unwrap_or(0),
                        uss_base_url: uss_base_url.clone(),
                        altitude_lo: union.altitude_lo,
                        altitude_hi: union.altitude_hi,
                        start_time: union.start_time,
                        end_time: union.end_time,
                        cells: union.cells.clone(),
                        ovn: Ovn(String::new()),
                    };

                    let stored = match &old {
                        None => r
                            .insert_constraint(&constraint)
                            .await
                            .map_err(|e| e.context("Could not insert Constraint"))?,
                        Some(_) => r
                            .update_constraint(&constraint)
                            .await
                            .map_err(|e| e.context("Could not update Constraint"))?
                            .ok_or_else(|| {
                                DssError::VersionMismatch(format!(
                                    "Constraint OVN {ovn} is not current"
                                ))
                            })?,
                    };

                    let notify_cells = match &old {
                        Some(o) => o.cells.merged_with(&stored.cells),
                        None => stored.cells.clone(),
                    };
                    let subscribers = r
                        .update_scd_notification_indices(&notify_cells, NotifyTrigger::Constraints)
                        .await
                        .map_err(|e| e.context("Could not bump notification indices"))?;
                    Ok((stored, subscribers))
                })
            })
            .await
    }

    /// Returns the constraint identified by `id`.
    pub async fn get_constraint(&self, id: Id) -> DssResult<Constraint> {
        self.store
            .transact(|r| {
                Box::pin(async move {
                    r.get_constraint(&id)
                        .await
                        .map_err(|e| e.context("Could not get Constraint from repo"))?
                        .ok_or_else(|| DssError::NotFound(format!("Constraint {id} not found")))
                })
            })
            .await
    }

    /// Deletes a constraint at the expected OVN.
    pub async fn delete_constraint(
        &self,
        manager: &Manager,
        id: Id,
        ovn: &str,
    ) -> DssResult<(Constraint, Vec<Subscription>)> {
        self.store
            .transact(|r| {
                let manager = manager.clone();
                let ovn = ovn.to_string();
                Box::pin(async move {
                    let old = r
                        .get_constraint(&id)
                        .await
                        .map_err(|e| e.context("Could not get Constraint from repo"))?
                        .ok_or_else(|| DssError::NotFound(format!("Constraint {id} not found")))?;
                    if old.manager != manager {
                        return Err(DssError::PermissionDenied(format!(
                            "Constraint is managed by {}, but {} attempted to delete",
                            old.manager, manager
                        )));
                    }
                    if !Version::from(&old.ovn).matches(&ovn) {
                        return Err(DssError::VersionMismatch(format!(
                            "Constraint OVN {ovn} is not current"
                        )));
                    }

                    r.delete_constraint(&id)
                        .await
                        .map_err(|e| e.context("Could not delete Constraint"))?;

                    let subscribers = r
                        .update_scd_notification_indices(&old.cells, NotifyTrigger::Constraints)
                        .await
                        .map_err(|e| e.context("Could not bump notification indices"))?;
                    Ok((old, subscribers))
                })
            })
            .await
    }

    /// Searches constraints in the area of interest.
    pub async fn query_constraints(&self, aoi: &Volume4D) -> DssResult<Vec<Constraint>> {
        aoi.validate()?;
        let cells = aoi
            .calculate_spatial_covering()
            .map_err(|e| e.context("Invalid area of interest"))?;
        let (start, end) = (aoi.start_time, aoi.end_time);
        self.store
            .transact(|r| {
                let cells = cells.clone();
                Box::pin(async move {
                    r.search_constraints(&cells, start, end)
                        .await
                        .map_err(|e| e.context("Could not search Constraints in repo"))
                })
            })
            .await
    }

    // ==================== Subscriptions ====================

    /// Creates or updates an explicit SCD subscription, returning it with
    /// its dependent operational intents and the records already present
    /// in its volume.
    #[allow(clippy::type_complexity)]
    pub async fn put_subscription(
        &self,
        manager: &Manager,
        id: Id,
        version: &str,
        extents: &Volume4D,
        uss_base_url: &str,
        notify_for_operational_intents: bool,
        notify_for_constraints: bool,
    ) -> DssResult<(Subscription, Vec<Id>, Vec<OperationalIntent>, Vec<Constraint>)> {
        validate_uss_base_url(uss_base_url)?;
        extents.validate()?;
        let cells = extents.calculate_spatial_covering()?;
        let template = Subscription {
            id,
            manager: manager.clone(),
            version: Ovn(String::new()),
            notify_for_operational_intents,
            notify_for_constraints,
            uss_base_url: uss_base_url.to_string(),
            start_time: extents.start_time,
            end_time: extents.end_time,
            altitude_lo: extents.spatial_volume.altitude_lo,
            altitude_hi: extents.spatial_volume.altitude_hi,
            cells,
            notification_index: 0,
            implicit: false,
        };
        template.validate_triggers()?;

        self.store
            .transact(|r| {
                let mut sub = template.clone();
                let manager = manager.clone();
                let version = version.to_string();
                Box::pin(async move {
                    let old = r
                        .get_scd_subscription(&sub.id)
                        .await
                        .map_err(|e| e.context("Could not get Subscription from repo"))?;

                    let existing = old
                        .as_ref()
                        .map(|o| (o.manager.clone(), o.version.to_string()));
                    validate_put_preconditions(
                        "Subscription",
                        &sub.id,
                        existing.as_ref().map(|(m, v)| (m, v.as_str())),
                        &manager,
                        &version,
                    )?;

                    if let Some(o) = &old {
                        sub.notification_index = o.notification_index;
                    }

                    let stored = match &old {
                        None => r
                            .insert_scd_subscription(&sub)
                            .await
                            .map_err(|e| e.context("Could not insert Subscription"))?,
                        Some(_) => r
                            .update_scd_subscription(&sub)
                            .await
                            .map_err(|e| e.context("Could not update Subscription"))?
                            .ok_or_else(|| {
                                DssError::VersionMismatch(format!(
                                    "Subscription version {version} is not current"
                                ))
                            })?,
                    };

                    let dependents = r
                        .get_dependent_operational_intents(&stored.id)
                        .await
                        .map_err(|e| e.context("Could not find dependent OperationalIntents"))?;

                    let intents = if stored.notify_for_operational_intents {
                        r.search_operational_intents(
                            &stored.cells,
                            stored.start_time,
                            stored.end_time,
                        )
                        .await
                        .map_err(|e| e.context("Could not search OperationalIntents in repo"))?
                    } else {
                        Vec::new()
                    };
                    let constraints = if stored.notify_for_constraints {
                        r.search_constraints(&stored.cells, stored.start_time, stored.end_time)
                            .await
                            .map_err(|e| e.context("Could not search Constraints in repo"))?
                    } else {
                        Vec::new()
                    };

                    Ok((stored, dependents, intents, constraints))
                })
            })
            .await
    }

    /// Returns the caller's subscription and its dependents.
    pub async fn get_subscription(
        &self,
        manager: &Manager,
        id: Id,
    ) -> DssResult<(Subscription, Vec<Id>)> {
        self.store
            .transact(|r| {
                let manager = manager.clone();
                Box::pin(async move {
                    let sub = r
                        .get_scd_subscription(&id)
                        .await
                        .map_err(|e| e.context("Could not get Subscription from repo"))?
                        .ok_or_else(|| {
                            DssError::NotFound(format!("Subscription {id} not found"))
                        })?;
                    if sub.manager != manager {
                        return Err(DssError::PermissionDenied(format!(
                            "Subscription is owned by {}, but {} attempted to view",
                            sub.manager, manager
                        )));
                    }
                    let dependents = r
                        .get_dependent_operational_intents(&id)
                        .await
                        .map_err(|e| e.context("Could not find dependent OperationalIntents"))?;
                    Ok((sub, dependents))
                })
            })
            .await
    }

    /// Deletes the caller's subscription; subscriptions with dependent
    /// operational intents may not be removed.
    pub async fn delete_subscription(
        &self,
        manager: &Manager,
        id: Id,
        version: &str,
    ) -> DssResult<Subscription> {
        self.store
            .transact(|r| {
                let manager = manager.clone();
                let version = version.to_string();
                Box::pin(async move {
                    let old = r
                        .get_scd_subscription(&id)
                        .await
                        .map_err(|e| e.context("Could not get Subscription from repo"))?
                        .ok_or_else(|| {
                            DssError::NotFound(format!("Subscription {id} not found"))
                        })?;
                    if old.manager != manager {
                        return Err(DssError::PermissionDenied(format!(
                            "Subscription is owned by {}, but {} attempted to delete",
                            old.manager, manager
                        )));
                    }
                    if !Version::from(&old.version).matches(&version) {
                        return Err(DssError::VersionMismatch(format!(
                            "Subscription version {version} is not current"
                        )));
                    }
                    let dependents = r
                        .get_dependent_operational_intents(&id)
                        .await
                        .map_err(|e| e.context("Could not find dependent OperationalIntents"))?;
                    if !dependents.is_empty() {
                        return Err(DssError::BadRequest(format!(
                            "Subscriptions with dependent operational intents may not be removed ({} dependents)",
                            dependents.len()
                        )));
                    }
                    r.delete_scd_subscription(&id)
                        .await
                        .map_err(|e| e.context("Could not delete Subscription"))?;
                    Ok(old)
                })
            })
            .await
    }

    /// Searches the caller's subscriptions in the area of interest.
    pub async fn query_subscriptions(
        &self,
        manager: &Manager,
        aoi: &Volume4D,
    ) -> DssResult<Vec<(Subscription, Vec<Id>)>> {
        aoi.validate()?;
        let cells = aoi
            .calculate_spatial_covering()
            .map_err(|e| e.context("Invalid area of interest"))?;
        self.store
            .transact(|r| {
                let manager = manager.clone();
                let cells = cells.clone();
                Box::pin(async move {
                    let subs = r
                        .search_scd_subscriptions(&cells)
                        .await
                        .map_err(|e| e.context("Could not search Subscriptions in repo"))?;
                    let mut result = Vec::new();
                    for sub in subs {
                        if sub.manager != manager {
                            continue;
                        }
                        let dependents = r
                            .get_dependent_operational_intents(&sub.id)
                            .await
                            .map_err(|e| {
                                e.context("Could not find dependent OperationalIntents")
                            })?;
                        result.push((sub, dependents));
                    }
                    Ok(result)
                })
            })
            .await
    }
}

/// Resolves the subscription backing an operational intent: an explicit
/// reference, the existing intent's subscription on update, or a new
/// implicit one built from the request parameters.
async fn resolve_subscription(
    r: &mut Repository,
    manager: &Manager,
    params: &PutOperationalIntentParams,
    union: &UnionedExtents,
    old: Option<&OperationalIntent>,
) -> DssResult<Subscription> {
    let referenced = params
        .subscription_id
        .or_else(|| match (&params.new_subscription, old) {
            (None, Some(existing)) => Some(existing.subscription_id),
            _ => None,
        });
    if let Some(sub_id) = referenced {
        let sub = r
            .get_scd_subscription(&sub_id)
            .await
            .map_err(|e| e.context("Could not get Subscription from repo"))?
            .ok_or_else(|| DssError::NotFound(format!("Subscription {sub_id} not found")))?;
        if &sub.manager != manager {
            return Err(DssError::PermissionDenied(format!(
                "Subscription is owned by {}, but {} attempted to use it",
                sub.manager, manager
            )));
        }
        return Ok(sub);
    }

    let new_sub = params.new_subscription.as_ref().ok_or_else(|| {
        DssError::BadRequest(
            "Either subscription_id or new_subscription parameters are required".to_string(),
        )
    })?;
    let implicit = Subscription {
        id: Id::new_random(),
        manager: manager.clone(),
        version: Ovn(String::new()),
        notify_for_operational_intents: true,
        notify_for_constraints: new_sub.notify_for_constraints,
        uss_base_url: new_sub.uss_base_url.clone(),
        start_time: union.start_time,
        end_time: union.end_time,
        altitude_lo: union.altitude_lo,
        altitude_hi: union.altitude_hi,
        cells: union.cells.clone(),
        notification_index: 0,
        implicit: true,
    };
    r.insert_scd_subscription(&implicit)
        .await
        .map_err(|e| e.context("Could not create implicit Subscription"))
}

/// Deletes a subscription if it is implicit and no longer backs any
/// operational intent.
async fn release_implicit_subscription(r: &mut Repository, sub_id: &Id) -> DssResult<()> {
    let dependents = r
        .get_dependent_operational_intents(sub_id)
        .await
        .map_err(|e| e.context("Could not find dependent OperationalIntents"))?;
    if !dependents.is_empty() {
        return Ok(());
    }
    if let Some(sub) = r
        .get_scd_subscription(sub_id)
        .await
        .map_err(|e| e.context("Could not get Subscription from repo"))?
    {
        if sub.implicit {
            r.delete_scd_subscription(sub_id)
                .await
                .map_err(|e| e.context("Could not delete implicit Subscription"))?;
        }
    }
    Ok(())
}

/// The key check at the heart of the deconfliction handshake: every
/// operational intent and constraint overlapping the new extents must be
/// proven read by presenting its current OVN.
async fn check_keys(
    r: &mut Repository,
    writing_id: &Id,
    union: &UnionedExtents,
    keys: &[Ovn],
) -> DssResult<()> {
    let intents = r
        .search_operational_intents(&union.cells, union.start_time, union.end_time)
        .await
        .map_err(|e| e.context("Could not search OperationalIntents in repo"))?;
    let constraints = r
        .search_constraints(&union.cells, union.start_time, union.end_time)
        .await
        .map_err(|e| e.context("Could not search Constraints in repo"))?;

    let required_intents: Vec<_> = intents
        .iter()
        .filter(|o| o.id != *writing_id)
        .map(|o| o.to_ref(Some(&o.manager)))
        .collect();
    let required_constraints: Vec<_> = constraints
        .iter()
        .map(|c| c.to_ref(Some(&c.manager)))
        .collect();

    let missing_intents = missing_ovns(&required_intents, keys);
    let missing_constraints = missing_ovns(&required_constraints, keys);
    if missing_intents.is_empty() && missing_constraints.is_empty() {
        return Ok(());
    }
    Err(DssError::MissingOvns(AirspaceConflict {
        message: "Current OVNs are required for all operational intents and constraints \
                  intersecting the requested extents"
            .to_string(),
        missing_operational_intents: missing_intents,
        missing_constraints,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dss_core::models::geometry::{GeoPolygon, LatLngPoint, Volume3D};

    fn volume(start_min: i64, end_min: i64, lo: f32, hi: f32) -> Volume4D {
        use chrono::TimeZone;
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        Volume4D {
            spatial_volume: Volume3D {
                footprint: GeoPolygon {
                    vertices: vec![
                        LatLngPoint { lat: 37.427636, lng: -122.170502 },
                        LatLngPoint { lat: 37.408799, lng: -122.064069 },
                        LatLngPoint { lat: 37.421265, lng: -122.086504 },
                    ],
                },
                altitude_lo: Some(lo),
                altitude_hi: Some(hi),
            },
            start_time: Some(base + chrono::Duration::minutes(start_min)),
            end_time: Some(base + chrono::Duration::minutes(end_min)),
        }
    }

    #[test]
    fn test_union_extents_merges_bounds() {
        let union = union_extents(&[volume(10, 20, 50.0, 100.0), volume(0, 15, 80.0, 200.0)])
            .unwrap();
        assert_eq!(union.cells.len(), 20);
        assert_eq!(
            union.start_time.unwrap(),
            volume(0, 15, 0.0, 0.0).start_time.unwrap()
        );
        assert_eq!(
            union.end_time.unwrap(),
            volume(10, 20, 0.0, 0.0).end_time.unwrap()
        );
        assert_eq!(union.altitude_lo, Some(50.0));
        assert_eq!(union.altitude_hi, Some(200.0));
    }

    #[test]
    fn test_union_extents_rejects_empty() {
        assert!(matches!(
            union_extents(&[]),
            Err(DssError::BadRequest(_))
        ));
    }

    #[test]
    fn test_union_extents_rejects_invalid_volume() {
        assert!(union_extents(&[volume(20, 10, 0.0, 100.0)]).is_err());
    }
}
