// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Lifecycle driver

use crate::action::Action;
use crate::diff::reconcile;
use crate::errors::ReconcileError;
use crate::lease::{Lease, SectorLeases};
use crate::params::ReconcilerParams;
use crate::status::{FailurePoint, SectorStatus, StatusStore};
use futures::stream::{self, StreamExt};
use model::{ClusterManifest, SectorEvent, SectorManifest, SectorState};
use planner::{BackplaneDesiredState, DesiredState, PlanError, Planner, SectorDesiredState};
use platform::{Platform, PlatformError, ResourceKey, RetryingPlatform, Scope};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const BACKPLANE: &str = "backplane";

fn plan_err(entity: &str) -> impl FnOnce(PlanError) -> ReconcileError + '_ {
    move |source| ReconcileError::Plan {
        entity: entity.to_owned(),
        source,
    }
}

fn sector_entity(name: &str) -> String {
    format!("sector {name}")
}

/// Outcome of reconciling every Sector of a cluster.
#[derive(Debug)]
pub struct ClusterReport {
    /// Per Sector, in manifest name order.
    pub sectors: Vec<(String, Result<SectorStatus, ReconcileError>)>,
    /// Orphaned objects that were deleted.
    pub orphans: Vec<ResourceKey>,
}

impl ClusterReport {
    #[must_use]
    pub fn failures(&self) -> usize {
        self.sectors.iter().filter(|(_, r)| r.is_err()).count()
    }
}

/// Drives the Backplane and Sectors towards their manifests.
///
/// A [`Reconciler`] trusts nothing it computed in a previous invocation: every pass re-plans
/// from the manifest (allocations being the only durable input) and re-observes the platform.
pub struct Reconciler<P> {
    platform: RetryingPlatform<P>,
    planner: Planner,
    status: Arc<dyn StatusStore>,
    leases: SectorLeases,
    params: ReconcilerParams,
}

impl<P: Platform> Reconciler<P> {
    pub fn new(
        platform: P,
        planner: Planner,
        status: Arc<dyn StatusStore>,
        params: ReconcilerParams,
    ) -> Self {
        debug!("{params}");
        Self {
            platform: RetryingPlatform::new(platform, params.retry_policy()),
            planner,
            status,
            leases: SectorLeases::new(),
            params,
        }
    }

    pub fn platform(&self) -> &P {
        self.platform.inner()
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn leases(&self) -> &SectorLeases {
        &self.leases
    }

    pub fn params(&self) -> &ReconcilerParams {
        &self.params
    }

    /// Status records of every Sector seen so far.
    pub fn statuses(&self) -> Result<Vec<SectorStatus>, ReconcileError> {
        Ok(self.status.list()?)
    }

    pub fn status(&self, name: &str) -> Result<Option<SectorStatus>, ReconcileError> {
        Ok(self.status.load(name)?)
    }

    /// Apply `actions` one after the other, checking `lease` before each of them.
    ///
    /// Deleting an object that is already gone counts as done. Nothing is rolled back when an
    /// action fails; the error carries the 1-based index of the failed action.
    async fn execute(
        &self,
        entity: &str,
        actions: &[Action],
        lease: Option<&Lease>,
    ) -> Result<(), ReconcileError> {
        for (index, action) in actions.iter().enumerate() {
            if let Some(lease) = lease {
                self.leases.check(lease)?;
            }
            let result = match action {
                Action::Create(resource) => self.platform.create(resource).await,
                Action::Update(resource) => self.platform.update(resource).await,
                Action::Delete(key) => match self.platform.delete(key).await {
                    Err(PlatformError::NotFound(_)) => {
                        debug!("{entity}: {key} is already gone");
                        Ok(())
                    }
                    other => other,
                },
            };
            match result {
                Ok(()) => info!("{entity}: applied action #{} {action}", index + 1),
                Err(source) => {
                    return Err(ReconcileError::PartialApplyFailure {
                        entity: entity.to_owned(),
                        action_index: index + 1,
                        action: action.to_string(),
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Whether `lease` still holds after an await point. A superseded run must not touch the
    /// status anymore.
    fn hold(&self, lease: &Lease) -> Result<(), ReconcileError> {
        self.leases
            .check(lease)
            .inspect_err(|err| warn!("{err}, leaving sector {} to the newer run", lease.sector()))
    }

    /// Record the failure of a chain in `status`. A provisioning Sector enters
    /// [`SectorState::Degraded`], one being torn down stays [`SectorState::TearingDown`].
    fn degrade(&self, status: &mut SectorStatus, err: &ReconcileError) -> Result<(), ReconcileError> {
        let failure = match err {
            ReconcileError::PartialApplyFailure {
                action_index,
                action,
                source,
                ..
            } => FailurePoint {
                action_index: *action_index,
                action: action.clone(),
                reason: source.to_string(),
            },
            other => FailurePoint {
                action_index: 0,
                action: "observe".to_owned(),
                reason: other.to_string(),
            },
        };
        status.advance(&[SectorEvent::ApplyFailed])?;
        if status.state == SectorState::TearingDown {
            error!("Teardown of sector {} failed at {failure}", status.name);
        } else {
            error!("Sector {} is degraded: failed at {failure}", status.name);
        }
        status.failure = Some(failure);
        self.status.store(status)?;
        Ok(())
    }

    /// Plan the Backplane and bring the platform in line with it.
    pub async fn init(
        &self,
        cluster: &ClusterManifest,
    ) -> Result<BackplaneDesiredState, ReconcileError> {
        let plan = self
            .planner
            .plan_backplane(cluster)
            .map_err(plan_err(BACKPLANE))?;
        let actual = self.platform.observe().await?;
        let actions = reconcile(&plan.resources, &actual);
        if actions.is_empty() {
            debug!("Backplane of {} is up to date", cluster.name);
        } else {
            info!("Backplane of {}: applying {} actions", cluster.name, actions.len());
            self.execute(BACKPLANE, &actions, None).await?;
        }
        Ok(plan)
    }

    /// Plan a Sector and compute the actions that would bring it in line, without applying
    /// them. Tags and addresses of a new Sector are allocated all the same.
    pub async fn preview_sector(
        &self,
        manifest: &SectorManifest,
        backplane: &BackplaneDesiredState,
    ) -> Result<(SectorDesiredState, Vec<Action>), ReconcileError> {
        let plan = self
            .planner
            .plan_sector(manifest, backplane)
            .map_err(plan_err(&sector_entity(&manifest.name)))?;
        let actual = self.platform.observe().await?;
        let actions = reconcile(&plan.resources, &actual);
        Ok((plan, actions))
    }

    /// Reconcile one Sector with its manifest.
    ///
    /// A Sector that fails half-way is left [`SectorState::Degraded`] with its failure point
    /// recorded; reconciling it again resumes where it stopped. A reconciliation superseded by a
    /// newer one, or by a delete, stops at its next step and leaves the status to its successor.
    /// A Sector being torn down cannot be reconciled.
    pub async fn apply_sector(
        &self,
        manifest: &SectorManifest,
        backplane: &BackplaneDesiredState,
    ) -> Result<SectorStatus, ReconcileError> {
        let name = &manifest.name;
        let entity = sector_entity(name);
        let mut status = match self.status.load(name)? {
            Some(status) if status.state == SectorState::Deleted => {
                debug!("Sector name {name} is reused");
                SectorStatus::new(name)
            }
            Some(status) => status,
            None => SectorStatus::new(name),
        };
        // a pending delete keeps its lease
        if status.state == SectorState::TearingDown {
            return Err(model::InvalidTransition {
                from: status.state,
                event: SectorEvent::DesiredChanged,
            }
            .into());
        }
        let lease = self.leases.acquire(name, Some(manifest.generation))?;

        let plan = self
            .planner
            .plan_sector(manifest, backplane)
            .map_err(plan_err(&entity))?;
        status.tag = Some(plan.sector.tag);
        status.generation = manifest.generation;
        match status.state {
            SectorState::Requested => {
                status.advance(&[SectorEvent::Accepted, SectorEvent::Planned])?;
            }
            SectorState::Planning => status.advance(&[SectorEvent::Planned])?,
            _ => {}
        }
        self.status.store(&status)?;

        let observed = self.platform.observe().await;
        self.hold(&lease)?;
        let actual = match observed {
            Ok(actual) => actual,
            Err(e) => {
                let err = ReconcileError::Platform(e);
                if status.state == SectorState::Provisioning {
                    self.degrade(&mut status, &err)?;
                }
                return Err(err);
            }
        };
        let actions = reconcile(&plan.resources, &actual);
        match status.state {
            SectorState::Active if actions.is_empty() => {
                debug!("Sector {name} is up to date");
                self.status.store(&status)?;
                return Ok(status);
            }
            SectorState::Active => status.advance(&[SectorEvent::DesiredChanged])?,
            SectorState::Degraded => status.advance(&[SectorEvent::Retry])?,
            _ => {}
        }
        self.status.store(&status)?;

        info!(
            "Sector {name} ({}): applying {} actions for generation {}",
            plan.sector.platform_id(),
            actions.len(),
            manifest.generation
        );
        let applied = self.execute(&entity, &actions, Some(&lease)).await;
        self.hold(&lease)?;
        match applied {
            Ok(()) => {
                status.advance(&[SectorEvent::Applied])?;
                self.status.store(&status)?;
                info!("Sector {name} is active");
                Ok(status)
            }
            Err(err @ ReconcileError::PartialApplyFailure { .. }) => {
                self.degrade(&mut status, &err)?;
                Err(err)
            }
            Err(err) => {
                warn!("Sector {name}: {err}");
                Err(err)
            }
        }
    }

    /// Tear a Sector down, and release its allocations once nothing on the platform refers to
    /// them anymore. Deleting a deleted Sector is a no-op.
    ///
    /// A teardown that fails half-way leaves the Sector [`SectorState::TearingDown`] with its
    /// failure point recorded; deleting it again resumes the teardown.
    pub async fn delete_sector(&self, name: &str) -> Result<SectorStatus, ReconcileError> {
        let entity = sector_entity(name);
        let lease = self.leases.acquire(name, None)?;
        let mut status = match self.status.load(name)? {
            Some(status) if status.state == SectorState::Deleted => return Ok(status),
            Some(status) => status,
            None => SectorStatus::new(name),
        };
        let tag = match status.tag {
            Some(tag) => Some(tag),
            None => self.planner.sector_tag(name).map_err(plan_err(&entity))?,
        };
        if tag.is_none() && status.state == SectorState::Requested {
            return Err(ReconcileError::UnknownSector(name.to_owned()));
        }
        status.tag = tag;
        status.advance(&[SectorEvent::DeleteRequested])?;
        self.status.store(&status)?;

        if let Some(tag) = tag {
            let observed = self.platform.observe().await;
            self.hold(&lease)?;
            let actual = match observed {
                Ok(actual) => actual,
                Err(e) => {
                    let err = ReconcileError::Platform(e);
                    self.degrade(&mut status, &err)?;
                    return Err(err);
                }
            };
            let actions = reconcile(&DesiredState::new(Scope::Sector(tag)), &actual);
            info!("Sector {name}: tearing down {} objects", actions.len());
            let applied = self.execute(&entity, &actions, Some(&lease)).await;
            self.hold(&lease)?;
            match applied {
                Ok(()) => {}
                Err(err @ ReconcileError::PartialApplyFailure { .. }) => {
                    self.degrade(&mut status, &err)?;
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        }

        // only now can the tag and addresses go to someone else
        self.planner.release_sector(name).map_err(plan_err(&entity))?;
        status.advance(&[SectorEvent::TornDown])?;
        self.status.store(&status)?;
        info!("Sector {name} is deleted");
        Ok(status)
    }

    /// Delete Sector objects whose tag is not in `keep`.
    pub async fn sweep_orphans(
        &self,
        keep: &BTreeSet<u32>,
    ) -> Result<Vec<ResourceKey>, ReconcileError> {
        let actual = self.platform.observe().await?;
        let orphaned: BTreeSet<u32> = actual
            .keys()
            .filter_map(ResourceKey::sector_tag)
            .filter(|tag| !keep.contains(tag))
            .collect();
        let mut removed = vec![];
        for tag in orphaned {
            let scope = Scope::Sector(tag);
            let actions = reconcile(&DesiredState::new(scope), &actual);
            warn!("Removing {} orphaned objects of {scope}", actions.len());
            self.execute(&scope.to_string(), &actions, None).await?;
            removed.extend(actions.iter().map(Action::key));
        }
        Ok(removed)
    }

    /// Tags claimed by a live status record or by an allocation.
    fn claimed_tags(&self) -> Result<BTreeSet<u32>, ReconcileError> {
        let mut tags: BTreeSet<u32> = self
            .status
            .list()?
            .iter()
            .filter(|s| s.state.is_live())
            .filter_map(|s| s.tag)
            .collect();
        tags.extend(self.planner.sector_tags().map_err(plan_err("sectors"))?);
        Ok(tags)
    }

    /// Reconcile every Sector of `manifests`, several at a time, then sweep orphans.
    ///
    /// Orphans are only swept if every Sector could at least be planned.
    pub async fn apply_all(
        &self,
        manifests: &[SectorManifest],
        backplane: &BackplaneDesiredState,
    ) -> Result<ClusterReport, ReconcileError> {
        let mut sectors: Vec<_> = stream::iter(manifests)
            .map(|manifest| async move {
                (
                    manifest.name.clone(),
                    self.apply_sector(manifest, backplane).await,
                )
            })
            .buffer_unordered(self.params.parallelism.max(1))
            .collect()
            .await;
        sectors.sort_by(|(a, _), (b, _)| a.cmp(b));

        let unplanned = sectors
            .iter()
            .any(|(_, r)| matches!(r, Err(ReconcileError::Plan { .. })));
        let orphans = if unplanned {
            warn!("Skipping orphan sweep: some sectors could not be planned");
            vec![]
        } else {
            self.sweep_orphans(&self.claimed_tags()?).await?
        };
        Ok(ClusterReport { sectors, orphans })
    }
}
