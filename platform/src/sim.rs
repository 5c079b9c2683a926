// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! In-memory platform.
//!
//! [`SimPlatform`] enforces the same referential rules a real SDN controller does: an object can
//! only be created once the objects it is attached to exist, and cannot be deleted while
//! something is still attached to it. Faults can be queued to make upcoming mutations fail, and
//! every successful mutation is logged. Optionally, the state is mirrored to a YAML file so it
//! survives the process.

use crate::Platform;
use crate::errors::PlatformError;
use crate::objects::{Resource, ResourceKey};
use crate::state::ObservedState;
use ipam::StoreError;
use ipam::store::write_atomic;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::Display;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

/// A successful mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mutation {
    pub kind: MutationKind,
    pub key: ResourceKey,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FaultKind {
    Transient,
    Reject,
}

/// A failure to inject into upcoming mutations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fault {
    kind: FaultKind,
    times: usize,
    after: usize,
    key: Option<ResourceKey>,
}

impl Fault {
    /// Fail the next `times` mutations with a transient error.
    #[must_use]
    pub fn transient(times: usize) -> Self {
        Self {
            kind: FaultKind::Transient,
            times,
            after: 0,
            key: None,
        }
    }
    /// Reject the next `times` mutations.
    #[must_use]
    pub fn reject(times: usize) -> Self {
        Self {
            kind: FaultKind::Reject,
            ..Self::transient(times)
        }
    }
    /// Let `count` matching mutations through before failing.
    #[must_use]
    pub fn after(mut self, count: usize) -> Self {
        self.after = count;
        self
    }
    /// Only match mutations of `key`.
    #[must_use]
    pub fn on(mut self, key: ResourceKey) -> Self {
        self.key = Some(key);
        self
    }
    fn matches(&self, key: &ResourceKey) -> bool {
        self.key.as_ref().is_none_or(|k| k == key)
    }
    fn error(&self, key: &ResourceKey) -> PlatformError {
        match self.kind {
            FaultKind::Transient => PlatformError::Transient(format!("injected fault on {key}")),
            FaultKind::Reject => PlatformError::Rejected {
                key: key.clone(),
                reason: "injected fault".to_owned(),
            },
        }
    }
}

/// Failures to load or save a simulator snapshot
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O failure on {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("Malformed snapshot {0}: {1}")]
    Malformed(PathBuf, String),
    #[error(transparent)]
    Write(#[from] StoreError),
}

#[derive(Debug, Default)]
struct Inner {
    state: ObservedState,
    faults: VecDeque<Fault>,
    log: Vec<Mutation>,
    latency: Duration,
}

impl Inner {
    /// Consume the fault applicable to a mutation of `key`, if any.
    fn fault(&mut self, key: &ResourceKey) -> Result<(), PlatformError> {
        let Some(fault) = self.faults.front_mut() else {
            return Ok(());
        };
        if !fault.matches(key) {
            return Ok(());
        }
        if fault.after > 0 {
            fault.after -= 1;
            return Ok(());
        }
        let err = fault.error(key);
        fault.times = fault.times.saturating_sub(1);
        if fault.times == 0 {
            self.faults.pop_front();
        }
        Err(err)
    }
}

#[derive(Debug, Default)]
pub struct SimPlatform {
    inner: Mutex<Inner>,
    snapshot: Option<PathBuf>,
}

fn rejected(key: &ResourceKey, reason: impl Into<String>) -> PlatformError {
    PlatformError::Rejected {
        key: key.clone(),
        reason: reason.into(),
    }
}

fn check_dependencies(state: &ObservedState, resource: &Resource) -> Result<(), PlatformError> {
    match resource
        .dependencies()
        .into_iter()
        .find(|dep| !state.contains(dep))
    {
        Some(missing) => Err(rejected(
            &resource.key(),
            format!("depends on missing {missing}"),
        )),
        None => Ok(()),
    }
}

impl SimPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A simulator mirrored to `path`, starting from its contents if it exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let path = path.into();
        let state = if path.exists() {
            let text =
                fs::read_to_string(&path).map_err(|e| SnapshotError::Io(path.clone(), e))?;
            serde_yaml_ng::from_str(&text)
                .map_err(|e| SnapshotError::Malformed(path.clone(), e.to_string()))?
        } else {
            ObservedState::new()
        };
        info!(
            "Simulated platform loaded {} objects from {}",
            state.len(),
            path.display()
        );
        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                ..Inner::default()
            }),
            snapshot: Some(path),
        })
    }

    fn save(path: &Path, state: &ObservedState) -> Result<(), SnapshotError> {
        let text = serde_yaml_ng::to_string(state)
            .map_err(|e| SnapshotError::Malformed(path.to_path_buf(), e.to_string()))?;
        write_atomic(path, text.as_bytes())?;
        Ok(())
    }

    /// Queue a fault. Faults apply in order; only the oldest one is active.
    pub fn inject(&self, fault: Fault) {
        self.inner.lock().faults.push_back(fault);
    }

    #[must_use]
    pub fn pending_faults(&self) -> usize {
        self.inner.lock().faults.len()
    }

    /// Make every call take `latency` before it is served.
    pub fn set_latency(&self, latency: Duration) {
        self.inner.lock().latency = latency;
    }

    /// Successful mutations so far, oldest first.
    #[must_use]
    pub fn mutations(&self) -> Vec<Mutation> {
        self.inner.lock().log.clone()
    }

    pub fn clear_mutations(&self) {
        self.inner.lock().log.clear();
    }

    /// Place an object directly, bypassing faults and checks. Stands for objects created out of
    /// band.
    pub fn seed(&self, resource: Resource) {
        self.inner.lock().state.insert(resource);
    }

    /// A copy of the current state, without latency or faults.
    #[must_use]
    pub fn snapshot(&self) -> ObservedState {
        self.inner.lock().state.clone()
    }

    async fn delay(&self) {
        let latency = self.inner.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn mutate(
        &self,
        kind: MutationKind,
        key: &ResourceKey,
        f: impl FnOnce(&mut ObservedState) -> Result<(), PlatformError>,
    ) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock();
        inner.fault(key)?;
        let mut next = inner.state.clone();
        f(&mut next)?;
        if let Some(path) = &self.snapshot {
            Self::save(path, &next).map_err(|e| PlatformError::Transient(e.to_string()))?;
        }
        inner.state = next;
        inner.log.push(Mutation {
            kind,
            key: key.clone(),
        });
        debug!("Simulated platform: {kind} {key}");
        Ok(())
    }
}

impl Platform for SimPlatform {
    async fn observe(&self) -> Result<ObservedState, PlatformError> {
        self.delay().await;
        Ok(self.snapshot())
    }

    async fn create(&self, resource: &Resource) -> Result<(), PlatformError> {
        self.delay().await;
        let key = resource.key();
        self.mutate(MutationKind::Create, &key, |state| {
            if state.contains(&key) {
                return Err(rejected(&key, "already exists"));
            }
            check_dependencies(state, resource)?;
            state.insert(resource.clone());
            Ok(())
        })
    }

    async fn update(&self, resource: &Resource) -> Result<(), PlatformError> {
        self.delay().await;
        let key = resource.key();
        self.mutate(MutationKind::Update, &key, |state| {
            if !key.updatable() {
                return Err(rejected(&key, "cannot be updated in place"));
            }
            if !state.contains(&key) {
                return Err(PlatformError::NotFound(key.clone()));
            }
            check_dependencies(state, resource)?;
            state.insert(resource.clone());
            Ok(())
        })
    }

    async fn delete(&self, key: &ResourceKey) -> Result<(), PlatformError> {
        self.delay().await;
        self.mutate(MutationKind::Delete, key, |state| {
            if !state.contains(key) {
                return Err(PlatformError::NotFound(key.clone()));
            }
            // configuration injected into a gateway goes away with it
            let config = match key {
                ResourceKey::Gateway(id) => Some(ResourceKey::GatewayConfig(id.clone())),
                _ => None,
            };
            if let Some(user) = state
                .dependents(key)
                .map(Resource::key)
                .find(|k| Some(k) != config.as_ref())
            {
                return Err(rejected(key, format!("still used by {user}")));
            }
            state.remove(key);
            if let Some(config) = config {
                state.remove(&config);
            }
            Ok(())
        })
    }
}
