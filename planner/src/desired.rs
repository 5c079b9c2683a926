// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Desired state graphs

use model::{ApplianceTemplate, Cluster, Sector};
use platform::{ObservedState, Resource, ResourceKey, Scope};
use std::collections::BTreeMap;
use std::collections::btree_map::Values;
use tracing::warn;

/// The platform objects a scope should consist of, keyed by identity.
///
/// Iteration follows key order, which is dependency order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredState {
    scope: Scope,
    resources: BTreeMap<ResourceKey, Resource>,
}

impl DesiredState {
    #[must_use]
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            resources: BTreeMap::new(),
        }
    }
    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }
    /// Add `resource`. Objects outside of the scope are ignored.
    pub fn insert(&mut self, resource: Resource) {
        let key = resource.key();
        if self.scope.owns(&key) {
            self.resources.insert(key, resource);
        } else {
            warn!("Ignoring {key}: not part of {}", self.scope);
        }
    }
    #[must_use]
    pub fn get(&self, key: &ResourceKey) -> Option<&Resource> {
        self.resources.get(key)
    }
    #[must_use]
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.resources.contains_key(key)
    }
    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        self.resources.keys()
    }
    pub fn iter(&self) -> Values<'_, ResourceKey, Resource> {
        self.resources.values()
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
    /// The state the platform ends up in once this one is applied, for its scope.
    #[must_use]
    pub fn as_observed(&self) -> ObservedState {
        self.resources.values().cloned().collect::<Vec<_>>().into()
    }
}

impl<'a> IntoIterator for &'a DesiredState {
    type Item = &'a Resource;
    type IntoIter = Values<'a, ResourceKey, Resource>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Outcome of planning the Backplane.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackplaneDesiredState {
    pub cluster: Cluster,
    pub gateway_template: ApplianceTemplate,
    pub dns_template: ApplianceTemplate,
    pub resources: DesiredState,
}

/// Outcome of planning a Sector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectorDesiredState {
    pub sector: Sector,
    pub resources: DesiredState,
}

impl SectorDesiredState {
    #[must_use]
    pub fn scope(&self) -> Scope {
        Scope::Sector(self.sector.tag)
    }
}
