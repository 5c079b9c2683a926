// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Observed platform state

use crate::objects::{Resource, ResourceKey, Scope};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Values;

/// Every managed-looking object present on the platform, keyed by identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Resource>", into = "Vec<Resource>")]
pub struct ObservedState {
    resources: BTreeMap<ResourceKey, Resource>,
}

impl ObservedState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn get(&self, key: &ResourceKey) -> Option<&Resource> {
        self.resources.get(key)
    }
    #[must_use]
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.resources.contains_key(key)
    }
    /// Insert `resource`, returning the object it replaces.
    pub fn insert(&mut self, resource: Resource) -> Option<Resource> {
        self.resources.insert(resource.key(), resource)
    }
    pub fn remove(&mut self, key: &ResourceKey) -> Option<Resource> {
        self.resources.remove(key)
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

    /// The objects belonging to `scope`.
    #[must_use]
    pub fn scoped(&self, scope: Scope) -> ObservedState {
        self.resources
            .values()
            .filter(|r| scope.owns(&r.key()))
            .cloned()
            .collect::<Vec<_>>()
            .into()
    }

    /// Objects depending on `key`.
    pub fn dependents<'a>(&'a self, key: &'a ResourceKey) -> impl Iterator<Item = &'a Resource> {
        self.resources
            .values()
            .filter(move |r| r.dependencies().contains(key))
    }
}

impl From<Vec<Resource>> for ObservedState {
    fn from(resources: Vec<Resource>) -> Self {
        Self {
            resources: resources.into_iter().map(|r| (r.key(), r)).collect(),
        }
    }
}

impl From<ObservedState> for Vec<Resource> {
    fn from(state: ObservedState) -> Self {
        state.resources.into_values().collect()
    }
}

impl<'a> IntoIterator for &'a ObservedState {
    type Item = &'a Resource;
    type IntoIter = Values<'a, ResourceKey, Resource>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
