// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Actions on platform objects

use platform::{Resource, ResourceKey};
use std::fmt::Display;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Create(Resource),
    Update(Resource),
    Delete(ResourceKey),
}

impl Action {
    /// The object acted upon.
    #[must_use]
    pub fn key(&self) -> ResourceKey {
        match self {
            Action::Create(r) | Action::Update(r) => r.key(),
            Action::Delete(key) => key.clone(),
        }
    }

    #[must_use]
    pub fn is_delete(&self) -> bool {
        matches!(self, Action::Delete(_))
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Create(r) => write!(f, "create {}", r.key()),
            Action::Update(r) => write!(f, "update {}", r.key()),
            Action::Delete(key) => write!(f, "delete {key}"),
        }
    }
}
