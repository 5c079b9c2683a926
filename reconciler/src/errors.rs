// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Reconciliation errors

use ipam::{IpamError, StoreError};
use model::InvalidTransition;
use planner::PlanError;
use platform::PlatformError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatusStoreError {
    #[error("I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed status record {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error(transparent)]
    Write(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Planning of {entity} failed: {source}")]
    Plan {
        entity: String,
        #[source]
        source: PlanError,
    },
    /// Some actions of a chain may have been applied; the chain can be resumed.
    #[error("{entity}: action #{action_index} ({action}) failed: {source}")]
    PartialApplyFailure {
        entity: String,
        action_index: usize,
        action: String,
        #[source]
        source: PlatformError,
    },
    #[error("Sector {sector}: generation {generation} was superseded by generation {current}")]
    Superseded {
        sector: String,
        generation: u64,
        current: u64,
    },
    #[error("Failed to observe the platform: {0}")]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Ipam(#[from] IpamError),
    #[error(transparent)]
    Store(#[from] StatusStoreError),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("No sector named {0}")]
    UnknownSector(String),
}
