// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Infrastructure reconciler.
//!
//! [`reconcile`] diffs desired state against what the platform holds and yields an ordered list
//! of [`Action`]s. The [`Reconciler`] applies such lists: sequentially within a Sector,
//! concurrently across Sectors, and drives each Sector through its lifecycle, recording where a
//! chain failed so that the next pass can resume from there.
//!
//! When a manifest update races with a reconciliation of the same Sector, the most recent
//! submission wins: the older reconciliation notices before its next action and stops.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc)]

pub mod action;
pub mod diff;
pub mod errors;
pub mod lease;
pub mod params;
mod reconciler;
pub mod status;

#[cfg(test)]
mod fixtures;

pub use action::Action;
pub use diff::reconcile;
pub use errors::{ReconcileError, StatusStoreError};
pub use lease::{Lease, SectorLeases};
pub use params::{ReconcilerParams, ReconcilerParamsBuilder};
pub use reconciler::{ClusterReport, Reconciler};
pub use status::{FailurePoint, FileStatusStore, MemoryStatusStore, SectorStatus, StatusStore};

use tracectl::trace_target;
trace_target!("reconciler", LevelFilter::INFO, &["orbit"]);
