// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Topology planner.
//!
//! The planner turns manifests into desired platform state. It consults the IPAM allocator for
//! every tag and address it needs; since allocations are keyed by owner, planning the same
//! manifest twice yields the same tags and addresses, which is what makes re-planning after a
//! crash safe.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc)]

mod backplane;
pub mod desired;
pub mod errors;
mod instance;
pub mod pools;
mod sector;

pub use desired::{BackplaneDesiredState, DesiredState, SectorDesiredState};
pub use errors::PlanError;

use ipam::Ipam;
use std::sync::Arc;

use tracectl::trace_target;
trace_target!("planner", LevelFilter::INFO, &["orbit"]);

/// Computes desired state of the Backplane and of Sectors.
#[derive(Clone)]
pub struct Planner {
    ipam: Arc<Ipam>,
}

impl Planner {
    #[must_use]
    pub fn new(ipam: Arc<Ipam>) -> Self {
        Self { ipam }
    }

    #[must_use]
    pub fn ipam(&self) -> &Ipam {
        &self.ipam
    }
}
