// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Resource model of an orbit cluster.
//!
//! Two families of types live here. Manifests ([`ClusterManifest`], [`SectorManifest`]) are the
//! declarative, already-deserialized input. Entities ([`Cluster`], [`Backplane`], [`Sector`],
//! [`Gateway`], ...) are the resolved form of a manifest once every tag and address in it has
//! been allocated. Neither carries behavior beyond validation and a few derived values.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc)]

pub mod addr;
pub mod constants;
pub mod entities;
pub mod errors;
pub mod manifest;
pub mod naming;
pub mod state;

pub use entities::{Backplane, Cluster, DnsZone, Gateway, Node, Sector, Subnet};
pub use errors::{InvalidTransition, ValidationError};
pub use manifest::{
    ApplianceTemplate, BackplaneManifest, ClusterManifest, DnsManifest, NodeManifest,
    SectorManifest, StaticRecord, SubnetManifest,
};
pub use state::{SectorEvent, SectorState};

use tracectl::trace_target;
trace_target!("model", LevelFilter::INFO, &["orbit"]);
