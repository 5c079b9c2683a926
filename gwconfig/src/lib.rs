// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration synthesis for Sector gateway and DNS appliances.
//!
//! Everything here is a pure function of a [`model::Gateway`] or [`model::Sector`]: rendering
//! the same input twice yields byte-identical text, so a configuration push can be compared
//! against what the appliance already runs and skipped when nothing changed.
//!
//! Gateways route statically; no dynamic routing protocol configuration is ever emitted.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc)]

pub mod builder;
pub mod dns;
pub mod nat;
pub mod routes;

pub use builder::{ConfigBuilder, Render};
pub use dns::{ZoneFileError, ZoneRecords, render_dns_zone};
pub use nat::{NatRule, NatRuleSet, render_nat};
pub use routes::{StaticRoute, StaticRouteNhop, StaticRouteSet, render_routes};

use tracectl::trace_target;
trace_target!("gwconfig", LevelFilter::INFO, &["orbit"]);
