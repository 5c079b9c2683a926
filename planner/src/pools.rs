// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Names of the pools and owners the planner allocates under

use ipam::{Owner, PoolId};

/// Cluster-wide tag pool, shared by the Backplane and all Sectors.
#[must_use]
pub fn tags() -> PoolId {
    PoolId::new("tags")
}

/// Address pool of the Backplane.
#[must_use]
pub fn backplane() -> PoolId {
    PoolId::new("backplane")
}

/// The private pool of a Sector.
#[must_use]
pub fn sector(name: &str) -> PoolId {
    PoolId::new(format!("{SECTOR_PREFIX}{name}"))
}

/// Instance addresses of subnet `subnet` of Sector `name`.
#[must_use]
pub fn instances(name: &str, subnet: &str) -> PoolId {
    PoolId::new(format!("{SECTOR_PREFIX}{name}/{SUBNET_PREFIX}{subnet}"))
}

/// Prefix shared by the instance pools of every subnet of Sector `name`.
pub(crate) fn instances_prefix(name: &str) -> String {
    format!("{SECTOR_PREFIX}{name}/{SUBNET_PREFIX}")
}

pub(crate) const RESERVED_PREFIX: &str = "reserved/";
pub(crate) const SECTOR_PREFIX: &str = "sector/";
pub(crate) const SUBNET_PREFIX: &str = "subnet/";

pub(crate) fn reserved_tag(tag: u32) -> Owner {
    Owner::new(format!("{RESERVED_PREFIX}{tag}"))
}

pub(crate) fn backplane_gateway() -> Owner {
    Owner::new("backplane/gateway")
}

pub(crate) fn backplane_zone_tag() -> Owner {
    Owner::new("backplane/zone")
}

pub(crate) fn backplane_vnet_tag() -> Owner {
    Owner::new("backplane/vnet")
}

/// Owner of the tag of Sector `name`.
#[must_use]
pub fn sector_tag(name: &str) -> Owner {
    Owner::new(format!("{SECTOR_PREFIX}{name}/tag"))
}

/// Owner of the Backplane-side address of the gateway of Sector `name`.
#[must_use]
pub fn sector_gateway(name: &str) -> Owner {
    Owner::new(format!("{SECTOR_PREFIX}{name}/gateway"))
}

pub(crate) fn subnet(name: &str) -> Owner {
    Owner::new(format!("{SUBNET_PREFIX}{name}"))
}

/// Owner of the address of instance `vmid`.
#[must_use]
pub fn instance(vmid: u32) -> Owner {
    Owner::new(format!("instance/{vmid}"))
}
