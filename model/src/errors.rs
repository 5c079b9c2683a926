// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Errors of manifest validation and of the Sector lifecycle

use crate::state::{SectorEvent, SectorState};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use thiserror::Error;

/// The reasons why a manifest is rejected before any planning takes place
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid name '{0}'")]
    InvalidName(String),
    #[error("Invalid host name '{0}'")]
    InvalidHostname(String),
    #[error("Cluster '{0}' has no nodes")]
    NoNodes(String),
    #[error("Node '{0}' is declared more than once")]
    DuplicateNode(String),
    #[error("Uplink MTU {mtu} of node '{node}' leaves less than {min} bytes after encapsulation")]
    MtuTooSmall { node: String, mtu: u16, min: u16 },
    #[error("Invalid autonomous system number {0}")]
    InvalidAsn(u32),
    #[error("Prefix {0} is too long: at most /{1} is supported")]
    PrefixTooLong(Ipv4Net, u8),
    #[error("Prefix {0} has host bits set")]
    Unaligned(Ipv4Net),
    #[error("Subnet {subnet} is not contained in sector prefix {cidr}")]
    SubnetOutsideSector { subnet: Ipv4Net, cidr: Ipv4Net },
    #[error("Subnet '{0}' is declared more than once")]
    DuplicateSubnet(String),
    #[error("Subnets {0} and {1} overlap")]
    OverlappingSubnets(Ipv4Net, Ipv4Net),
    #[error("Gateway address {0} is not on any subnet of the sector")]
    GatewayOffSubnet(Ipv4Addr),
    #[error("Static record address {0} is outside sector prefix {1}")]
    RecordOutsideSector(Ipv4Addr, Ipv4Net),
}

/// A lifecycle event that the current state does not accept
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Sector in state {from} cannot accept event {event}")]
pub struct InvalidTransition {
    pub from: SectorState,
    pub event: SectorEvent,
}
