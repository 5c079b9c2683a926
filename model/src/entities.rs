// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Resolved entities: manifests with every tag and address filled in.

use crate::constants::{BACKPLANE_IFACE, SECTOR_IFACE};
use crate::manifest::ApplianceTemplate;
use crate::naming;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub management_address: IpAddr,
    pub uplink_mtu: u16,
}

/// The cluster-wide overlay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backplane {
    pub cidr: Ipv4Net,
    pub gateway: Ipv4Addr,
    pub asn: u32,
    /// Tag of the EVPN zone (the VRF VXLAN).
    pub zone_tag: u32,
    /// Tag of the virtual network carrying the Backplane subnet.
    pub vnet_tag: u32,
    pub mtu: u16,
    pub exit_nodes: BTreeSet<String>,
    pub peers: BTreeSet<IpAddr>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    pub nodes: BTreeMap<String, Node>,
    pub backplane: Backplane,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subnet {
    pub name: String,
    pub cidr: Ipv4Net,
    pub gateway: Ipv4Addr,
}

/// The translation gateway of a Sector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gateway {
    pub hostname: String,
    /// Sector-side address: network address of the Sector prefix + 1.
    pub address: Ipv4Addr,
    /// One address per attached subnet, in interface notation.
    pub sector_addresses: Vec<Ipv4Net>,
    /// Address allocated from the Backplane pool, in interface notation.
    pub backplane_address: Ipv4Net,
    pub backplane_gateway: Ipv4Addr,
    pub sector_iface: String,
    pub backplane_iface: String,
    pub template: ApplianceTemplate,
}

impl Gateway {
    #[must_use]
    pub fn new(
        tag: u32,
        address: Ipv4Addr,
        subnets: &[Subnet],
        backplane_address: Ipv4Net,
        backplane_gateway: Ipv4Addr,
        template: ApplianceTemplate,
    ) -> Self {
        Self {
            hostname: naming::gateway_hostname(tag),
            address,
            sector_addresses: subnets
                .iter()
                .map(|s| crate::addr::on_link(s.gateway, &s.cidr))
                .collect(),
            backplane_address,
            backplane_gateway,
            sector_iface: SECTOR_IFACE.to_owned(),
            backplane_iface: BACKPLANE_IFACE.to_owned(),
            template,
        }
    }

    /// The Backplane network the gateway is attached to.
    #[must_use]
    pub fn backplane_network(&self) -> Ipv4Net {
        self.backplane_address.trunc()
    }

    /// Prefixes of the subnets attached to the Sector side.
    pub fn sector_networks(&self) -> impl Iterator<Item = Ipv4Net> + '_ {
        self.sector_addresses.iter().map(Ipv4Net::trunc)
    }
}

/// The DNS appliance of a Sector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsZone {
    pub hostname: String,
    pub address: Ipv4Net,
    pub template: ApplianceTemplate,
    /// Records supplied by the manifest, by address.
    pub static_records: BTreeMap<Ipv4Addr, BTreeSet<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sector {
    pub name: String,
    pub generation: u64,
    pub tag: u32,
    pub cidr: Ipv4Net,
    pub mtu: u16,
    pub subnets: Vec<Subnet>,
    pub gateway: Gateway,
    pub dns: Option<DnsZone>,
}

impl Sector {
    /// Platform identifier of the Sector zone and virtual network.
    #[must_use]
    pub fn platform_id(&self) -> String {
        naming::sector_id(self.tag)
    }
}
