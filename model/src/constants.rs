// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Cluster-wide constants

use std::ops::RangeInclusive;

/// Tags handed out to Sectors.
pub const SECTOR_TAGS: RangeInclusive<u32> = 1001..=9999;
/// Tags for the Backplane zone (VRF VXLAN).
pub const BACKPLANE_ZONE_TAGS: RangeInclusive<u32> = 10..=99;
/// Tags for the Backplane virtual network.
pub const BACKPLANE_VNET_TAGS: RangeInclusive<u32> = 100..=999;
/// Every tag the cluster tag pool may issue.
pub const CLUSTER_TAGS: RangeInclusive<u32> = 1..=16_777_215;

/// Bytes lost to VXLAN encapsulation on the node uplinks.
pub const ENCAP_OVERHEAD: u16 = 50;
/// Smallest zone MTU we accept after deducting the overhead.
pub const MIN_ZONE_MTU: u16 = 576;

/// Longest prefix accepted for a Backplane, Sector or subnet CIDR.
/// Anything longer leaves no room for a gateway and a DNS appliance.
pub const MAX_PREFIX_LEN: u8 = 30;

pub const DEFAULT_ASN: u32 = 65000;

/// Platform identifiers of the Backplane objects.
pub const BACKPLANE_ID: &str = "bkpln";
pub const EVPN_CONTROLLER_ID: &str = "orbitevpn";

/// Naming of Sector-owned platform objects.
pub const SECTOR_PREFIX: &str = "sec";
pub const GATEWAY_SUFFIX: &str = "-gw";
pub const DNS_SUFFIX: &str = "-dns";

/// Gateway appliance interfaces.
pub const SECTOR_IFACE: &str = "eth0";
pub const BACKPLANE_IFACE: &str = "eth1";

/// Name of the implicit subnet of a Sector manifest that lists none.
pub const DEFAULT_SUBNET: &str = "default";

/// Host offsets within a subnet: the gateway takes network + 1, the DNS appliance network + 2.
pub const GATEWAY_HOST: u32 = 1;
pub const DNS_HOST: u32 = 2;
/// Hosts at the bottom of every subnet kept for Sector infrastructure; instance addresses are
/// handed out above them.
pub const RESERVED_HOSTS: u32 = 10;
