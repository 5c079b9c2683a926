// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Objects managed on the virtualization platform

use ipnet::Ipv4Net;
use model::ApplianceTemplate;
use model::constants::{BACKPLANE_ID, EVPN_CONTROLLER_ID};
use model::naming;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr};

/// The EVPN controller all Backplane nodes peer through.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvpnController {
    pub id: String,
    pub asn: u32,
    pub peers: BTreeSet<IpAddr>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZoneKind {
    /// Routed EVPN zone. Its VRF VXLAN carries the tag.
    Evpn {
        controller: String,
        vrf_tag: u32,
        exit_nodes: BTreeSet<String>,
    },
    /// Plain VXLAN zone with static peers.
    Vxlan { peers: BTreeSet<IpAddr> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub kind: ZoneKind,
    pub mtu: u16,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vnet {
    pub id: String,
    pub zone: String,
    pub tag: u32,
    pub alias: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub vnet: String,
    pub cidr: Ipv4Net,
    pub gateway: Ipv4Addr,
    pub snat: bool,
}

/// A network interface of an appliance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nic {
    pub name: String,
    /// The virtual network the interface is bridged to.
    pub bridge: String,
    /// Addresses in interface notation. The first one is the primary.
    pub addresses: Vec<Ipv4Net>,
    pub gateway: Option<Ipv4Addr>,
}

/// An appliance instance (gateway or DNS).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appliance {
    pub hostname: String,
    pub template: ApplianceTemplate,
    pub nics: Vec<Nic>,
}

/// Configuration injected into a gateway appliance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub gateway: String,
    pub routes: String,
    pub nat: String,
}

/// A DNS appliance together with the records it serves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsZone {
    pub appliance: Appliance,
    pub records: String,
}

/// Identity of a platform object. The derived order ranks objects by dependency: an object
/// only ever depends on objects of a lower rank.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKey {
    Controller(String),
    Zone(String),
    Vnet(String),
    Subnet(String),
    Gateway(String),
    GatewayConfig(String),
    Dns(String),
}

impl ResourceKey {
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            ResourceKey::Controller(_) => 0,
            ResourceKey::Zone(_) => 1,
            ResourceKey::Vnet(_) => 2,
            ResourceKey::Subnet(_) => 3,
            ResourceKey::Gateway(_) => 4,
            ResourceKey::GatewayConfig(_) => 5,
            ResourceKey::Dns(_) => 6,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            ResourceKey::Controller(id)
            | ResourceKey::Zone(id)
            | ResourceKey::Vnet(id)
            | ResourceKey::Subnet(id)
            | ResourceKey::Gateway(id)
            | ResourceKey::GatewayConfig(id)
            | ResourceKey::Dns(id) => id,
        }
    }

    /// Whether the platform can change the object in place. Others are replaced.
    #[must_use]
    pub fn updatable(&self) -> bool {
        !matches!(self, ResourceKey::Subnet(_) | ResourceKey::Gateway(_))
    }

    /// The leading component of the id: `sec1001` for `sec1001-gw`.
    #[must_use]
    pub fn family(&self) -> &str {
        let id = self.id();
        id.split_once('-').map_or(id, |(family, _)| family)
    }

    /// Tag of the Sector owning this object, if it is a Sector object.
    #[must_use]
    pub fn sector_tag(&self) -> Option<u32> {
        naming::sector_tag(self.family())
    }

    fn kind(&self) -> &'static str {
        match self {
            ResourceKey::Controller(_) => "controller",
            ResourceKey::Zone(_) => "zone",
            ResourceKey::Vnet(_) => "vnet",
            ResourceKey::Subnet(_) => "subnet",
            ResourceKey::Gateway(_) => "gateway",
            ResourceKey::GatewayConfig(_) => "gateway-config",
            ResourceKey::Dns(_) => "dns",
        }
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind(), self.id())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resource {
    Controller(EvpnController),
    Zone(Zone),
    Vnet(Vnet),
    Subnet(Subnet),
    Gateway(Appliance),
    GatewayConfig(GatewayConfig),
    Dns(DnsZone),
}

impl Resource {
    #[must_use]
    pub fn key(&self) -> ResourceKey {
        match self {
            Resource::Controller(c) => ResourceKey::Controller(c.id.clone()),
            Resource::Zone(z) => ResourceKey::Zone(z.id.clone()),
            Resource::Vnet(v) => ResourceKey::Vnet(v.id.clone()),
            Resource::Subnet(s) => ResourceKey::Subnet(s.id.clone()),
            Resource::Gateway(g) => ResourceKey::Gateway(g.hostname.clone()),
            Resource::GatewayConfig(c) => ResourceKey::GatewayConfig(c.gateway.clone()),
            Resource::Dns(d) => ResourceKey::Dns(d.appliance.hostname.clone()),
        }
    }

    /// Keys of the objects this one cannot exist without.
    #[must_use]
    pub fn dependencies(&self) -> Vec<ResourceKey> {
        match self {
            Resource::Controller(_) => vec![],
            Resource::Zone(z) => match &z.kind {
                ZoneKind::Evpn { controller, .. } => {
                    vec![ResourceKey::Controller(controller.clone())]
                }
                ZoneKind::Vxlan { .. } => vec![],
            },
            Resource::Vnet(v) => vec![ResourceKey::Zone(v.zone.clone())],
            Resource::Subnet(s) => vec![ResourceKey::Vnet(s.vnet.clone())],
            Resource::Gateway(a) | Resource::Dns(DnsZone { appliance: a, .. }) => a
                .nics
                .iter()
                .map(|nic| ResourceKey::Vnet(nic.bridge.clone()))
                .collect(),
            Resource::GatewayConfig(c) => vec![ResourceKey::Gateway(c.gateway.clone())],
        }
    }
}

/// The set of platform objects one reconciliation chain is responsible for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    Backplane,
    Sector(u32),
}

impl Scope {
    #[must_use]
    pub fn owns(&self, key: &ResourceKey) -> bool {
        match self {
            Scope::Backplane => {
                key.family() == BACKPLANE_ID || key == &ResourceKey::Controller(EVPN_CONTROLLER_ID.to_owned())
            }
            Scope::Sector(tag) => key.sector_tag() == Some(*tag),
        }
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Backplane => write!(f, "backplane"),
            Scope::Sector(tag) => write!(f, "{}", naming::sector_id(*tag)),
        }
    }
}
