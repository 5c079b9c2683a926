// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Declarative manifests: the cluster with its Backplane, and the Sectors.

use crate::addr;
use crate::constants::{DEFAULT_ASN, DEFAULT_SUBNET, ENCAP_OVERHEAD, MAX_PREFIX_LEN, MIN_ZONE_MTU};
use crate::errors::ValidationError;
use crate::naming::{is_valid_hostname, is_valid_name};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

fn check_prefix(cidr: &Ipv4Net) -> Result<(), ValidationError> {
    if cidr.prefix_len() > MAX_PREFIX_LEN {
        return Err(ValidationError::PrefixTooLong(*cidr, MAX_PREFIX_LEN));
    }
    if cidr.trunc() != *cidr {
        return Err(ValidationError::Unaligned(*cidr));
    }
    Ok(())
}

fn check_name(name: &str) -> Result<(), ValidationError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(ValidationError::InvalidName(name.to_owned()))
    }
}

/// A virtualization host, as discovered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeManifest {
    pub name: String,
    /// Address the EVPN controller peers with.
    pub management_address: IpAddr,
    /// MTU of the node's uplink bridge.
    pub uplink_mtu: u16,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackplaneManifest {
    pub cidr: Ipv4Net,
    #[serde(default = "default_asn")]
    pub asn: u32,
}

fn default_asn() -> u32 {
    DEFAULT_ASN
}

/// Reference to an appliance image plus its sizing. The image itself is managed elsewhere.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplianceTemplate {
    pub template: String,
    pub cores: u8,
    pub memory_mib: u32,
}

impl ApplianceTemplate {
    #[must_use]
    pub fn gateway_default() -> Self {
        Self {
            template: "orbit-gateway".to_owned(),
            cores: 1,
            memory_mib: 512,
        }
    }
    #[must_use]
    pub fn dns_default() -> Self {
        Self {
            template: "orbit-dns".to_owned(),
            cores: 1,
            memory_mib: 256,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterManifest {
    pub name: String,
    pub nodes: Vec<NodeManifest>,
    pub backplane: BackplaneManifest,
    /// Tags already taken on the platform by objects we do not manage.
    #[serde(default)]
    pub reserved_tags: BTreeSet<u32>,
    #[serde(default = "ApplianceTemplate::gateway_default")]
    pub gateway_template: ApplianceTemplate,
    #[serde(default = "ApplianceTemplate::dns_default")]
    pub dns_template: ApplianceTemplate,
}

impl ClusterManifest {
    /// Check that the manifest is self-consistent.
    pub fn validate(&self) -> Result<(), ValidationError> {
        debug!("Validating cluster manifest '{}'", self.name);
        check_name(&self.name)?;
        if self.nodes.is_empty() {
            return Err(ValidationError::NoNodes(self.name.clone()));
        }
        let mut seen = BTreeSet::new();
        for node in &self.nodes {
            check_name(&node.name)?;
            if !seen.insert(node.name.as_str()) {
                return Err(ValidationError::DuplicateNode(node.name.clone()));
            }
            if node.uplink_mtu.saturating_sub(ENCAP_OVERHEAD) < MIN_ZONE_MTU {
                return Err(ValidationError::MtuTooSmall {
                    node: node.name.clone(),
                    mtu: node.uplink_mtu,
                    min: MIN_ZONE_MTU,
                });
            }
        }
        if self.backplane.asn == 0 {
            return Err(ValidationError::InvalidAsn(self.backplane.asn));
        }
        check_prefix(&self.backplane.cidr)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetManifest {
    pub name: String,
    pub cidr: Ipv4Net,
}

/// A host record published by the Sector DNS appliance.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StaticRecord {
    pub name: String,
    pub address: Ipv4Addr,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsManifest {
    #[serde(default)]
    pub records: Vec<StaticRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorManifest {
    pub name: String,
    /// Bumped by the manifest writer on every change. A newer generation supersedes any
    /// reconciliation still running for an older one.
    #[serde(default)]
    pub generation: u64,
    pub cidr: Ipv4Net,
    #[serde(default)]
    pub subnets: Vec<SubnetManifest>,
    #[serde(default)]
    pub dns: Option<DnsManifest>,
}

impl SectorManifest {
    #[must_use]
    pub fn new(name: &str, cidr: Ipv4Net) -> Self {
        Self {
            name: name.to_owned(),
            generation: 0,
            cidr,
            subnets: vec![],
            dns: None,
        }
    }

    /// The subnets the Sector actually gets: the listed ones, or a single subnet spanning the
    /// whole Sector prefix if none is listed.
    #[must_use]
    pub fn effective_subnets(&self) -> Vec<SubnetManifest> {
        if self.subnets.is_empty() {
            vec![SubnetManifest {
                name: DEFAULT_SUBNET.to_owned(),
                cidr: self.cidr,
            }]
        } else {
            self.subnets.clone()
        }
    }

    /// Check that the manifest is self-consistent.
    pub fn validate(&self) -> Result<(), ValidationError> {
        debug!("Validating sector manifest '{}'", self.name);
        check_name(&self.name)?;
        check_prefix(&self.cidr)?;

        let subnets = self.effective_subnets();
        let mut names = BTreeSet::new();
        for (n, subnet) in subnets.iter().enumerate() {
            check_name(&subnet.name)?;
            check_prefix(&subnet.cidr)?;
            if !names.insert(subnet.name.as_str()) {
                return Err(ValidationError::DuplicateSubnet(subnet.name.clone()));
            }
            if !self.cidr.contains(&subnet.cidr) {
                return Err(ValidationError::SubnetOutsideSector {
                    subnet: subnet.cidr,
                    cidr: self.cidr,
                });
            }
            if let Some(other) = subnets[..n]
                .iter()
                .find(|other| addr::overlaps(&other.cidr, &subnet.cidr))
            {
                return Err(ValidationError::OverlappingSubnets(other.cidr, subnet.cidr));
            }
        }

        let gateway = addr::gateway(&self.cidr);
        if !subnets.iter().any(|s| s.cidr.contains(&gateway)) {
            return Err(ValidationError::GatewayOffSubnet(gateway));
        }

        if let Some(dns) = &self.dns {
            for record in &dns.records {
                if !is_valid_hostname(&record.name) {
                    return Err(ValidationError::InvalidHostname(record.name.clone()));
                }
                if !self.cidr.contains(&record.address) {
                    return Err(ValidationError::RecordOutsideSector(
                        record.address,
                        self.cidr,
                    ));
                }
            }
        }
        Ok(())
    }

    /// Static DNS records of the manifest, grouped by address.
    #[must_use]
    pub fn static_records(&self) -> BTreeMap<Ipv4Addr, BTreeSet<String>> {
        let mut records: BTreeMap<Ipv4Addr, BTreeSet<String>> = BTreeMap::new();
        for record in self.dns.iter().flat_map(|dns| dns.records.iter()) {
            records
                .entry(record.address)
                .or_default()
                .insert(record.name.clone());
        }
        records
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use super::{SectorManifest, SubnetManifest};
    use bolero::{Driver, TypeGenerator};
    use ipnet::Ipv4Net;
    use std::net::Ipv4Addr;
    use std::ops::Bound;

    /// Valid sector manifests: a private /16 to /24 prefix split into up to 4 equal subnets.
    impl TypeGenerator for SectorManifest {
        fn generate<D: Driver>(d: &mut D) -> Option<Self> {
            let prefix_len = d.gen_u8(Bound::Included(&16), Bound::Included(&24))?;
            let base = Ipv4Addr::new(10, d.produce::<u8>()?, d.produce::<u8>()?, 0);
            let cidr = Ipv4Net::new(base, prefix_len).ok()?.trunc();
            let split = d.gen_u8(Bound::Included(&0), Bound::Included(&2))?;
            let subnets = cidr
                .subnets(prefix_len + split)
                .ok()?
                .enumerate()
                .map(|(n, cidr)| SubnetManifest {
                    name: format!("net{n}"),
                    cidr,
                })
                .collect();
            let mut manifest = SectorManifest::new(&format!("s{}", d.produce::<u16>()?), cidr);
            manifest.subnets = subnets;
            Some(manifest)
        }
    }
}
