// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Backplane planning

use crate::desired::{BackplaneDesiredState, DesiredState};
use crate::errors::PlanError;
use crate::{Planner, pools};
use ipam::{AllocatedValue, IpamError, Owner, PoolKind, TagRange};
use model::constants::{
    BACKPLANE_ID, BACKPLANE_VNET_TAGS, BACKPLANE_ZONE_TAGS, CLUSTER_TAGS, ENCAP_OVERHEAD,
    EVPN_CONTROLLER_ID,
};
use model::{Backplane, Cluster, ClusterManifest, Node, ValidationError, addr, naming};
use platform::{EvpnController, Resource, Scope, Subnet, Vnet, Zone, ZoneKind};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use tracing::{debug, info};

impl Planner {
    /// Records the Backplane CIDR on first use; refuses any different CIDR afterwards.
    fn claim_backplane_cidr(&self, manifest: &ClusterManifest) -> Result<(), PlanError> {
        let pool = pools::backplane();
        let requested = manifest.backplane.cidr;
        match self.ipam.pool_kind(&pool)? {
            Some(PoolKind::Block(current)) if current == requested => Ok(()),
            Some(current) => Err(PlanError::ImmutableFieldViolation {
                entity: format!("cluster {}", manifest.name),
                field: "backplane cidr",
                current: current.to_string(),
                requested: requested.to_string(),
            }),
            None => {
                info!("Initializing backplane with {requested}");
                Ok(self.ipam.create_pool(&pool, PoolKind::Block(requested))?)
            }
        }
    }

    /// Keep the tags in use out of band reserved, and only those.
    fn reserve_tags(&self, reserved: &BTreeSet<u32>) -> Result<(), IpamError> {
        let pool = pools::tags();
        for allocation in self.ipam.allocations(&pool)? {
            if allocation.owner.as_str().starts_with(pools::RESERVED_PREFIX)
                && allocation.tag().is_none_or(|tag| !reserved.contains(&tag))
            {
                self.ipam.release(&pool, allocation.id)?;
            }
        }
        for tag in reserved {
            self.ipam
                .reserve(&pool, &pools::reserved_tag(*tag), AllocatedValue::Tag(*tag))?;
        }
        Ok(())
    }

    fn backplane_tag(&self, owner: &Owner, range: RangeInclusive<u32>) -> Result<u32, IpamError> {
        let pool = pools::tags();
        let allocation = self.ipam.allocate_tag(&pool, owner, range.into())?;
        allocation.tag().ok_or_else(|| IpamError::InvalidRequest {
            pool,
            reason: format!("{} is not a tag", allocation.value),
        })
    }

    /// Plan the Backplane of a cluster.
    pub fn plan_backplane(
        &self,
        manifest: &ClusterManifest,
    ) -> Result<BackplaneDesiredState, PlanError> {
        manifest.validate()?;
        let cidr = manifest.backplane.cidr;
        let Some(uplink_mtu) = manifest.nodes.iter().map(|n| n.uplink_mtu).min() else {
            return Err(ValidationError::NoNodes(manifest.name.clone()).into());
        };

        self.claim_backplane_cidr(manifest)?;
        let tags = pools::tags();
        self.ipam
            .create_pool(&tags, PoolKind::Tags(TagRange::from(CLUSTER_TAGS)))?;
        self.reserve_tags(&manifest.reserved_tags)?;

        let gateway = addr::gateway(&cidr);
        self.ipam.reserve(
            &pools::backplane(),
            &pools::backplane_gateway(),
            AllocatedValue::Address(gateway),
        )?;
        let zone_tag = self.backplane_tag(&pools::backplane_zone_tag(), BACKPLANE_ZONE_TAGS)?;
        let vnet_tag = self.backplane_tag(&pools::backplane_vnet_tag(), BACKPLANE_VNET_TAGS)?;

        let nodes: BTreeMap<String, Node> = manifest
            .nodes
            .iter()
            .map(|n| {
                let node = Node {
                    name: n.name.clone(),
                    management_address: n.management_address,
                    uplink_mtu: n.uplink_mtu,
                };
                (n.name.clone(), node)
            })
            .collect();
        let backplane = Backplane {
            cidr,
            gateway,
            asn: manifest.backplane.asn,
            zone_tag,
            vnet_tag,
            mtu: uplink_mtu.saturating_sub(ENCAP_OVERHEAD),
            exit_nodes: nodes.keys().cloned().collect(),
            peers: nodes.values().map(|n| n.management_address).collect(),
        };

        let mut resources = DesiredState::new(Scope::Backplane);
        resources.insert(Resource::Controller(EvpnController {
            id: EVPN_CONTROLLER_ID.to_owned(),
            asn: backplane.asn,
            peers: backplane.peers.clone(),
        }));
        resources.insert(Resource::Zone(Zone {
            id: BACKPLANE_ID.to_owned(),
            kind: ZoneKind::Evpn {
                controller: EVPN_CONTROLLER_ID.to_owned(),
                vrf_tag: backplane.zone_tag,
                exit_nodes: backplane.exit_nodes.clone(),
            },
            mtu: backplane.mtu,
        }));
        resources.insert(Resource::Vnet(Vnet {
            id: BACKPLANE_ID.to_owned(),
            zone: BACKPLANE_ID.to_owned(),
            tag: backplane.vnet_tag,
            alias: manifest.name.clone(),
        }));
        resources.insert(Resource::Subnet(Subnet {
            id: naming::subnet_id(BACKPLANE_ID, &cidr),
            vnet: BACKPLANE_ID.to_owned(),
            cidr,
            gateway,
            snat: true,
        }));
        debug!(
            "Backplane of {}: zone tag {zone_tag}, vnet tag {vnet_tag}, mtu {}, {} peers",
            manifest.name,
            backplane.mtu,
            backplane.peers.len()
        );

        Ok(BackplaneDesiredState {
            cluster: Cluster {
                name: manifest.name.clone(),
                nodes,
                backplane,
            },
            gateway_template: manifest.gateway_template.clone(),
            dns_template: manifest.dns_template.clone(),
            resources,
        })
    }
}
