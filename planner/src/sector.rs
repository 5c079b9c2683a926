// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Sector planning

use crate::desired::{BackplaneDesiredState, DesiredState, SectorDesiredState};
use crate::errors::PlanError;
use crate::{Planner, pools};
use gwconfig::{Render, render_dns_zone, render_nat, render_routes};
use ipam::{AllocatedValue, Allocation, IpamError, PoolKind};
use model::constants::{BACKPLANE_ID, BACKPLANE_IFACE, SECTOR_IFACE, SECTOR_TAGS};
use model::{DnsZone, Gateway, Sector, SectorManifest, Subnet, addr, naming};
use platform::{Appliance, GatewayConfig, Nic, Resource, Scope, Vnet, Zone, ZoneKind};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// What a Sector holds in the pools it shares with others.
struct Claims {
    tag: u32,
    backplane_address: std::net::Ipv4Addr,
}

impl Planner {
    /// Refuse a Sector prefix different from the one its pool was created with.
    fn check_sector_cidr(&self, manifest: &SectorManifest) -> Result<bool, PlanError> {
        match self.ipam.pool_kind(&pools::sector(&manifest.name))? {
            Some(PoolKind::Block(current)) if current == manifest.cidr => Ok(true),
            Some(current) => Err(PlanError::ImmutableFieldViolation {
                entity: format!("sector {}", manifest.name),
                field: "cidr",
                current: current.to_string(),
                requested: manifest.cidr.to_string(),
            }),
            None => Ok(false),
        }
    }

    fn claim(&self, manifest: &SectorManifest) -> Result<Claims, IpamError> {
        let name = &manifest.name;
        let tags = pools::tags();
        let tag = self
            .ipam
            .allocate_tag(&tags, &pools::sector_tag(name), SECTOR_TAGS.into())?;
        let backplane = pools::backplane();
        let address = self
            .ipam
            .allocate_address(&backplane, &pools::sector_gateway(name))?;
        match (tag.tag(), address.address()) {
            (Some(tag), Some(backplane_address)) => Ok(Claims {
                tag,
                backplane_address,
            }),
            (None, _) => Err(IpamError::InvalidRequest {
                pool: tags,
                reason: format!("{} is not a tag", tag.value),
            }),
            (_, None) => Err(IpamError::InvalidRequest {
                pool: backplane,
                reason: format!("{} is not an address", address.value),
            }),
        }
    }

    /// Reserve the subnets of the manifest in the Sector pool, dropping the ones it no longer
    /// lists.
    ///
    /// Every subnet that is gone or changed prefix is released before anything is reserved, so
    /// subnets may trade prefixes within a single plan.
    fn claim_subnets(&self, manifest: &SectorManifest) -> Result<Vec<Subnet>, IpamError> {
        let pool = pools::sector(&manifest.name);
        self.ipam.create_pool(&pool, PoolKind::Block(manifest.cidr))?;
        let wanted = manifest.effective_subnets();
        let held: BTreeSet<_> = wanted
            .iter()
            .map(|s| (pools::subnet(&s.name), AllocatedValue::Cidr(s.cidr)))
            .collect();
        for allocation in self.ipam.allocations(&pool)? {
            if allocation.owner.as_str().starts_with(pools::SUBNET_PREFIX)
                && !held.contains(&(allocation.owner.clone(), allocation.value))
            {
                info!(
                    "Sector {}: dropping subnet {} of '{}'",
                    manifest.name, allocation.value, allocation.owner
                );
                self.ipam.release(&pool, allocation.id)?;
                let subnet = allocation.owner.as_str().trim_start_matches(pools::SUBNET_PREFIX);
                self.ipam.drop_pool(&pools::instances(&manifest.name, subnet))?;
            }
        }
        wanted
            .iter()
            .map(|s| {
                self.ipam
                    .reserve(&pool, &pools::subnet(&s.name), AllocatedValue::Cidr(s.cidr))?;
                Ok(Subnet {
                    name: s.name.clone(),
                    cidr: s.cidr,
                    gateway: addr::gateway(&s.cidr),
                })
            })
            .collect()
    }

    /// Plan a Sector on top of a planned Backplane.
    ///
    /// If planning a Sector seen for the first time fails half-way, what was allocated for it
    /// is released again.
    pub fn plan_sector(
        &self,
        manifest: &SectorManifest,
        backplane: &BackplaneDesiredState,
    ) -> Result<SectorDesiredState, PlanError> {
        manifest.validate()?;
        let known = self.check_sector_cidr(manifest)?;
        let known = known
            || self
                .ipam
                .find(&pools::tags(), &pools::sector_tag(&manifest.name))?
                .is_some();

        let claimed = self
            .claim(manifest)
            .and_then(|claims| Ok((claims, self.claim_subnets(manifest)?)));
        let (claims, subnets) = match claimed {
            Ok(claimed) => claimed,
            Err(e) => {
                if !known {
                    warn!(
                        "Planning of new sector {} failed, releasing its allocations",
                        manifest.name
                    );
                    self.release_sector(&manifest.name)?;
                }
                return Err(e.into());
            }
        };

        let sector = Self::resolve(manifest, backplane, &claims, subnets);
        let resources = Self::sector_resources(&sector, backplane);
        debug!(
            "Planned sector {} as {} with {} objects",
            sector.name,
            sector.platform_id(),
            resources.len()
        );
        Ok(SectorDesiredState { sector, resources })
    }

    fn resolve(
        manifest: &SectorManifest,
        backplane: &BackplaneDesiredState,
        claims: &Claims,
        subnets: Vec<Subnet>,
    ) -> Sector {
        let bp = &backplane.cluster.backplane;
        let gateway = Gateway::new(
            claims.tag,
            addr::gateway(&manifest.cidr),
            &subnets,
            addr::on_link(claims.backplane_address, &bp.cidr),
            bp.gateway,
            backplane.gateway_template.clone(),
        );
        let dns = manifest.dns.as_ref().map(|_| {
            let address = addr::dns(&manifest.cidr);
            let on = subnets
                .iter()
                .find(|s| s.cidr.contains(&address))
                .map_or(manifest.cidr, |s| s.cidr);
            DnsZone {
                hostname: naming::dns_hostname(claims.tag),
                address: addr::on_link(address, &on),
                template: backplane.dns_template.clone(),
                static_records: manifest.static_records(),
            }
        });
        Sector {
            name: manifest.name.clone(),
            generation: manifest.generation,
            tag: claims.tag,
            cidr: manifest.cidr,
            mtu: bp.mtu,
            subnets,
            gateway,
            dns,
        }
    }

    fn sector_resources(sector: &Sector, backplane: &BackplaneDesiredState) -> DesiredState {
        let id = sector.platform_id();
        let gw = &sector.gateway;
        let mut resources = DesiredState::new(Scope::Sector(sector.tag));
        resources.insert(Resource::Zone(Zone {
            id: id.clone(),
            kind: ZoneKind::Vxlan {
                peers: backplane.cluster.backplane.peers.clone(),
            },
            mtu: sector.mtu,
        }));
        resources.insert(Resource::Vnet(Vnet {
            id: id.clone(),
            zone: id.clone(),
            tag: sector.tag,
            alias: sector.name.clone(),
        }));
        for subnet in &sector.subnets {
            resources.insert(Resource::Subnet(platform::Subnet {
                id: naming::subnet_id(&id, &subnet.cidr),
                vnet: id.clone(),
                cidr: subnet.cidr,
                gateway: subnet.gateway,
                snat: false,
            }));
        }
        resources.insert(Resource::Gateway(Appliance {
            hostname: gw.hostname.clone(),
            template: gw.template.clone(),
            nics: vec![
                Nic {
                    name: SECTOR_IFACE.to_owned(),
                    bridge: id.clone(),
                    addresses: gw.sector_addresses.clone(),
                    gateway: None,
                },
                Nic {
                    name: BACKPLANE_IFACE.to_owned(),
                    bridge: BACKPLANE_ID.to_owned(),
                    addresses: vec![gw.backplane_address],
                    gateway: Some(gw.backplane_gateway),
                },
            ],
        }));
        resources.insert(Resource::GatewayConfig(GatewayConfig {
            gateway: gw.hostname.clone(),
            routes: render_routes(gw).render(&()).to_string(),
            nat: render_nat(gw).render(&()).to_string(),
        }));
        if let Some(dns) = &sector.dns {
            resources.insert(Resource::Dns(platform::DnsZone {
                appliance: Appliance {
                    hostname: dns.hostname.clone(),
                    template: dns.template.clone(),
                    nics: vec![Nic {
                        name: SECTOR_IFACE.to_owned(),
                        bridge: id.clone(),
                        addresses: vec![dns.address],
                        gateway: Some(gw.address),
                    }],
                },
                records: render_dns_zone(sector).to_string(),
            }));
        }
        resources
    }

    /// The tag of Sector `name`, if it holds one.
    pub fn sector_tag(&self, name: &str) -> Result<Option<u32>, PlanError> {
        Ok(self
            .ipam
            .find(&pools::tags(), &pools::sector_tag(name))?
            .as_ref()
            .and_then(Allocation::tag))
    }

    /// Tags held by Sectors.
    pub fn sector_tags(&self) -> Result<Vec<u32>, PlanError> {
        let allocations = match self.ipam.allocations(&pools::tags()) {
            Ok(allocations) => allocations,
            Err(IpamError::NoSuchPool(_)) => vec![],
            Err(e) => return Err(e.into()),
        };
        Ok(allocations
            .iter()
            .filter(|a| a.owner.as_str().starts_with(pools::SECTOR_PREFIX))
            .filter_map(Allocation::tag)
            .collect())
    }

    /// Give back everything Sector `name` holds: its tag, its gateway Backplane address, its
    /// private pool and the addresses of its instances. Releasing a Sector that holds nothing is a no-op.
    ///
    /// Only to be called once nothing on the platform refers to these values anymore.
    pub fn release_sector(&self, name: &str) -> Result<(), PlanError> {
        self.ipam
            .release_owner(&pools::tags(), &pools::sector_tag(name))?;
        self.ipam
            .release_owner(&pools::backplane(), &pools::sector_gateway(name))?;
        self.drop_instance_pools(name)?;
        self.ipam.drop_pool(&pools::sector(name))?;
        info!("Released allocations of sector {name}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backplane::tests::{cluster, planner};
    use model::{DnsManifest, StaticRecord, SubnetManifest};
    use platform::ResourceKey;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;
    use tracing_test::traced_test;

    fn web() -> SectorManifest {
        SectorManifest::new("web", "172.16.0.0/16".parse().unwrap())
    }

    #[test]
    #[traced_test]
    fn sector_plan() {
        let planner = planner();
        let bp = planner.plan_backplane(&cluster()).unwrap();
        let plan = planner.plan_sector(&web(), &bp).unwrap();
        let sector = &plan.sector;
        assert_eq!(sector.tag, 1001);
        assert_eq!(sector.platform_id(), "sec1001");
        assert_eq!(sector.gateway.address, Ipv4Addr::new(172, 16, 0, 1));
        assert_eq!(sector.gateway.backplane_address.to_string(), "10.200.0.2/16");
        assert_eq!(sector.mtu, 1450);
        assert_eq!(plan.scope(), Scope::Sector(1001));
        let keys: Vec<String> = plan.resources.keys().map(ToString::to_string).collect();
        assert_eq!(
            keys,
            vec![
                "zone/sec1001",
                "vnet/sec1001",
                "subnet/sec1001-172.16.0.0-16",
                "gateway/sec1001-gw",
                "gateway-config/sec1001-gw",
            ]
        );
        let config = plan
            .resources
            .get(&ResourceKey::GatewayConfig("sec1001-gw".to_owned()));
        assert!(matches!(
            config,
            Some(Resource::GatewayConfig(c)) if c.routes.contains("ip route 0.0.0.0/0 10.200.0.1")
                && c.nat.contains("dnat to 172.16.0.1")
        ));
    }

    #[test]
    fn sector_planning_is_deterministic() {
        let planner = planner();
        let bp = planner.plan_backplane(&cluster()).unwrap();
        let first = planner.plan_sector(&web(), &bp).unwrap();
        planner
            .plan_sector(&SectorManifest::new("db", "10.0.0.0/24".parse().unwrap()), &bp)
            .unwrap();
        let again = planner.plan_sector(&web(), &bp).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn overlapping_sectors_get_distinct_tags_and_addresses() {
        let planner = planner();
        let bp = planner.plan_backplane(&cluster()).unwrap();
        let a = planner.plan_sector(&web(), &bp).unwrap().sector;
        let mut other = web();
        other.name = "web2".to_owned();
        let b = planner.plan_sector(&other, &bp).unwrap().sector;
        assert_eq!(a.cidr, b.cidr);
        assert_eq!(a.gateway.address, b.gateway.address);
        assert_ne!(a.tag, b.tag);
        assert_ne!(a.gateway.backplane_address, b.gateway.backplane_address);
    }

    #[test]
    fn sector_cidr_is_immutable() {
        let planner = planner();
        let bp = planner.plan_backplane(&cluster()).unwrap();
        planner.plan_sector(&web(), &bp).unwrap();
        let mut moved = web();
        moved.cidr = "172.17.0.0/16".parse().unwrap();
        assert!(matches!(
            planner.plan_sector(&moved, &bp),
            Err(PlanError::ImmutableFieldViolation { .. })
        ));
    }

    #[test]
    fn subnets_follow_the_manifest() {
        let planner = planner();
        let bp = planner.plan_backplane(&cluster()).unwrap();
        let mut manifest = web();
        manifest.subnets = vec![SubnetManifest {
            name: "front".to_owned(),
            cidr: "172.16.0.0/24".parse().unwrap(),
        }];
        let plan = planner.plan_sector(&manifest, &bp).unwrap();
        assert_eq!(plan.sector.subnets.len(), 1);

        manifest.subnets.push(SubnetManifest {
            name: "back".to_owned(),
            cidr: "172.16.1.0/24".parse().unwrap(),
        });
        let plan = planner.plan_sector(&manifest, &bp).unwrap();
        assert_eq!(plan.sector.gateway.sector_addresses.len(), 2);
        assert!(plan.resources.contains(&ResourceKey::Subnet(
            "sec1001-172.16.1.0-24".to_owned()
        )));

        // a renamed subnet takes over the prefix of the one it replaces
        manifest.subnets.remove(1);
        manifest.subnets[0].name = "main".to_owned();
        let plan = planner.plan_sector(&manifest, &bp).unwrap();
        assert_eq!(plan.sector.subnets[0].name, "main");
        let held = planner.ipam().allocations(&pools::sector("web")).unwrap();
        assert_eq!(held.len(), 1);
    }

    #[test]
    fn subnets_can_trade_prefixes() {
        let planner = planner();
        let bp = planner.plan_backplane(&cluster()).unwrap();
        let subnet = |name: &str, cidr: &str| SubnetManifest {
            name: name.to_owned(),
            cidr: cidr.parse().unwrap(),
        };
        let mut manifest = web();
        manifest.subnets = vec![
            subnet("front", "172.16.0.0/24"),
            subnet("back", "172.16.1.0/24"),
        ];
        planner.plan_sector(&manifest, &bp).unwrap();

        manifest.subnets = vec![
            subnet("front", "172.16.1.0/24"),
            subnet("back", "172.16.0.0/24"),
        ];
        let plan = planner.plan_sector(&manifest, &bp).unwrap();
        let cidrs: Vec<(String, String)> = plan
            .sector
            .subnets
            .iter()
            .map(|s| (s.name.clone(), s.cidr.to_string()))
            .collect();
        assert!(cidrs.contains(&("front".to_owned(), "172.16.1.0/24".to_owned())));
        assert!(cidrs.contains(&("back".to_owned(), "172.16.0.0/24".to_owned())));
        let held = planner.ipam().allocations(&pools::sector("web")).unwrap();
        assert_eq!(held.len(), 2);
        assert!(held.iter().any(|a| a.owner == pools::subnet("front")
            && a.value == AllocatedValue::Cidr("172.16.1.0/24".parse().unwrap())));
    }

    #[test]
    fn dns_zone() {
        let planner = planner();
        let bp = planner.plan_backplane(&cluster()).unwrap();
        let mut manifest = web();
        manifest.dns = Some(DnsManifest {
            records: vec![StaticRecord {
                name: "db".to_owned(),
                address: "172.16.0.10".parse().unwrap(),
            }],
        });
        let plan = planner.plan_sector(&manifest, &bp).unwrap();
        let dns = plan.sector.dns.as_ref().unwrap();
        assert_eq!(dns.hostname, "sec1001-dns");
        assert_eq!(dns.address.to_string(), "172.16.0.2/16");
        let Some(Resource::Dns(zone)) = plan
            .resources
            .get(&ResourceKey::Dns("sec1001-dns".to_owned()))
        else {
            unreachable!("no dns zone planned");
        };
        assert!(zone.records.contains("172.16.0.10\tdb"));
        assert!(zone.records.contains("172.16.0.1\tsec1001-gw"));
    }

    #[test]
    fn failed_first_plan_keeps_nothing() {
        let planner = planner();
        let mut manifest = cluster();
        manifest.backplane.cidr = "10.200.0.0/30".parse().unwrap();
        let bp = planner.plan_backplane(&manifest).unwrap();
        // a /30 has room for the backplane gateway and a single gateway address
        planner.plan_sector(&web(), &bp).unwrap();
        let mut other = web();
        other.name = "web2".to_owned();
        let err = planner.plan_sector(&other, &bp).unwrap_err();
        assert!(matches!(err, PlanError::Ipam(IpamError::PoolExhausted { .. })));
        assert_eq!(planner.sector_tag("web2").unwrap(), None);
        assert_eq!(planner.sector_tag("web").unwrap(), Some(1001));
    }

    #[test]
    fn release_is_idempotent() {
        let planner = planner();
        let bp = planner.plan_backplane(&cluster()).unwrap();
        planner.plan_sector(&web(), &bp).unwrap();
        planner.release_sector("web").unwrap();
        planner.release_sector("web").unwrap();
        assert_eq!(planner.sector_tag("web").unwrap(), None);
        // the tag is free again
        let mut other = web();
        other.name = "web2".to_owned();
        assert_eq!(planner.plan_sector(&other, &bp).unwrap().sector.tag, 1001);
    }

    #[test]
    fn planning_is_reproducible() {
        bolero::check!()
            .with_type()
            .for_each(|manifest: &SectorManifest| {
                let plans: Vec<SectorDesiredState> = (0..2)
                    .map(|_| {
                        let planner = planner();
                        let bp = planner.plan_backplane(&cluster()).unwrap();
                        let first = planner.plan_sector(manifest, &bp).unwrap();
                        assert_eq!(planner.plan_sector(manifest, &bp).unwrap(), first);
                        first
                    })
                    .collect();
                assert_eq!(plans[0], plans[1]);
                let sector = &plans[0].sector;
                assert_eq!(sector.gateway.address, addr::gateway(&manifest.cidr));
                assert_eq!(sector.subnets.len(), manifest.effective_subnets().len());
            });
    }
}
