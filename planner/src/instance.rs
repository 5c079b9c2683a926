// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Addresses of the instances attached to Sector subnets

use crate::errors::PlanError;
use crate::{Planner, pools};
use ipam::{AllocatedValue, IpamError, PoolKind};
use ipnet::Ipv4Net;
use model::constants::RESERVED_HOSTS;
use tracing::{debug, info};

impl Planner {
    /// The prefix Sector `sector` holds for its subnet `subnet`.
    fn subnet_cidr(&self, sector: &str, subnet: &str) -> Result<Ipv4Net, PlanError> {
        self.ipam
            .find(&pools::sector(sector), &pools::subnet(subnet))?
            .and_then(|a| a.cidr())
            .ok_or_else(|| PlanError::UnknownSubnet {
                sector: sector.to_owned(),
                subnet: subnet.to_owned(),
            })
    }

    /// Give instance `vmid` an address in subnet `subnet` of Sector `sector`, or the one it
    /// already holds there. Addresses come from above the hosts kept for Sector infrastructure.
    ///
    /// The Sector must have been planned with that subnet.
    pub fn assign_instance_address(
        &self,
        sector: &str,
        subnet: &str,
        vmid: u32,
    ) -> Result<Ipv4Net, PlanError> {
        let cidr = self.subnet_cidr(sector, subnet)?;
        let pool = pools::instances(sector, subnet);
        self.ipam.create_pool(&pool, PoolKind::Block(cidr))?;
        let allocation = self
            .ipam
            .allocate_host(&pool, &pools::instance(vmid), RESERVED_HOSTS)?;
        let address = allocation
            .address()
            .and_then(|address| Ipv4Net::new(address, cidr.prefix_len()).ok())
            .ok_or_else(|| IpamError::InvalidRequest {
                pool,
                reason: format!("{} is not an address", allocation.value),
            })?;
        info!("Sector {sector}: instance {vmid} has address {address} in subnet {subnet}");
        Ok(address)
    }

    /// Give back the address of instance `vmid` in subnet `subnet` of Sector `sector`.
    /// Releasing an address that is not assigned is a no-op.
    pub fn release_instance_address(
        &self,
        sector: &str,
        subnet: &str,
        vmid: u32,
    ) -> Result<(), PlanError> {
        let pool = pools::instances(sector, subnet);
        match self.ipam.release_owner(&pool, &pools::instance(vmid))? {
            Some(released) => info!(
                "Sector {sector}: released address {} of instance {vmid}",
                released.value
            ),
            None => debug!("Sector {sector}: instance {vmid} holds nothing in subnet {subnet}"),
        }
        Ok(())
    }

    /// The subnet and address instance `vmid` holds in Sector `sector`, if any.
    pub fn instance_address(
        &self,
        sector: &str,
        vmid: u32,
    ) -> Result<Option<(String, Ipv4Net)>, PlanError> {
        let owner = pools::instance(vmid);
        for allocation in self.ipam.allocations(&pools::sector(sector))? {
            let (Some(subnet), AllocatedValue::Cidr(cidr)) = (
                allocation.owner.as_str().strip_prefix(pools::SUBNET_PREFIX),
                allocation.value,
            ) else {
                continue;
            };
            let held = self
                .ipam
                .find(&pools::instances(sector, subnet), &owner)?
                .and_then(|a| a.address());
            if let Some(address) = held
                && let Ok(address) = Ipv4Net::new(address, cidr.prefix_len())
            {
                return Ok(Some((subnet.to_owned(), address)));
            }
        }
        Ok(None)
    }

    /// Forget every instance address of Sector `sector`.
    pub(crate) fn drop_instance_pools(&self, sector: &str) -> Result<(), IpamError> {
        let prefix = pools::instances_prefix(sector);
        for pool in self.ipam.pools()? {
            if pool.as_str().starts_with(&prefix) {
                self.ipam.drop_pool(&pool)?;
            }
        }
        Ok(())
    }
}
