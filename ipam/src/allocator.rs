// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The allocator proper

use crate::errors::IpamError;
use crate::pool::{
    AllocatedValue, Allocation, CidrRequest, Owner, PoolId, PoolKind, PoolRecord, TagRange,
};
use crate::store::AllocationStore;
use chrono::Utc;
use id::Id;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Allocator over a set of independent pools.
///
/// Operations on one pool are serialized; operations on distinct pools run without any
/// coordination. Pool records are always read back from the store under the pool lock, so an
/// [`Ipam`] holds no state of its own besides the locks.
pub struct Ipam {
    store: Arc<dyn AllocationStore>,
    locks: Mutex<BTreeMap<PoolId, Arc<Mutex<()>>>>,
}

impl Ipam {
    #[must_use]
    pub fn new(store: Arc<dyn AllocationStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self, pool: &PoolId) -> Arc<Mutex<()>> {
        self.locks.lock().entry(pool.clone()).or_default().clone()
    }

    fn load(&self, pool: &PoolId) -> Result<PoolRecord, IpamError> {
        self.store
            .load(pool)?
            .ok_or_else(|| IpamError::NoSuchPool(pool.clone()))
    }

    /// Run `f` on the record of `pool` with the pool locked. If `f` succeeds and returns
    /// `Some(record)`, that record is stored before the result is handed back.
    fn with_pool<T>(
        &self,
        pool: &PoolId,
        f: impl FnOnce(&PoolRecord) -> Result<(T, Option<PoolRecord>), IpamError>,
    ) -> Result<T, IpamError> {
        let lock = self.lock(pool);
        let _guard = lock.lock();
        let record = self.load(pool)?;
        let (result, updated) = f(&record)?;
        if let Some(updated) = updated {
            self.store.store(&updated)?;
        }
        Ok(result)
    }

    /// Create a pool. Creating a pool that exists with the same kind is a no-op.
    pub fn create_pool(&self, pool: &PoolId, kind: PoolKind) -> Result<(), IpamError> {
        let lock = self.lock(pool);
        let _guard = lock.lock();
        match self.store.load(pool)? {
            Some(existing) if existing.kind == kind => Ok(()),
            Some(existing) => Err(IpamError::PoolKindMismatch {
                pool: pool.clone(),
                existing: existing.kind,
                requested: kind.to_string(),
            }),
            None => {
                self.store.store(&PoolRecord::new(pool.clone(), kind))?;
                info!("Created pool {pool} ({kind})");
                Ok(())
            }
        }
    }

    /// The kind of `pool`, if it exists.
    pub fn pool_kind(&self, pool: &PoolId) -> Result<Option<PoolKind>, IpamError> {
        Ok(self.store.load(pool)?.map(|r| r.kind))
    }

    /// Live allocations of `pool`, ordered by value.
    pub fn allocations(&self, pool: &PoolId) -> Result<Vec<Allocation>, IpamError> {
        Ok(self.load(pool)?.allocations)
    }

    /// The allocation of `owner` in `pool`, if any.
    pub fn find(&self, pool: &PoolId, owner: &Owner) -> Result<Option<Allocation>, IpamError> {
        match self.store.load(pool)? {
            Some(record) => Ok(record.by_owner(owner).cloned()),
            None => Ok(None),
        }
    }

    /// Every known pool.
    pub fn pools(&self) -> Result<Vec<PoolId>, IpamError> {
        Ok(self.store.list()?)
    }

    fn grant(record: &PoolRecord, owner: &Owner, value: AllocatedValue) -> (Allocation, PoolRecord) {
        let allocation = Allocation {
            id: Allocation::id_for(&record.id, owner),
            owner: owner.clone(),
            value,
            allocated_at: Utc::now(),
        };
        let mut updated = record.clone();
        updated.upsert(allocation.clone());
        debug!("Pool {}: {value} -> '{owner}'", record.id);
        (allocation, updated)
    }

    fn check_exact(
        record: &PoolRecord,
        owner: &Owner,
        value: AllocatedValue,
    ) -> Result<(), IpamError> {
        if !record.fits(&value) {
            return Err(IpamError::InvalidRequest {
                pool: record.id.clone(),
                reason: format!("{value} is not within {}", record.kind),
            });
        }
        if let Some(existing) = record.conflict(&value, Some(owner)) {
            return Err(IpamError::AllocationConflict {
                pool: record.id.clone(),
                requested: value,
                existing: existing.value,
                owner: existing.owner.clone(),
            });
        }
        Ok(())
    }

    /// Reserve exactly `value` for `owner`.
    ///
    /// If `owner` already holds `value` this returns the existing allocation; if it holds
    /// something else, that is replaced, provided `value` collides with nobody else's allocation.
    pub fn reserve(
        &self,
        pool: &PoolId,
        owner: &Owner,
        value: AllocatedValue,
    ) -> Result<Allocation, IpamError> {
        self.with_pool(pool, |record| {
            if let Some(existing) = record.by_owner(owner)
                && existing.value == value
            {
                return Ok((existing.clone(), None));
            }
            Self::check_exact(record, owner, value)?;
            let (allocation, updated) = Self::grant(record, owner, value);
            Ok((allocation, Some(updated)))
        })
    }

    /// Allocate a prefix in a block pool.
    pub fn allocate_cidr(
        &self,
        pool: &PoolId,
        owner: &Owner,
        request: CidrRequest,
    ) -> Result<Allocation, IpamError> {
        match request {
            CidrRequest::Exact(cidr) => self.reserve(pool, owner, AllocatedValue::Cidr(cidr)),
            CidrRequest::Size(prefix_len) => self.with_pool(pool, |record| {
                Self::expect_block(record)?;
                if let Some(existing) = record.by_owner(owner)
                    && existing.cidr().is_some_and(|c| c.prefix_len() == prefix_len)
                {
                    return Ok((existing.clone(), None));
                }
                // the owner's current prefix, if any, does not block its replacement
                let mut scratch = record.clone();
                scratch.allocations.retain(|a| &a.owner != owner);
                let cidr = scratch
                    .first_fit(prefix_len)
                    .ok_or_else(|| IpamError::PoolExhausted {
                        pool: pool.clone(),
                        what: format!("/{prefix_len} prefix"),
                    })?;
                let (allocation, updated) = Self::grant(record, owner, AllocatedValue::Cidr(cidr));
                Ok((allocation, Some(updated)))
            }),
        }
    }

    /// Allocate the lowest free host address of a block pool.
    pub fn allocate_address(&self, pool: &PoolId, owner: &Owner) -> Result<Allocation, IpamError> {
        self.allocate_host(pool, owner, 0)
    }

    /// Allocate the lowest free host address of a block pool past its first `skip` hosts.
    pub fn allocate_host(
        &self,
        pool: &PoolId,
        owner: &Owner,
        skip: u32,
    ) -> Result<Allocation, IpamError> {
        self.with_pool(pool, |record| {
            Self::expect_block(record)?;
            if let Some(existing) = record.by_owner(owner)
                && existing.address().is_some()
            {
                return Ok((existing.clone(), None));
            }
            let mut scratch = record.clone();
            scratch.allocations.retain(|a| &a.owner != owner);
            let addr = scratch
                .lowest_free_host(skip)
                .ok_or_else(|| IpamError::PoolExhausted {
                    pool: pool.clone(),
                    what: "address".to_owned(),
                })?;
            let (allocation, updated) = Self::grant(record, owner, AllocatedValue::Address(addr));
            Ok((allocation, Some(updated)))
        })
    }

    /// Allocate the lowest free tag of `range` in a tag pool.
    pub fn allocate_tag(
        &self,
        pool: &PoolId,
        owner: &Owner,
        range: TagRange,
    ) -> Result<Allocation, IpamError> {
        self.with_pool(pool, |record| {
            let PoolKind::Tags(pool_range) = record.kind else {
                return Err(IpamError::PoolKindMismatch {
                    pool: pool.clone(),
                    existing: record.kind,
                    requested: "tag".to_owned(),
                });
            };
            if range.is_empty() || !pool_range.covers(&range) {
                return Err(IpamError::InvalidRequest {
                    pool: pool.clone(),
                    reason: format!("tag range {range} is not within {pool_range}"),
                });
            }
            if let Some(existing) = record.by_owner(owner)
                && existing.tag().is_some_and(|t| range.contains(t))
            {
                return Ok((existing.clone(), None));
            }
            let mut scratch = record.clone();
            scratch.allocations.retain(|a| &a.owner != owner);
            let tag = scratch
                .lowest_free(range.first, range.last)
                .ok_or_else(|| IpamError::PoolExhausted {
                    pool: pool.clone(),
                    what: format!("tag in {range}"),
                })?;
            let (allocation, updated) = Self::grant(record, owner, AllocatedValue::Tag(tag));
            Ok((allocation, Some(updated)))
        })
    }

    fn expect_block(record: &PoolRecord) -> Result<(), IpamError> {
        match record.kind {
            PoolKind::Block(_) => Ok(()),
            PoolKind::Tags(_) => Err(IpamError::PoolKindMismatch {
                pool: record.id.clone(),
                existing: record.kind,
                requested: "block".to_owned(),
            }),
        }
    }

    /// Release an allocation. Releasing something that is not allocated, or releasing from a
    /// pool that no longer exists, is a no-op.
    pub fn release(
        &self,
        pool: &PoolId,
        id: Id<Allocation>,
    ) -> Result<Option<Allocation>, IpamError> {
        match self.with_pool(pool, |record| {
            let mut updated = record.clone();
            match updated.remove(id) {
                Some(released) => Ok((Some(released), Some(updated))),
                None => Ok((None, None)),
            }
        }) {
            Ok(Some(released)) => {
                debug!("Pool {pool}: released {} of '{}'", released.value, released.owner);
                Ok(Some(released))
            }
            Ok(None) | Err(IpamError::NoSuchPool(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Release whatever `owner` holds in `pool`.
    pub fn release_owner(
        &self,
        pool: &PoolId,
        owner: &Owner,
    ) -> Result<Option<Allocation>, IpamError> {
        self.release(pool, Allocation::id_for(pool, owner))
    }

    /// Delete a pool together with all of its allocations. Deleting a missing pool is a no-op.
    pub fn drop_pool(&self, pool: &PoolId) -> Result<(), IpamError> {
        let lock = self.lock(pool);
        let _guard = lock.lock();
        self.store.remove(pool)?;
        info!("Dropped pool {pool}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, MemoryStore};
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;
    use tracing_test::traced_test;

    fn ipam() -> Ipam {
        Ipam::new(Arc::new(MemoryStore::new()))
    }

    fn tags() -> (Ipam, PoolId) {
        let ipam = ipam();
        let pool = PoolId::new("tags");
        ipam.create_pool(&pool, PoolKind::Tags((1..=9999).into()))
            .unwrap();
        (ipam, pool)
    }

    fn block(cidr: &str) -> (Ipam, PoolId) {
        let ipam = ipam();
        let pool = PoolId::new("block");
        ipam.create_pool(&pool, PoolKind::Block(cidr.parse().unwrap()))
            .unwrap();
        (ipam, pool)
    }

    #[test]
    #[traced_test]
    fn tag_is_lowest_free() {
        let (ipam, pool) = tags();
        let range = TagRange::from(1001..=9999);
        for n in 0..4 {
            ipam.allocate_tag(&pool, &Owner::new(format!("s{n}")), range)
                .unwrap();
        }
        // 1001..=1004 allocated; free 1003
        ipam.release_owner(&pool, &Owner::new("s2")).unwrap();
        let a = ipam.allocate_tag(&pool, &Owner::new("new"), range).unwrap();
        assert_eq!(a.tag(), Some(1003));
        let b = ipam.allocate_tag(&pool, &Owner::new("newer"), range).unwrap();
        assert_eq!(b.tag(), Some(1005));
    }

    #[test]
    fn tag_allocation_is_owner_idempotent() {
        let (ipam, pool) = tags();
        let range = TagRange::from(1001..=9999);
        let owner = Owner::new("sector/web/tag");
        let a = ipam.allocate_tag(&pool, &owner, range).unwrap();
        let b = ipam.allocate_tag(&pool, &owner, range).unwrap();
        assert_eq!(a, b);
        assert_eq!(ipam.allocations(&pool).unwrap().len(), 1);
    }

    #[test]
    fn tags_skip_reserved() {
        let (ipam, pool) = tags();
        ipam.reserve(&pool, &Owner::new("reserved/1001"), AllocatedValue::Tag(1001))
            .unwrap();
        let a = ipam
            .allocate_tag(&pool, &Owner::new("web"), (1001..=9999).into())
            .unwrap();
        assert_eq!(a.tag(), Some(1002));
    }

    #[test]
    fn tag_exhaustion_and_bad_ranges() {
        let (ipam, pool) = tags();
        let range = TagRange::from(10..=11);
        ipam.allocate_tag(&pool, &Owner::new("a"), range).unwrap();
        ipam.allocate_tag(&pool, &Owner::new("b"), range).unwrap();
        assert!(matches!(
            ipam.allocate_tag(&pool, &Owner::new("c"), range),
            Err(IpamError::PoolExhausted { .. })
        ));
        assert!(matches!(
            ipam.allocate_tag(&pool, &Owner::new("c"), (0..=20_000).into()),
            Err(IpamError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn exact_cidr_conflicts() {
        let (ipam, pool) = block("172.16.0.0/16");
        ipam.allocate_cidr(
            &pool,
            &Owner::new("subnet/a"),
            CidrRequest::Exact("172.16.0.0/24".parse().unwrap()),
        )
        .unwrap();
        let err = ipam
            .allocate_cidr(
                &pool,
                &Owner::new("subnet/b"),
                CidrRequest::Exact("172.16.0.128/25".parse().unwrap()),
            )
            .unwrap_err();
        assert!(matches!(err, IpamError::AllocationConflict { .. }));
        assert_eq!(err.pool(), Some(&pool));
    }

    #[test]
    fn exact_cidr_replaces_own_allocation() {
        let (ipam, pool) = block("172.16.0.0/16");
        let owner = Owner::new("subnet/a");
        let first = ipam
            .allocate_cidr(&pool, &owner, CidrRequest::Exact("172.16.0.0/24".parse().unwrap()))
            .unwrap();
        let second = ipam
            .allocate_cidr(&pool, &owner, CidrRequest::Exact("172.16.0.0/23".parse().unwrap()))
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(ipam.allocations(&pool).unwrap(), vec![second]);
    }

    #[test]
    fn pools_are_independent() {
        let ipam = ipam();
        let a = PoolId::new("sector/a");
        let b = PoolId::new("sector/b");
        let cidr = "172.16.0.0/16".parse().unwrap();
        ipam.create_pool(&a, PoolKind::Block(cidr)).unwrap();
        ipam.create_pool(&b, PoolKind::Block(cidr)).unwrap();
        let owner = Owner::new("subnet/default");
        ipam.allocate_cidr(&a, &owner, CidrRequest::Exact(cidr)).unwrap();
        ipam.allocate_cidr(&b, &owner, CidrRequest::Exact(cidr)).unwrap();
    }

    #[test]
    fn addresses_and_sizes() {
        let (ipam, pool) = block("10.200.0.0/16");
        ipam.reserve(
            &pool,
            &Owner::new("backplane/gateway"),
            AllocatedValue::Address(Ipv4Addr::new(10, 200, 0, 1)),
        )
        .unwrap();
        let gw = ipam
            .allocate_address(&pool, &Owner::new("sector/a/gateway"))
            .unwrap();
        assert_eq!(gw.address(), Some(Ipv4Addr::new(10, 200, 0, 2)));
        let net = ipam
            .allocate_cidr(&pool, &Owner::new("lab"), CidrRequest::Size(24))
            .unwrap();
        assert_eq!(net.cidr(), "10.200.1.0/24".parse().ok());
        assert!(matches!(
            ipam.allocate_tag(&pool, &Owner::new("x"), (1..=2).into()),
            Err(IpamError::PoolKindMismatch { .. })
        ));
    }

    #[test]
    fn hosts_past_the_reserved_ones() {
        let (ipam, pool) = block("172.16.0.0/28");
        let first = ipam.allocate_host(&pool, &Owner::new("instance/101"), 10).unwrap();
        assert_eq!(first.address(), Some(Ipv4Addr::new(172, 16, 0, 11)));
        // the owner keeps its address
        let again = ipam.allocate_host(&pool, &Owner::new("instance/101"), 10).unwrap();
        assert_eq!(again, first);
        for (n, host) in [(102, 12), (103, 13), (104, 14)] {
            let a = ipam
                .allocate_host(&pool, &Owner::new(format!("instance/{n}")), 10)
                .unwrap();
            assert_eq!(a.address(), Some(Ipv4Addr::new(172, 16, 0, host)));
        }
        assert!(matches!(
            ipam.allocate_host(&pool, &Owner::new("instance/105"), 10),
            Err(IpamError::PoolExhausted { .. })
        ));
        // the low hosts are still there for whoever asks without skipping
        let low = ipam.allocate_address(&pool, &Owner::new("dns")).unwrap();
        assert_eq!(low.address(), Some(Ipv4Addr::new(172, 16, 0, 1)));
    }

    #[test]
    fn release_is_idempotent() {
        let (ipam, pool) = tags();
        let owner = Owner::new("a");
        let a = ipam.allocate_tag(&pool, &owner, (5..=9).into()).unwrap();
        assert_eq!(ipam.release(&pool, a.id).unwrap(), Some(a.clone()));
        assert_eq!(ipam.release(&pool, a.id).unwrap(), None);
        ipam.drop_pool(&pool).unwrap();
        assert_eq!(ipam.release(&pool, a.id).unwrap(), None);
        assert!(matches!(
            ipam.allocate_tag(&pool, &owner, (5..=9).into()),
            Err(IpamError::NoSuchPool(_))
        ));
    }

    #[test]
    fn create_pool_rejects_redefinition() {
        let (ipam, pool) = block("10.200.0.0/16");
        ipam.create_pool(&pool, PoolKind::Block("10.200.0.0/16".parse().unwrap()))
            .unwrap();
        assert!(matches!(
            ipam.create_pool(&pool, PoolKind::Block("10.201.0.0/16".parse().unwrap())),
            Err(IpamError::PoolKindMismatch { .. })
        ));
    }

    #[test]
    fn allocations_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let pool = PoolId::new("tags");
        let owner = Owner::new("sector/web/tag");
        let first = {
            let ipam = Ipam::new(Arc::new(FileStore::open(dir.path()).unwrap()));
            ipam.create_pool(&pool, PoolKind::Tags((1..=9999).into()))
                .unwrap();
            ipam.allocate_tag(&pool, &owner, (1001..=9999).into())
                .unwrap()
        };
        let ipam = Ipam::new(Arc::new(FileStore::open(dir.path()).unwrap()));
        let again = ipam
            .allocate_tag(&pool, &owner, (1001..=9999).into())
            .unwrap();
        assert_eq!(first, again);
    }

    #[derive(Debug, bolero::TypeGenerator)]
    enum Op {
        Address(u8),
        Sized(u8, u8),
        Exact(u8, u8, u8),
        Release(u8),
    }

    #[test]
    fn live_allocations_never_overlap() {
        bolero::check!().with_type().for_each(|ops: &Vec<Op>| {
            let (ipam, pool) = block("10.0.0.0/22");
            for op in ops {
                let result = match op {
                    Op::Address(o) => ipam
                        .allocate_address(&pool, &Owner::new(format!("o{}", o % 16)))
                        .map(|_| ()),
                    Op::Sized(o, len) => ipam
                        .allocate_cidr(
                            &pool,
                            &Owner::new(format!("o{}", o % 16)),
                            CidrRequest::Size(22 + len % 11),
                        )
                        .map(|_| ()),
                    Op::Exact(o, third, len) => {
                        let len = 22 + len % 11;
                        let addr = Ipv4Addr::new(10, 0, third % 4, 0);
                        let cidr = ipnet::Ipv4Net::new(addr, len).unwrap().trunc();
                        ipam.allocate_cidr(
                            &pool,
                            &Owner::new(format!("o{}", o % 16)),
                            CidrRequest::Exact(cidr),
                        )
                        .map(|_| ())
                    }
                    Op::Release(o) => ipam
                        .release_owner(&pool, &Owner::new(format!("o{}", o % 16)))
                        .map(|_| ()),
                };
                if let Err(e) = result {
                    assert!(matches!(
                        e,
                        IpamError::AllocationConflict { .. } | IpamError::PoolExhausted { .. }
                    ));
                }
                let live = ipam.allocations(&pool).unwrap();
                for (n, a) in live.iter().enumerate() {
                    for b in &live[n + 1..] {
                        assert!(!a.value.overlaps(&b.value), "{a:?} overlaps {b:?}");
                    }
                }
            }
        });
    }
}
