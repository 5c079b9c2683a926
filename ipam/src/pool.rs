// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Pools, allocations and the first-fit search over them

use chrono::{DateTime, Utc};
use id::Id;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;

/// Name of a pool, e.g. `backplane` or `sector/web`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(String);

impl PoolId {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to the entity consuming an allocation, e.g. `sector/web/tag`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Owner(String);

impl Owner {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed range of integer tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRange {
    pub first: u32,
    pub last: u32,
}

impl TagRange {
    #[must_use]
    pub fn contains(&self, tag: u32) -> bool {
        self.first <= tag && tag <= self.last
    }
    #[must_use]
    pub fn covers(&self, other: &TagRange) -> bool {
        self.first <= other.first && other.last <= self.last
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.first > self.last
    }
}

impl From<RangeInclusive<u32>> for TagRange {
    fn from(range: RangeInclusive<u32>) -> Self {
        Self {
            first: *range.start(),
            last: *range.end(),
        }
    }
}

impl Display for TagRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.first, self.last)
    }
}

/// What a pool hands out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PoolKind {
    /// Prefixes and host addresses within a block.
    Block(Ipv4Net),
    /// Integer tags within a range.
    Tags(TagRange),
}

impl PoolKind {
    fn span(&self) -> (u32, u32) {
        match self {
            PoolKind::Block(net) => (u32::from(net.network()), u32::from(net.broadcast())),
            PoolKind::Tags(range) => (range.first, range.last),
        }
    }
}

impl Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolKind::Block(net) => write!(f, "block {net}"),
            PoolKind::Tags(range) => write!(f, "tags {range}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocatedValue {
    Cidr(Ipv4Net),
    Address(Ipv4Addr),
    Tag(u32),
}

impl AllocatedValue {
    /// The closed interval of integers the value occupies.
    #[must_use]
    pub fn span(&self) -> (u32, u32) {
        match self {
            AllocatedValue::Cidr(net) => (u32::from(net.network()), u32::from(net.broadcast())),
            AllocatedValue::Address(addr) => (u32::from(*addr), u32::from(*addr)),
            AllocatedValue::Tag(tag) => (*tag, *tag),
        }
    }

    #[must_use]
    pub fn overlaps(&self, other: &AllocatedValue) -> bool {
        let (a0, a1) = self.span();
        let (b0, b1) = other.span();
        a0 <= b1 && b0 <= a1
    }

    fn fits(&self, kind: &PoolKind) -> bool {
        let (lo, hi) = kind.span();
        let (v0, v1) = self.span();
        let shape = matches!(
            (self, kind),
            (AllocatedValue::Tag(_), PoolKind::Tags(_))
                | (
                    AllocatedValue::Cidr(_) | AllocatedValue::Address(_),
                    PoolKind::Block(_)
                )
        );
        shape && lo <= v0 && v1 <= hi
    }
}

impl Display for AllocatedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocatedValue::Cidr(net) => write!(f, "prefix {net}"),
            AllocatedValue::Address(addr) => write!(f, "address {addr}"),
            AllocatedValue::Tag(tag) => write!(f, "tag {tag}"),
        }
    }
}

/// A live allocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: Id<Allocation>,
    pub owner: Owner,
    pub value: AllocatedValue,
    pub allocated_at: DateTime<Utc>,
}

impl Allocation {
    /// The id of the allocation of `owner` in `pool`. It does not depend on the value, so an
    /// allocation replaced in place keeps its id.
    #[must_use]
    pub fn id_for(pool: &PoolId, owner: &Owner) -> Id<Allocation> {
        Id::derive(format!("{pool}/{owner}"))
    }

    #[must_use]
    pub fn tag(&self) -> Option<u32> {
        match self.value {
            AllocatedValue::Tag(tag) => Some(tag),
            _ => None,
        }
    }
    #[must_use]
    pub fn address(&self) -> Option<Ipv4Addr> {
        match self.value {
            AllocatedValue::Address(addr) => Some(addr),
            _ => None,
        }
    }
    #[must_use]
    pub fn cidr(&self) -> Option<Ipv4Net> {
        match self.value {
            AllocatedValue::Cidr(net) => Some(net),
            _ => None,
        }
    }
}

/// How to pick a prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CidrRequest {
    /// This exact prefix.
    Exact(Ipv4Net),
    /// The lowest free prefix of this length.
    Size(u8),
}

/// The persisted state of one pool: the set of live allocations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRecord {
    pub id: PoolId,
    pub kind: PoolKind,
    #[serde(default)]
    pub allocations: Vec<Allocation>,
}

impl PoolRecord {
    #[must_use]
    pub fn new(id: PoolId, kind: PoolKind) -> Self {
        Self {
            id,
            kind,
            allocations: vec![],
        }
    }

    #[must_use]
    pub fn by_owner(&self, owner: &Owner) -> Option<&Allocation> {
        self.allocations.iter().find(|a| &a.owner == owner)
    }

    /// Whether `value` has the right shape for the pool and lies inside it.
    #[must_use]
    pub fn fits(&self, value: &AllocatedValue) -> bool {
        value.fits(&self.kind)
    }

    /// The first live allocation overlapping `value`, ignoring the one held by `except`.
    #[must_use]
    pub fn conflict(&self, value: &AllocatedValue, except: Option<&Owner>) -> Option<&Allocation> {
        self.allocations
            .iter()
            .filter(|a| Some(&a.owner) != except)
            .find(|a| a.value.overlaps(value))
    }

    /// Insert or replace the allocation of `allocation.owner`.
    pub fn upsert(&mut self, allocation: Allocation) {
        self.allocations.retain(|a| a.owner != allocation.owner);
        self.allocations.push(allocation);
        self.allocations.sort_by_key(|a| a.value.span());
    }

    pub fn remove(&mut self, id: Id<Allocation>) -> Option<Allocation> {
        let pos = self.allocations.iter().position(|a| a.id == id)?;
        Some(self.allocations.remove(pos))
    }

    fn sorted_spans(&self) -> Vec<(u32, u32)> {
        let mut spans: Vec<_> = self.allocations.iter().map(|a| a.value.span()).collect();
        spans.sort_unstable();
        spans
    }

    /// Lowest integer in `[lo, hi]` not covered by any live allocation.
    #[must_use]
    pub fn lowest_free(&self, lo: u32, hi: u32) -> Option<u32> {
        let mut candidate = u64::from(lo);
        for (start, end) in self.sorted_spans() {
            if u64::from(start) > candidate {
                break;
            }
            candidate = candidate.max(u64::from(end) + 1);
        }
        u32::try_from(candidate).ok().filter(|c| *c <= hi)
    }

    /// Lowest host address of the pool block that is free. The network and broadcast addresses
    /// are never handed out for prefixes shorter than /31.
    #[must_use]
    pub fn lowest_free_address(&self) -> Option<Ipv4Addr> {
        self.lowest_free_host(0)
    }

    /// Like [`PoolRecord::lowest_free_address`], leaving out the first `skip` host addresses.
    #[must_use]
    pub fn lowest_free_host(&self, skip: u32) -> Option<Ipv4Addr> {
        let PoolKind::Block(block) = self.kind else {
            return None;
        };
        let (mut lo, mut hi) = self.kind.span();
        if block.prefix_len() < 31 {
            lo += 1;
            hi -= 1;
        }
        let lo = lo.checked_add(skip)?;
        self.lowest_free(lo, hi).map(Ipv4Addr::from)
    }

    /// Lowest aligned free prefix of length `prefix_len` within the pool block.
    #[must_use]
    pub fn first_fit(&self, prefix_len: u8) -> Option<Ipv4Net> {
        let PoolKind::Block(block) = self.kind else {
            return None;
        };
        if prefix_len < block.prefix_len() || prefix_len > 32 {
            return None;
        }
        let size = 1u64 << (32 - prefix_len);
        let (lo, hi) = self.kind.span();
        let hi = u64::from(hi);
        let mut start = u64::from(lo);
        let spans = self.sorted_spans();
        while start + size - 1 <= hi {
            let end = start + size - 1;
            let blocking = spans
                .iter()
                .filter(|(s, e)| u64::from(*s) <= end && start <= u64::from(*e))
                .map(|(_, e)| u64::from(*e))
                .max();
            match blocking {
                None => {
                    let addr = Ipv4Addr::from(u32::try_from(start).ok()?);
                    return Ipv4Net::new(addr, prefix_len).ok();
                }
                // jump past the blocker, realigned on the requested size
                Some(e) => start = (e + 1).div_ceil(size) * size,
            }
        }
        None
    }
}
