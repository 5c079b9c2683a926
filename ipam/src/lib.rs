// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Address and tag management.
//!
//! An [`Ipam`] hands out prefixes, host addresses and integer tags from named pools. Pools are
//! fully independent from each other: two pools may cover the same address range and nothing
//! ever cross-checks them. Within a pool, no two live allocations overlap.
//!
//! Every allocation belongs to an [`Owner`] and an owner holds at most one allocation per pool.
//! Asking again on behalf of the same owner returns what the owner already holds, which is what
//! makes re-planning after a crash reproducible. Each mutation is written to the
//! [`AllocationStore`] before the call returns.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc)]

mod allocator;
pub mod errors;
pub mod pool;
pub mod store;

pub use allocator::Ipam;
pub use errors::{IpamError, StoreError};
pub use pool::{
    AllocatedValue, Allocation, CidrRequest, Owner, PoolId, PoolKind, PoolRecord, TagRange,
};
pub use store::{AllocationStore, FileStore, MemoryStore};

use tracectl::trace_target;
trace_target!("ipam", LevelFilter::INFO, &["orbit"]);
