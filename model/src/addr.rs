// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Address arithmetic on IPv4 prefixes

use crate::constants::{DNS_HOST, GATEWAY_HOST};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// The address at `offset` from the network address of `net`, if it is still inside `net`.
#[must_use]
pub fn host(net: &Ipv4Net, offset: u32) -> Option<Ipv4Addr> {
    let addr = Ipv4Addr::from(u32::from(net.network()).checked_add(offset)?);
    net.contains(&addr).then_some(addr)
}

/// The gateway address of `net`: its network address + 1.
///
/// Prefixes longer than /31 have no such address; the network address is returned for those,
/// which manifest validation never lets through.
#[must_use]
pub fn gateway(net: &Ipv4Net) -> Ipv4Addr {
    host(net, GATEWAY_HOST).unwrap_or(net.network())
}

/// The address a Sector DNS appliance takes on `net`: network address + 2.
#[must_use]
pub fn dns(net: &Ipv4Net) -> Ipv4Addr {
    host(net, DNS_HOST).unwrap_or(net.network())
}

/// `addr` qualified with the prefix length of `net`, in interface notation (`10.0.0.1/24`).
#[must_use]
pub fn on_link(addr: Ipv4Addr, net: &Ipv4Net) -> Ipv4Net {
    // prefix length comes from an existing Ipv4Net so it is always valid
    Ipv4Net::new(addr, net.prefix_len()).unwrap_or(*net)
}

/// Closed-interval overlap test of two prefixes.
#[must_use]
pub fn overlaps(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(b) || b.contains(a)
}
