// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Gateway static routes

use crate::builder::{ConfigBuilder, MARKER, Render};
use ipnet::Ipv4Net;
use model::Gateway;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::net::Ipv4Addr;
use tracing::debug;

#[derive(Clone, Debug, Ord, Eq, PartialEq, PartialOrd)]
pub enum StaticRouteNhop {
    Interface(String),
    Address(Ipv4Addr),
}

impl Display for StaticRouteNhop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StaticRouteNhop::Interface(ifname) => write!(f, "{ifname}"),
            StaticRouteNhop::Address(address) => write!(f, "{address}"),
        }
    }
}

#[derive(Clone, Debug, Ord, Eq, PartialEq, PartialOrd)]
pub struct StaticRoute {
    pub prefix: Ipv4Net,
    pub next_hop: StaticRouteNhop,
}

impl StaticRoute {
    #[must_use]
    pub fn via_iface(prefix: Ipv4Net, ifname: &str) -> Self {
        Self {
            prefix,
            next_hop: StaticRouteNhop::Interface(ifname.to_owned()),
        }
    }
    #[must_use]
    pub fn via_addr(prefix: Ipv4Net, addr: Ipv4Addr) -> Self {
        Self {
            prefix,
            next_hop: StaticRouteNhop::Address(addr),
        }
    }
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.prefix.prefix_len() == 0
    }
}

impl Render for StaticRoute {
    type Context = ();
    type Output = String;
    fn render(&self, _ctx: &Self::Context) -> Self::Output {
        format!("ip route {} {}", self.prefix, self.next_hop)
    }
}

/// The routes of one gateway, ordered by prefix.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticRouteSet {
    pub hostname: String,
    pub routes: BTreeSet<StaticRoute>,
}

impl StaticRouteSet {
    pub fn iter(&self) -> impl Iterator<Item = &StaticRoute> {
        self.routes.iter()
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
    #[must_use]
    pub fn default_route(&self) -> Option<&StaticRoute> {
        self.routes.iter().find(|r| r.is_default())
    }
}

/// Renders as a staticd configuration.
impl Render for StaticRouteSet {
    type Context = ();
    type Output = ConfigBuilder;
    fn render(&self, ctx: &Self::Context) -> Self::Output {
        let mut config = ConfigBuilder::new();
        config += format!("! static routes of {}", self.hostname);
        config += MARKER;
        for route in &self.routes {
            config += route.render(ctx);
        }
        config += MARKER;
        config
    }
}

/// Routes of a gateway: one per attached subnet out of the Sector interface, plus the single
/// default route via the Backplane gateway.
#[must_use]
pub fn render_routes(gateway: &Gateway) -> StaticRouteSet {
    let mut routes: BTreeSet<StaticRoute> = gateway
        .sector_networks()
        .map(|net| StaticRoute::via_iface(net, &gateway.sector_iface))
        .collect();
    routes.insert(StaticRoute::via_addr(
        Ipv4Net::default(),
        gateway.backplane_gateway,
    ));
    debug!("Rendered {} routes for {}", routes.len(), gateway.hostname);
    StaticRouteSet {
        hostname: gateway.hostname.clone(),
        routes,
    }
}
