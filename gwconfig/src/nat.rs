// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Gateway translation rules

use crate::builder::{ConfigBuilder, Render};
use ipnet::Ipv4Net;
use model::Gateway;
use std::fmt::Display;
use std::net::Ipv4Addr;

/// nftables table holding every gateway rule.
pub const NFT_TABLE: &str = "orbit-gateway";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NatRule {
    /// Traffic entering on `iif` for `daddr` is sent to `to`.
    Dnat {
        iif: String,
        daddr: Ipv4Addr,
        to: Ipv4Addr,
    },
    /// Traffic entering on `iif` for the gateway itself within `daddr` is dropped.
    /// Lives on the input hook; routed Sector traffic towards `daddr` is left to
    /// [`NatRule::Masquerade`].
    Drop { iif: String, daddr: Ipv4Net },
    /// Traffic from `iif` leaving on `oif` towards `daddr` takes the address of `oif`.
    Masquerade {
        iif: String,
        oif: String,
        daddr: Ipv4Net,
    },
}

impl NatRule {
    /// The nftables chain the rule lives in.
    #[must_use]
    pub fn chain(&self) -> Chain {
        match self {
            NatRule::Dnat { .. } => Chain::Prerouting,
            NatRule::Drop { .. } => Chain::Input,
            NatRule::Masquerade { .. } => Chain::Postrouting,
        }
    }
}

impl Display for NatRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NatRule::Dnat { iif, daddr, to } => {
                write!(f, "iifname \"{iif}\" ip daddr {daddr} dnat to {to}")
            }
            NatRule::Drop { iif, daddr } => write!(f, "iifname \"{iif}\" ip daddr {daddr} drop"),
            NatRule::Masquerade { iif, oif, daddr } => write!(
                f,
                "iifname \"{iif}\" oifname \"{oif}\" ip daddr {daddr} masquerade"
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Chain {
    Prerouting,
    Input,
    Postrouting,
}

impl Chain {
    const ALL: [Chain; 3] = [Chain::Prerouting, Chain::Input, Chain::Postrouting];

    fn name(self) -> &'static str {
        match self {
            Chain::Prerouting => "prerouting",
            Chain::Input => "input",
            Chain::Postrouting => "postrouting",
        }
    }
    fn hook(self) -> &'static str {
        match self {
            Chain::Prerouting => "type nat hook prerouting priority dstnat; policy accept;",
            Chain::Input => "type filter hook input priority filter; policy accept;",
            Chain::Postrouting => "type nat hook postrouting priority srcnat; policy accept;",
        }
    }
}

/// The complete ruleset of one gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NatRuleSet {
    pub rules: Vec<NatRule>,
}

impl NatRuleSet {
    pub fn iter(&self) -> impl Iterator<Item = &NatRule> {
        self.rules.iter()
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Renders as an nftables script that atomically replaces the gateway table.
impl Render for NatRuleSet {
    type Context = ();
    type Output = ConfigBuilder;
    fn render(&self, _ctx: &Self::Context) -> Self::Output {
        let mut config = ConfigBuilder::new();
        // declaring before flushing lets the script load whether or not the table exists
        config += format!("table ip {NFT_TABLE}");
        config += format!("flush table ip {NFT_TABLE}");
        config += format!("table ip {NFT_TABLE} {{");
        for chain in Chain::ALL {
            config.indented(1, &format!("chain {} {{", chain.name()));
            config.indented(2, chain.hook());
            for rule in self.rules.iter().filter(|r| r.chain() == chain) {
                config.indented(2, &rule.to_string());
            }
            config.indented(1, "}");
        }
        config += "}";
        config
    }
}

/// The three rules of a gateway, and nothing else:
/// * DNAT of Backplane ingress for the gateway Backplane-side address to its Sector-side address,
/// * drop of Sector ingress addressed to the Backplane network,
/// * masquerade of Sector traffic leaving towards the Backplane network.
#[must_use]
pub fn render_nat(gateway: &Gateway) -> NatRuleSet {
    let backplane = gateway.backplane_network();
    NatRuleSet {
        rules: vec![
            NatRule::Dnat {
                iif: gateway.backplane_iface.clone(),
                daddr: gateway.backplane_address.addr(),
                to: gateway.address,
            },
            NatRule::Drop {
                iif: gateway.sector_iface.clone(),
                daddr: backplane,
            },
            NatRule::Masquerade {
                iif: gateway.sector_iface.clone(),
                oif: gateway.backplane_iface.clone(),
                daddr: backplane,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::tests::gateway;
    use pretty_assertions::assert_eq;

    #[test]
    fn exactly_three_rules() {
        let gw = gateway(&[("default", "172.16.0.0/16")]);
        let rules = render_nat(&gw);
        let bp: Ipv4Net = "10.200.0.0/16".parse().unwrap();
        assert_eq!(
            rules.rules,
            vec![
                NatRule::Dnat {
                    iif: "eth1".to_owned(),
                    daddr: "10.200.0.2".parse().unwrap(),
                    to: "172.16.0.1".parse().unwrap(),
                },
                NatRule::Drop {
                    iif: "eth0".to_owned(),
                    daddr: bp,
                },
                NatRule::Masquerade {
                    iif: "eth0".to_owned(),
                    oif: "eth1".to_owned(),
                    daddr: bp,
                },
            ]
        );
    }

    #[test]
    fn nft_text() {
        let gw = gateway(&[("default", "172.16.0.0/16")]);
        let text = render_nat(&gw).render(&()).to_string();
        let expected = "\
table ip orbit-gateway
flush table ip orbit-gateway
table ip orbit-gateway {
\tchain prerouting {
\t\ttype nat hook prerouting priority dstnat; policy accept;
\t\tiifname \"eth1\" ip daddr 10.200.0.2 dnat to 172.16.0.1
\t}
\tchain input {
\t\ttype filter hook input priority filter; policy accept;
\t\tiifname \"eth0\" ip daddr 10.200.0.0/16 drop
\t}
\tchain postrouting {
\t\ttype nat hook postrouting priority srcnat; policy accept;
\t\tiifname \"eth0\" oifname \"eth1\" ip daddr 10.200.0.0/16 masquerade
\t}
}
";
        assert_eq!(text, expected);
    }

    #[test]
    fn overlapping_sectors_translate_to_distinct_addresses() {
        let a = gateway(&[("default", "172.16.0.0/16")]);
        let mut b = a.clone();
        b.backplane_address = "10.200.0.3/16".parse().unwrap();
        let dnat = |gw: &Gateway| match &render_nat(gw).rules[0] {
            NatRule::Dnat { daddr, .. } => *daddr,
            other => panic!("unexpected {other}"),
        };
        assert_ne!(dnat(&a), dnat(&b));
    }

    #[test]
    fn routed_sector_traffic_is_translated_not_dropped() {
        let gw = gateway(&[("default", "172.16.0.0/16")]);
        let rules = render_nat(&gw);
        // a Sector host reaching a Backplane peer: routed through the gateway
        let routed = rules
            .iter()
            .filter(|r| matches!(r, NatRule::Masquerade { iif, oif, .. } if iif == "eth0" && oif == "eth1"))
            .count();
        assert_eq!(routed, 1);
        // the drop only guards the gateway's own Backplane side
        for rule in rules.iter() {
            match rule {
                NatRule::Drop { .. } => assert_eq!(rule.chain(), Chain::Input),
                NatRule::Masquerade { .. } => assert_eq!(rule.chain(), Chain::Postrouting),
                NatRule::Dnat { .. } => assert_eq!(rule.chain(), Chain::Prerouting),
            }
        }
        let text = rules.render(&()).to_string();
        assert!(!text.contains("hook forward"));
    }
}
