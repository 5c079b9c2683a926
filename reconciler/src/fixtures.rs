// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Shared test inputs

use ipam::{Ipam, MemoryStore};
use model::{ApplianceTemplate, BackplaneManifest, ClusterManifest, NodeManifest, SectorManifest};
use planner::{BackplaneDesiredState, Planner};
use std::sync::Arc;

pub(crate) fn cluster() -> ClusterManifest {
    ClusterManifest {
        name: "lab".to_owned(),
        nodes: vec![
            NodeManifest {
                name: "pve1".to_owned(),
                management_address: "192.168.1.11".parse().unwrap(),
                uplink_mtu: 1500,
            },
            NodeManifest {
                name: "pve2".to_owned(),
                management_address: "192.168.1.12".parse().unwrap(),
                uplink_mtu: 1500,
            },
        ],
        backplane: BackplaneManifest {
            cidr: "10.200.0.0/16".parse().unwrap(),
            asn: 65000,
        },
        reserved_tags: [].into(),
        gateway_template: ApplianceTemplate::gateway_default(),
        dns_template: ApplianceTemplate::dns_default(),
    }
}

pub(crate) fn planner() -> Planner {
    Planner::new(Arc::new(Ipam::new(Arc::new(MemoryStore::new()))))
}

pub(crate) fn backplane() -> (Planner, BackplaneDesiredState) {
    let planner = planner();
    let bp = planner.plan_backplane(&cluster()).unwrap();
    (planner, bp)
}

pub(crate) fn sector(name: &str) -> SectorManifest {
    SectorManifest::new(name, "172.16.0.0/16".parse().unwrap())
}
