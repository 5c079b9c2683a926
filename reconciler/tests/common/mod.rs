// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![allow(dead_code)]

use orbit_reconciler as reconciler;

use ipam::{AllocationStore, Ipam, MemoryStore};
use model::{ApplianceTemplate, BackplaneManifest, ClusterManifest, NodeManifest, SectorManifest};
use planner::{BackplaneDesiredState, Planner};
use platform::SimPlatform;
use reconciler::{MemoryStatusStore, Reconciler, ReconcilerParams, ReconcilerParamsBuilder, StatusStore};
use std::sync::Arc;
use std::time::Duration;

pub fn cluster() -> ClusterManifest {
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
            NodeManifest {
                name: "pve3".to_owned(),
                management_address: "192.168.1.13".parse().unwrap(),
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

pub fn sector(name: &str) -> SectorManifest {
    SectorManifest::new(name, "172.16.0.0/16".parse().unwrap())
}

/// Short deadlines and backoffs, two attempts per call.
pub fn fast() -> ReconcilerParams {
    ReconcilerParamsBuilder::default()
        .deadline(Duration::from_secs(1))
        .attempts(2)
        .backoff(Duration::from_millis(1))
        .max_backoff(Duration::from_millis(2))
        .build()
        .unwrap()
}

pub fn reconciler_with(
    platform: SimPlatform,
    allocations: Arc<dyn AllocationStore>,
    status: Arc<dyn StatusStore>,
) -> Reconciler<SimPlatform> {
    let planner = Planner::new(Arc::new(Ipam::new(allocations)));
    Reconciler::new(platform, planner, status, fast())
}

pub fn reconciler() -> Reconciler<SimPlatform> {
    reconciler_with(
        SimPlatform::new(),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStatusStore::new()),
    )
}

/// A reconciler whose Backplane is in place.
pub async fn initialized() -> (Reconciler<SimPlatform>, BackplaneDesiredState) {
    let reconciler = reconciler();
    let backplane = reconciler.init(&cluster()).await.unwrap();
    reconciler.platform().clear_mutations();
    (reconciler, backplane)
}

pub fn mutations(reconciler: &Reconciler<SimPlatform>) -> Vec<String> {
    reconciler
        .platform()
        .mutations()
        .iter()
        .map(|m| format!("{} {}", m.kind, m.key))
        .collect()
}
