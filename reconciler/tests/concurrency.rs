// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Several Sectors at once, and several reconciliations of the same Sector

use orbit_reconciler as reconciler;

mod common;

use common::{initialized, sector};
use model::{DnsManifest, SectorState, SubnetManifest};
use platform::{Fault, Resource, ResourceKey, Vnet, Zone, ZoneKind};
use pretty_assertions::assert_eq;
use reconciler::ReconcileError;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing_test::traced_test;

fn orphan(tag: u32) -> [Resource; 2] {
    let id = format!("sec{tag}");
    [
        Resource::Zone(Zone {
            id: id.clone(),
            kind: ZoneKind::Vxlan {
                peers: BTreeSet::new(),
            },
            mtu: 1450,
        }),
        Resource::Vnet(Vnet {
            id: id.clone(),
            zone: id,
            tag,
            alias: "leftover".to_owned(),
        }),
    ]
}

#[tokio::test]
async fn overlapping_sectors_coexist() {
    let (reconciler, backplane) = initialized().await;
    let report = reconciler
        .apply_all(&[sector("web"), sector("db")], &backplane)
        .await
        .unwrap();
    assert_eq!(report.failures(), 0);
    assert!(report.orphans.is_empty());

    let names: Vec<&str> = report.sectors.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["db", "web"]);
    let tags: BTreeSet<u32> = report
        .sectors
        .iter()
        .map(|(_, r)| {
            let status = r.as_ref().unwrap();
            assert_eq!(status.state, SectorState::Active);
            status.tag.unwrap()
        })
        .collect();
    assert_eq!(tags, BTreeSet::from([1001, 1002]));

    // same private prefix, told apart by their Backplane addresses
    let nat: Vec<String> = reconciler
        .platform()
        .snapshot()
        .iter()
        .filter_map(|r| match r {
            Resource::GatewayConfig(config) => Some(config.nat.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(nat.len(), 2);
    for backplane_address in ["10.200.0.2", "10.200.0.3"] {
        let rule = format!("ip daddr {backplane_address} dnat to 172.16.0.1");
        assert_eq!(nat.iter().filter(|n| n.contains(&rule)).count(), 1);
    }
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn newer_generation_supersedes_older_one() {
    let (reconciler, backplane) = initialized().await;
    reconciler.platform().set_latency(Duration::from_millis(100));
    let mut first = sector("web");
    first.generation = 1;
    let mut second = first.clone();
    second.generation = 2;
    second.dns = Some(DnsManifest::default());

    let (old, new) = tokio::join!(
        reconciler.apply_sector(&first, &backplane),
        reconciler.apply_sector(&second, &backplane)
    );
    assert!(matches!(
        old,
        Err(ReconcileError::Superseded {
            generation: 1,
            current: 2,
            ..
        })
    ));
    let status = new.unwrap();
    assert_eq!(status.state, SectorState::Active);
    assert_eq!(status.generation, 2);
    assert_eq!(reconciler.status("web").unwrap(), Some(status));
    assert!(
        reconciler
            .platform()
            .snapshot()
            .contains(&ResourceKey::Dns("sec1001-dns".to_owned()))
    );
    // the superseded run did not get to apply anything
    assert_eq!(reconciler.platform().mutations().len(), 6);
    assert!(logs_contain("superseded"));
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn delete_supersedes_apply_in_flight() {
    let (reconciler, backplane) = initialized().await;
    reconciler.platform().set_latency(Duration::from_millis(100));

    let web = sector("web");
    let (applied, deleted) = tokio::join!(
        reconciler.apply_sector(&web, &backplane),
        reconciler.delete_sector("web")
    );
    assert!(matches!(applied, Err(ReconcileError::Superseded { .. })));
    let status = deleted.unwrap();
    assert_eq!(status.state, SectorState::Deleted);
    // the stale apply wrote nothing after the delete took over
    assert_eq!(reconciler.status("web").unwrap(), Some(status));
    assert_eq!(reconciler.planner().sector_tag("web").unwrap(), None);
    assert!(reconciler.platform().mutations().is_empty());
    assert!(logs_contain("leaving sector web to the newer run"));
}

#[tokio::test(start_paused = true)]
async fn apply_during_delete_is_refused() {
    let (reconciler, backplane) = initialized().await;
    reconciler.apply_sector(&sector("web"), &backplane).await.unwrap();
    reconciler.platform().clear_mutations();
    reconciler.platform().set_latency(Duration::from_millis(100));

    let web = sector("web");
    let (deleted, applied) = tokio::join!(
        reconciler.delete_sector("web"),
        reconciler.apply_sector(&web, &backplane)
    );
    assert!(matches!(
        applied,
        Err(ReconcileError::InvalidTransition(model::InvalidTransition {
            from: SectorState::TearingDown,
            ..
        }))
    ));
    let status = deleted.unwrap();
    assert_eq!(status.state, SectorState::Deleted);
    assert_eq!(reconciler.planner().sector_tag("web").unwrap(), None);
    let actual = reconciler.platform().snapshot();
    assert!(actual.keys().all(|key| key.sector_tag().is_none()));
}

#[tokio::test]
async fn older_generations_are_refused() {
    let (reconciler, backplane) = initialized().await;
    let mut web = sector("web");
    web.generation = 3;
    reconciler.apply_sector(&web, &backplane).await.unwrap();
    reconciler.platform().clear_mutations();

    web.generation = 2;
    web.dns = Some(DnsManifest::default());
    let err = reconciler.apply_sector(&web, &backplane).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Superseded {
            generation: 2,
            current: 3,
            ..
        }
    ));
    assert!(reconciler.platform().mutations().is_empty());
    assert_eq!(reconciler.status("web").unwrap().unwrap().generation, 3);
}

#[tokio::test]
#[traced_test]
async fn orphans_are_swept() {
    let (reconciler, backplane) = initialized().await;
    for resource in orphan(1005) {
        reconciler.platform().seed(resource);
    }
    // not a Sector object: left alone
    reconciler.platform().seed(Resource::Vnet(Vnet {
        id: "vmbr7".to_owned(),
        zone: "lan".to_owned(),
        tag: 7,
        alias: "lab uplink".to_owned(),
    }));
    // a degraded Sector keeps what it has
    reconciler
        .platform()
        .inject(Fault::reject(1).on(ResourceKey::Gateway("sec1001-gw".to_owned())));

    let report = reconciler.apply_all(&[sector("web")], &backplane).await.unwrap();
    assert_eq!(report.failures(), 1);
    assert_eq!(
        report.orphans,
        [
            ResourceKey::Vnet("sec1005".to_owned()),
            ResourceKey::Zone("sec1005".to_owned()),
        ]
    );
    let actual = reconciler.platform().snapshot();
    assert!(!actual.contains(&ResourceKey::Zone("sec1005".to_owned())));
    assert!(actual.contains(&ResourceKey::Vnet("vmbr7".to_owned())));
    assert!(actual.contains(&ResourceKey::Zone("sec1001".to_owned())));
    assert!(logs_contain("orphaned objects of sec1005"));
}

#[tokio::test]
#[traced_test]
async fn no_sweep_when_planning_fails() {
    let (reconciler, backplane) = initialized().await;
    for resource in orphan(1005) {
        reconciler.platform().seed(resource);
    }
    let mut broken = sector("broken");
    broken.subnets = vec![SubnetManifest {
        name: "tiny".to_owned(),
        cidr: "172.16.9.0/24".parse().unwrap(),
    }];

    let report = reconciler
        .apply_all(&[sector("web"), broken], &backplane)
        .await
        .unwrap();
    assert_eq!(report.failures(), 1);
    assert!(matches!(
        report.sectors[0],
        (_, Err(ReconcileError::Plan { .. }))
    ));
    assert!(report.orphans.is_empty());
    assert!(
        reconciler
            .platform()
            .snapshot()
            .contains(&ResourceKey::Zone("sec1005".to_owned()))
    );
    assert!(logs_contain("Skipping orphan sweep"));
}
