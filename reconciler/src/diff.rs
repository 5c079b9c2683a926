// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Desired versus observed state

use crate::action::Action;
use planner::DesiredState;
use platform::{ObservedState, ResourceKey};
use std::collections::BTreeSet;
use tracing::debug;

/// Objects that vanish together with the deletion of `key`, without being deleted themselves.
fn removed_along(key: &ResourceKey) -> Option<ResourceKey> {
    match key {
        ResourceKey::Gateway(id) => Some(ResourceKey::GatewayConfig(id.clone())),
        _ => None,
    }
}

/// Compute the actions that take the scope of `desired` from `actual` to `desired`.
///
/// Objects of `actual` outside of that scope are never touched. Deletions come first, from the
/// highest rank down, followed by creations and updates from the lowest rank up, so that an
/// object is only ever created once what it depends on exists and only deleted once nothing
/// depends on it anymore. Objects that cannot be updated in place are deleted and created again,
/// and so is anything depending on them.
#[must_use]
pub fn reconcile(desired: &DesiredState, actual: &ObservedState) -> Vec<Action> {
    let actual = actual.scoped(desired.scope());

    let mut replaced: BTreeSet<ResourceKey> = desired
        .iter()
        .filter(|r| {
            let key = r.key();
            !key.updatable() && actual.get(&key).is_some_and(|existing| existing != *r)
        })
        .map(platform::Resource::key)
        .collect();
    // what depends on a replaced object goes with it
    let mut pending: Vec<ResourceKey> = replaced.iter().cloned().collect();
    while let Some(key) = pending.pop() {
        for dependent in actual.dependents(&key).map(platform::Resource::key) {
            if replaced.insert(dependent.clone()) {
                pending.push(dependent);
            }
        }
    }

    let doomed: Vec<ResourceKey> = actual
        .keys()
        .filter(|key| !desired.contains(key) || replaced.contains(key))
        .cloned()
        .collect();
    let implicit: BTreeSet<ResourceKey> = doomed.iter().filter_map(removed_along).collect();

    let mut actions: Vec<Action> = doomed
        .iter()
        .rev()
        .filter(|key| !implicit.contains(key))
        .cloned()
        .map(Action::Delete)
        .collect();

    for resource in desired {
        let key = resource.key();
        match actual.get(&key) {
            Some(_) if replaced.contains(&key) || implicit.contains(&key) => {
                actions.push(Action::Create(resource.clone()));
            }
            Some(existing) if existing != resource => {
                actions.push(Action::Update(resource.clone()));
            }
            Some(_) => {}
            None => actions.push(Action::Create(resource.clone())),
        }
    }
    debug!(
        "{}: {} actions for {} desired and {} observed objects",
        desired.scope(),
        actions.len(),
        desired.len(),
        actual.len()
    );
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use model::{SectorManifest, SubnetManifest};
    use platform::{Resource, Scope, Vnet};
    use pretty_assertions::assert_eq;

    fn rendered(actions: &[Action]) -> Vec<String> {
        actions.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn creation_follows_dependencies() {
        let (planner, bp) = fixtures::backplane();
        let plan = planner.plan_sector(&fixtures::sector("web"), &bp).unwrap();
        let actions = reconcile(&plan.resources, &ObservedState::new());
        assert_eq!(
            rendered(&actions),
            vec![
                "create zone/sec1001",
                "create vnet/sec1001",
                "create subnet/sec1001-172.16.0.0-16",
                "create gateway/sec1001-gw",
                "create gateway-config/sec1001-gw",
            ]
        );
    }

    #[test]
    fn converged_state_needs_nothing() {
        let (planner, bp) = fixtures::backplane();
        let plan = planner.plan_sector(&fixtures::sector("web"), &bp).unwrap();
        assert!(reconcile(&plan.resources, &plan.resources.as_observed()).is_empty());
    }

    #[test]
    fn other_scopes_are_left_alone() {
        let (planner, bp) = fixtures::backplane();
        let web = planner.plan_sector(&fixtures::sector("web"), &bp).unwrap();
        let db = planner.plan_sector(&fixtures::sector("db"), &bp).unwrap();
        let mut actual = web.resources.as_observed();
        for r in &db.resources {
            actual.insert(r.clone());
        }
        for r in &bp.resources {
            actual.insert(r.clone());
        }
        assert!(reconcile(&web.resources, &actual).is_empty());
        assert!(reconcile(&db.resources, &actual).is_empty());
    }

    #[test]
    fn added_subnet_replaces_the_gateway() {
        let (planner, bp) = fixtures::backplane();
        let mut manifest = fixtures::sector("web");
        manifest.subnets = vec![SubnetManifest {
            name: "front".to_owned(),
            cidr: "172.16.0.0/24".parse().unwrap(),
        }];
        let before = planner.plan_sector(&manifest, &bp).unwrap();
        manifest.subnets.push(SubnetManifest {
            name: "back".to_owned(),
            cidr: "172.16.1.0/24".parse().unwrap(),
        });
        let after = planner.plan_sector(&manifest, &bp).unwrap();
        let actions = reconcile(&after.resources, &before.resources.as_observed());
        assert_eq!(
            rendered(&actions),
            vec![
                "delete gateway/sec1001-gw",
                "create subnet/sec1001-172.16.1.0-24",
                "create gateway/sec1001-gw",
                "create gateway-config/sec1001-gw",
            ]
        );
    }

    #[test]
    fn changed_objects_are_updated() {
        let (planner, bp) = fixtures::backplane();
        let plan = planner.plan_sector(&fixtures::sector("web"), &bp).unwrap();
        let mut actual = plan.resources.as_observed();
        actual.insert(Resource::Vnet(Vnet {
            id: "sec1001".to_owned(),
            zone: "sec1001".to_owned(),
            tag: 1001,
            alias: "renamed".to_owned(),
        }));
        assert_eq!(rendered(&reconcile(&plan.resources, &actual)), vec!["update vnet/sec1001"]);
    }

    #[test]
    fn teardown_runs_in_reverse() {
        let (planner, bp) = fixtures::backplane();
        let mut manifest = SectorManifest::new("web", "172.16.0.0/16".parse().unwrap());
        manifest.dns = Some(model::DnsManifest::default());
        let plan = planner.plan_sector(&manifest, &bp).unwrap();
        let actions = reconcile(
            &DesiredState::new(Scope::Sector(1001)),
            &plan.resources.as_observed(),
        );
        // the gateway configuration goes away with the gateway
        assert_eq!(
            rendered(&actions),
            vec![
                "delete dns/sec1001-dns",
                "delete gateway/sec1001-gw",
                "delete subnet/sec1001-172.16.0.0-16",
                "delete vnet/sec1001",
                "delete zone/sec1001",
            ]
        );
    }
}
