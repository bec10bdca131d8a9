//! Read-only derivations over a snapshot, for the views that render it.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::types::{Instance, Issue, ReplicaSet, Role, TopologySnapshot};

pub fn unconfigured_instances(snapshot: &TopologySnapshot) -> Vec<&Instance> {
    snapshot
        .instances
        .iter()
        .filter(|instance| !instance.is_configured())
        .collect()
}

pub fn configured_instances(snapshot: &TopologySnapshot) -> Vec<&Instance> {
    snapshot
        .instances
        .iter()
        .filter(|instance| instance.is_configured())
        .collect()
}

pub fn issues_for_instance<'a>(snapshot: &'a TopologySnapshot, uuid: &str) -> Vec<&'a Issue> {
    snapshot
        .issues
        .iter()
        .filter(|issue| issue.instance_uuid.as_deref() == Some(uuid))
        .collect()
}

pub fn issues_for_replica_set<'a>(snapshot: &'a TopologySnapshot, uuid: &str) -> Vec<&'a Issue> {
    snapshot
        .issues
        .iter()
        .filter(|issue| issue.replicaset_uuid.as_deref() == Some(uuid))
        .collect()
}

fn first_server_alias(replica_set: &ReplicaSet) -> &str {
    replica_set
        .servers
        .first()
        .and_then(|server| server.alias.as_deref())
        .unwrap_or_default()
}

/// Replica sets ordered by alias, then first server alias, then uuid
pub fn sorted_replica_sets(snapshot: &TopologySnapshot) -> Vec<&ReplicaSet> {
    let mut sorted: Vec<&ReplicaSet> = snapshot.replica_sets.iter().collect();
    sorted.sort_by(|a, b| {
        a.alias
            .cmp(&b.alias)
            .then_with(|| first_server_alias(a).cmp(first_server_alias(b)))
            .then_with(|| a.uuid.cmp(&b.uuid))
    });
    sorted
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthCounts {
    pub configured: usize,
    pub configured_unhealthy: usize,
    pub unconfigured: usize,
    pub replica_sets: usize,
    pub replica_sets_unhealthy: usize,
}

pub fn health_counts(snapshot: &TopologySnapshot) -> HealthCounts {
    let (configured, unconfigured): (Vec<&Instance>, Vec<&Instance>) = snapshot
        .instances
        .iter()
        .partition(|instance| instance.is_configured());

    HealthCounts {
        configured: configured.len(),
        configured_unhealthy: configured.iter().filter(|i| !i.is_healthy()).count(),
        unconfigured: unconfigured.len(),
        replica_sets: snapshot.replica_sets.len(),
        replica_sets_unhealthy: snapshot
            .replica_sets
            .iter()
            .filter(|replica_set| !replica_set.is_healthy())
            .count(),
    }
}

/// Distinct zones in use, sorted
pub fn zones(snapshot: &TopologySnapshot) -> Vec<String> {
    snapshot
        .instances
        .iter()
        .filter_map(|instance| instance.zone.clone())
        .filter(|zone| !zone.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownRoles<'a> {
    pub storage: Vec<&'a Role>,
    pub router: Vec<&'a Role>,
    pub other: Vec<&'a Role>,
}

pub fn known_roles(snapshot: &TopologySnapshot) -> KnownRoles<'_> {
    let mut roles = KnownRoles::default();
    for role in &snapshot.known_roles {
        if role.implies_storage {
            roles.storage.push(role);
        }
        if role.implies_router {
            roles.router.push(role);
        }
        if !role.implies_storage && !role.implies_router {
            roles.other.push(role);
        }
    }
    roles
}

/// Some vshard group is still unbootstrapped and both a storage and a router
/// replica set exist.
pub fn can_bootstrap_vshard(snapshot: &TopologySnapshot) -> bool {
    let roles = known_roles(snapshot);
    let has_role = |group: &[&Role]| {
        snapshot.replica_sets.iter().any(|replica_set| {
            replica_set
                .roles
                .iter()
                .any(|name| group.iter().any(|role| &role.name == name))
        })
    };

    snapshot.vshard_groups.iter().any(|group| !group.bootstrapped)
        && has_role(&roles.storage)
        && has_role(&roles.router)
}
