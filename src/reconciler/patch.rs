use serde::{Deserialize, Serialize};

use crate::types::{
    ClusterSelf, Etcd2Params, FailoverMode, FailoverParams, Instance, Issue, Label, ReplicaSet,
    Role, ServerStat, Suggestions, TarantoolParams, TopologySnapshot, VshardGroup,
};

/// Failover fields to overwrite. Untouched fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailoverPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<FailoverMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover_timeout: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fencing_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fencing_timeout: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fencing_pause: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader_autoreturn: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoreturn_delay: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_cookie_hash: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etcd2_params: Option<Etcd2Params>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tarantool_params: Option<TarantoolParams>,
}

fn changed<T: Clone + PartialEq>(before: &T, after: &T) -> Option<T> {
    (before != after).then(|| after.clone())
}

fn changed_option<T: Clone + PartialEq>(before: &Option<T>, after: &Option<T>) -> Option<T> {
    if before == after {
        None
    } else {
        after.clone()
    }
}

impl FailoverPatch {
    pub fn mode(mode: FailoverMode) -> Self {
        Self {
            mode: Some(mode),
            ..Default::default()
        }
    }

    /// Only the fields that differ between `before` and `after`
    pub fn diff(before: &FailoverParams, after: &FailoverParams) -> Self {
        Self {
            mode: changed(&before.mode, &after.mode),
            failover_timeout: changed(&before.failover_timeout, &after.failover_timeout),
            fencing_enabled: changed(&before.fencing_enabled, &after.fencing_enabled),
            fencing_timeout: changed(&before.fencing_timeout, &after.fencing_timeout),
            fencing_pause: changed(&before.fencing_pause, &after.fencing_pause),
            leader_autoreturn: changed(&before.leader_autoreturn, &after.leader_autoreturn),
            autoreturn_delay: changed(&before.autoreturn_delay, &after.autoreturn_delay),
            check_cookie_hash: changed(&before.check_cookie_hash, &after.check_cookie_hash),
            state_provider: changed_option(&before.state_provider, &after.state_provider),
            etcd2_params: changed_option(&before.etcd2_params, &after.etcd2_params),
            tarantool_params: changed_option(&before.tarantool_params, &after.tarantool_params),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply_to(&self, params: &FailoverParams) -> FailoverParams {
        let mut next = params.clone();
        if let Some(mode) = self.mode {
            next.mode = mode;
        }
        if let Some(timeout) = self.failover_timeout {
            next.failover_timeout = timeout;
        }
        if let Some(enabled) = self.fencing_enabled {
            next.fencing_enabled = enabled;
        }
        if let Some(timeout) = self.fencing_timeout {
            next.fencing_timeout = timeout;
        }
        if let Some(pause) = self.fencing_pause {
            next.fencing_pause = pause;
        }
        if let Some(autoreturn) = self.leader_autoreturn {
            next.leader_autoreturn = autoreturn;
        }
        if let Some(delay) = self.autoreturn_delay {
            next.autoreturn_delay = delay;
        }
        if let Some(check) = self.check_cookie_hash {
            next.check_cookie_hash = check;
        }
        if let Some(provider) = &self.state_provider {
            next.state_provider = Some(provider.clone());
        }
        if let Some(etcd2) = &self.etcd2_params {
            next.etcd2_params = Some(etcd2.clone());
        }
        if let Some(tarantool) = &self.tarantool_params {
            next.tarantool_params = Some(tarantool.clone());
        }
        next
    }
}

/// Failover section of a fetch result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FailoverUpdate {
    /// Only the mode was queried; the other fields stay as they are.
    Mode(FailoverMode),
    /// Authoritative parameters replacing the current ones wholesale
    Full(FailoverParams),
}

impl FailoverUpdate {
    /// `top` wins; a mode on top of full parameters replaces just the mode.
    pub fn overlay(self, top: FailoverUpdate) -> FailoverUpdate {
        match (self, top) {
            (FailoverUpdate::Full(params), FailoverUpdate::Mode(mode)) => {
                FailoverUpdate::Full(FailoverParams { mode, ..params })
            }
            (_, top) => top,
        }
    }

    /// Parameters after this update. A bare mode needs known parameters to
    /// land on and yields `None` without them.
    pub fn apply_to(&self, current: Option<&FailoverParams>) -> Option<FailoverParams> {
        match self {
            FailoverUpdate::Full(params) => Some(params.clone()),
            FailoverUpdate::Mode(mode) => current.map(|params| FailoverParams {
                mode: *mode,
                ..params.clone()
            }),
        }
    }
}

/// Instance fields to overwrite
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstancePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// An empty zone clears it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<Label>>,
}

impl InstancePatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply_to(&self, instance: &Instance) -> Instance {
        let mut next = instance.clone();
        if let Some(disabled) = self.disabled {
            next.disabled = disabled;
        }
        if let Some(alias) = &self.alias {
            next.alias = Some(alias.clone());
        }
        if let Some(zone) = &self.zone {
            next.zone = (!zone.is_empty()).then(|| zone.clone());
        }
        if let Some(labels) = &self.labels {
            next.labels = labels.clone();
        }
        next
    }
}

/// Local edit applied right after a mutation succeeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SnapshotPatch {
    Failover(FailoverPatch),
    Instance {
        uuid: String,
        patch: InstancePatch,
    },
    /// Make `instance_uuid` the active leader of its replica set
    Leader {
        replicaset_uuid: String,
        instance_uuid: String,
    },
}

impl SnapshotPatch {
    /// New snapshot with the patch applied, or `None` when the patched
    /// container does not exist in `snapshot`.
    pub fn apply(&self, snapshot: &TopologySnapshot) -> Option<TopologySnapshot> {
        match self {
            SnapshotPatch::Failover(patch) => {
                let failover = snapshot.failover.as_ref()?;
                Some(TopologySnapshot {
                    failover: Some(patch.apply_to(failover)),
                    ..snapshot.clone()
                })
            }
            SnapshotPatch::Instance { uuid, patch } => {
                let known = snapshot.instance(uuid).is_some()
                    || snapshot
                        .replica_sets
                        .iter()
                        .any(|replica_set| replica_set.server(uuid).is_some());
                if !known {
                    return None;
                }

                let patch_instance = |instance: &Instance| {
                    if &instance.uuid == uuid {
                        patch.apply_to(instance)
                    } else {
                        instance.clone()
                    }
                };
                Some(TopologySnapshot {
                    instances: snapshot.instances.iter().map(patch_instance).collect(),
                    replica_sets: snapshot
                        .replica_sets
                        .iter()
                        .map(|replica_set| ReplicaSet {
                            servers: replica_set.servers.iter().map(patch_instance).collect(),
                            ..replica_set.clone()
                        })
                        .collect(),
                    ..snapshot.clone()
                })
            }
            SnapshotPatch::Leader {
                replicaset_uuid,
                instance_uuid,
            } => {
                let target = snapshot.replica_set(replicaset_uuid)?;
                target.server(instance_uuid)?;

                Some(TopologySnapshot {
                    replica_sets: snapshot
                        .replica_sets
                        .iter()
                        .map(|replica_set| {
                            if &replica_set.uuid == replicaset_uuid {
                                ReplicaSet {
                                    active_master_uuid: Some(instance_uuid.clone()),
                                    ..replica_set.clone()
                                }
                            } else {
                                replica_set.clone()
                            }
                        })
                        .collect(),
                    ..snapshot.clone()
                })
            }
        }
    }
}

/// Result of one fetch. Sections the query did not carry are `None` and
/// leave the current snapshot untouched when merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotUpdate {
    pub instances: Option<Vec<Instance>>,
    pub replica_sets: Option<Vec<ReplicaSet>>,
    pub failover: Option<FailoverUpdate>,
    pub issues: Option<Vec<Issue>>,
    pub suggestions: Option<Suggestions>,
    pub known_roles: Option<Vec<Role>>,
    pub server_stat: Option<Vec<ServerStat>>,
    pub cluster_self: Option<ClusterSelf>,
    pub vshard_groups: Option<Vec<VshardGroup>>,
}

impl SnapshotUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Overlay another update; sections present in `other` win.
    pub fn overlay(self, other: SnapshotUpdate) -> SnapshotUpdate {
        SnapshotUpdate {
            instances: other.instances.or(self.instances),
            replica_sets: other.replica_sets.or(self.replica_sets),
            failover: match (self.failover, other.failover) {
                (Some(base), Some(top)) => Some(base.overlay(top)),
                (base, top) => top.or(base),
            },
            issues: other.issues.or(self.issues),
            suggestions: other.suggestions.or(self.suggestions),
            known_roles: other.known_roles.or(self.known_roles),
            server_stat: other.server_stat.or(self.server_stat),
            cluster_self: other.cluster_self.or(self.cluster_self),
            vshard_groups: other.vshard_groups.or(self.vshard_groups),
        }
    }

    /// Snapshot with every present section replacing its counterpart in
    /// `previous`. Without a previous snapshot the update stands alone.
    pub fn merge_into(self, previous: Option<&TopologySnapshot>) -> TopologySnapshot {
        let base = previous.cloned().unwrap_or_default();
        let failover = match self.failover {
            Some(update) => update.apply_to(base.failover.as_ref()),
            None => base.failover,
        };

        TopologySnapshot {
            instances: self.instances.unwrap_or(base.instances),
            replica_sets: self.replica_sets.unwrap_or(base.replica_sets),
            failover,
            issues: self.issues.unwrap_or(base.issues),
            suggestions: self.suggestions.or(base.suggestions),
            known_roles: self.known_roles.unwrap_or(base.known_roles),
            server_stat: self.server_stat.unwrap_or(base.server_stat),
            cluster_self: self.cluster_self.or(base.cluster_self),
            vshard_groups: self.vshard_groups.unwrap_or(base.vshard_groups),
        }
    }
}

impl From<TopologySnapshot> for SnapshotUpdate {
    fn from(snapshot: TopologySnapshot) -> Self {
        Self {
            failover: snapshot.failover.clone().map(FailoverUpdate::Full),
            instances: Some(snapshot.instances),
            replica_sets: Some(snapshot.replica_sets),
            issues: Some(snapshot.issues),
            suggestions: snapshot.suggestions,
            known_roles: Some(snapshot.known_roles),
            server_stat: Some(snapshot.server_stat),
            cluster_self: snapshot.cluster_self,
            vshard_groups: Some(snapshot.vshard_groups),
        }
    }
}
