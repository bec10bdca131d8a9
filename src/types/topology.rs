//! Topology Types
//!
//! Records rendered by the dashboard:
//! - Instances (configured or not)
//! - Replica sets and their leaders
//! - The snapshot that ties them together

use serde::{Deserialize, Serialize};

use super::failover::FailoverParams;
use super::suggestions::{Issue, Suggestions};

/// Instance label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A single cluster member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Unique within a snapshot
    pub uuid: String,
    /// Advertise URI
    pub uri: String,
    #[serde(default)]
    pub alias: Option<String>,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub electable: bool,
    /// `None` for unconfigured instances
    #[serde(default)]
    pub replicaset_uuid: Option<String>,
    /// Box is in read-only mode (a follower)
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub zone: Option<String>,
}

impl Instance {
    pub fn new(uuid: impl Into<String>, uri: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            uri: uri.into(),
            alias: None,
            status: status.into(),
            message: None,
            disabled: false,
            electable: true,
            replicaset_uuid: None,
            read_only: false,
            labels: Vec::new(),
            zone: None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.replicaset_uuid.is_some()
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// A group of instances replicating one shard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaSet {
    pub uuid: String,
    #[serde(default)]
    pub alias: String,
    pub status: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Configured leader; always a member of `servers` when set
    #[serde(default)]
    pub master_uuid: Option<String>,
    /// Leader currently in charge; always a member of `servers` when set
    #[serde(default)]
    pub active_master_uuid: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub vshard_group: Option<String>,
    #[serde(default)]
    pub all_rw: bool,
    #[serde(default)]
    pub servers: Vec<Instance>,
}

impl ReplicaSet {
    pub fn new(uuid: impl Into<String>, alias: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            alias: alias.into(),
            status: status.into(),
            roles: Vec::new(),
            master_uuid: None,
            active_master_uuid: None,
            weight: None,
            vshard_group: None,
            all_rw: false,
            servers: Vec::new(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }

    pub fn server(&self, uuid: &str) -> Option<&Instance> {
        self.servers.iter().find(|server| server.uuid == uuid)
    }

    pub fn is_master(&self, uuid: &str) -> bool {
        self.master_uuid.as_deref() == Some(uuid)
    }

    pub fn is_active_master(&self, uuid: &str) -> bool {
        self.active_master_uuid.as_deref() == Some(uuid)
    }
}

/// Role known to the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub implies_storage: bool,
    #[serde(default)]
    pub implies_router: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub quota_size: u64,
    pub quota_used: u64,
    pub arena_size: u64,
    pub arena_used: u64,
    #[serde(default)]
    pub buckets_count: Option<u64>,
    #[serde(default)]
    pub quota_used_ratio: String,
    #[serde(default)]
    pub arena_used_ratio: String,
    #[serde(default)]
    pub items_used_ratio: String,
}

/// Memory statistics of one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStat {
    pub uuid: String,
    pub uri: String,
    #[serde(default)]
    pub statistics: Option<Statistics>,
}

/// The instance serving the API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSelf {
    #[serde(default)]
    pub uri: Option<String>,
    /// Empty until the instance joins a replica set
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub instance_name: Option<String>,
    #[serde(default)]
    pub demo_uri: Option<String>,
}

impl ClusterSelf {
    pub fn is_configured(&self) -> bool {
        self.uuid.as_deref().is_some_and(|uuid| !uuid.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VshardGroup {
    pub name: String,
    #[serde(default)]
    pub bucket_count: u64,
    #[serde(default)]
    pub bootstrapped: bool,
    #[serde(default)]
    pub rebalancer_mode: Option<String>,
}

/// Cached view of the whole cluster.
///
/// Only the reconciler produces values of this type; every change yields a
/// new value so readers holding an older one are never disturbed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub instances: Vec<Instance>,
    pub replica_sets: Vec<ReplicaSet>,
    pub failover: Option<FailoverParams>,
    pub issues: Vec<Issue>,
    pub suggestions: Option<Suggestions>,
    pub known_roles: Vec<Role>,
    pub server_stat: Vec<ServerStat>,
    pub cluster_self: Option<ClusterSelf>,
    pub vshard_groups: Vec<VshardGroup>,
}

impl TopologySnapshot {
    pub fn instance(&self, uuid: &str) -> Option<&Instance> {
        self.instances.iter().find(|instance| instance.uuid == uuid)
    }

    pub fn replica_set(&self, uuid: &str) -> Option<&ReplicaSet> {
        self.replica_sets.iter().find(|replica_set| replica_set.uuid == uuid)
    }
}
