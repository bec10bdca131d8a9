//! Control Plane
//!
//! The remote cluster API, reached through two verbs:
//! - `fetch`: read-only queries feeding the reconciler
//! - `mutate`: operator actions whose success yields optimistic patches
//!
//! Errors distinguish transport failures ([`SyncError::Network`]) from error
//! responses ([`SyncError::Application`]).

pub mod graphql;

pub use graphql::GraphqlClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SyncError;
use crate::reconciler::{FailoverPatch, InstancePatch, SnapshotPatch, SnapshotUpdate};
use crate::types::Label;

/// Read-only queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    /// Instances, replica sets and the failover mode; with statistics, known
    /// roles, issues and suggestions on top
    ServerList { with_stats: bool },
    /// The serving instance, full failover parameters, roles and vshard groups
    Cluster,
    /// Memory statistics alone
    ServerStat,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::ServerList { with_stats: true } => write!(f, "serverList(withStats)"),
            Query::ServerList { with_stats: false } => write!(f, "serverList"),
            Query::Cluster => write!(f, "getCluster"),
            Query::ServerStat => write!(f, "serverStat"),
        }
    }
}

/// Per-instance topology edit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerEdit {
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<Label>>,
}

impl ServerEdit {
    pub fn disable(uuid: impl Into<String>, disabled: bool) -> Self {
        Self {
            uuid: uuid.into(),
            disabled: Some(disabled),
            ..Default::default()
        }
    }

    fn patch(&self) -> SnapshotPatch {
        SnapshotPatch::Instance {
            uuid: self.uuid.clone(),
            patch: InstancePatch {
                disabled: self.disabled,
                alias: None,
                zone: self.zone.clone(),
                labels: self.labels.clone(),
            },
        }
    }
}

/// Operator actions
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    ChangeFailover(FailoverPatch),
    PromoteLeader {
        replicaset_uuid: String,
        instance_uuid: String,
        force: bool,
    },
    EditServers(Vec<ServerEdit>),
}

impl Mutation {
    /// Short label used in notifications
    pub fn title(&self) -> &'static str {
        match self {
            Mutation::ChangeFailover(_) => "Failover change",
            Mutation::PromoteLeader { .. } => "Leader promotion",
            Mutation::EditServers(_) => "Server edit",
        }
    }

    /// Local edits implied by the mutation having succeeded
    pub fn patches(&self) -> Vec<SnapshotPatch> {
        match self {
            Mutation::ChangeFailover(patch) if patch.is_empty() => Vec::new(),
            Mutation::ChangeFailover(patch) => vec![SnapshotPatch::Failover(patch.clone())],
            Mutation::PromoteLeader {
                replicaset_uuid,
                instance_uuid,
                ..
            } => vec![SnapshotPatch::Leader {
                replicaset_uuid: replicaset_uuid.clone(),
                instance_uuid: instance_uuid.clone(),
            }],
            Mutation::EditServers(edits) => edits.iter().map(ServerEdit::patch).collect(),
        }
    }
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn fetch(&self, query: Query) -> Result<SnapshotUpdate, SyncError>;

    async fn mutate(&self, mutation: &Mutation) -> Result<(), SyncError>;
}
