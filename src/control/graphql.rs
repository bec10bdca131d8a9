use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{ControlPlane, Mutation, Query};
use crate::config::ControlPlaneConfig;
use crate::error::SyncError;
use crate::reconciler::{FailoverUpdate, SnapshotUpdate};
use crate::types::{
    ClusterSelf, FailoverMode, FailoverParams, ForceApplySuggestion, Instance, Issue, Label,
    RefineUriSuggestion, ReplicaSet, Role, ServerStat, Suggestions, VshardGroup,
};

const SERVER_FIELDS: &str = r#"
    uuid
    alias
    disabled
    electable
    uri
    zone
    status
    message
    labels { name value }
    boxinfo { general { ro } }
    replicaset { uuid }
"#;

const SERVER_STAT_FIELDS: &str = r#"
    uuid
    uri
    statistics {
        quota_size
        quota_used
        arena_size
        arena_used
        buckets_count: vshard_buckets_count
        quota_used_ratio
        arena_used_ratio
        items_used_ratio
    }
"#;

const ROLE_FIELDS: &str = "name dependencies implies_storage implies_router";

fn server_list_query() -> String {
    format!(
        r#"query serverList($withStats: Boolean!) {{
            failover: cluster {{ failover_params {{ mode }} }}
            serverList: servers {{ {SERVER_FIELDS} }}
            replicasetList: replicasets {{
                uuid
                alias
                all_rw
                status
                roles
                vshard_group
                weight
                master {{ uuid }}
                active_master {{ uuid }}
                servers {{ {SERVER_FIELDS} }}
            }}
            serverStat: servers @include(if: $withStats) {{ {SERVER_STAT_FIELDS} }}
            cluster @include(if: $withStats) {{
                known_roles {{ {ROLE_FIELDS} }}
                suggestions {{
                    disable_servers {{ uuid }}
                    restart_replication {{ uuid }}
                    force_apply {{ uuid config_mismatch config_locked operation_error }}
                    refine_uri {{ uuid uri_old uri_new }}
                }}
                issues {{ level topic message replicaset_uuid instance_uuid }}
            }}
        }}"#
    )
}

fn cluster_query() -> String {
    format!(
        r#"query getCluster {{
            cluster {{
                cluster_self: self {{ app_name instance_name uri uuid demo_uri }}
                failover_params {{
                    mode
                    state_provider
                    failover_timeout
                    fencing_enabled
                    fencing_timeout
                    fencing_pause
                    leader_autoreturn
                    autoreturn_delay
                    check_cookie_hash
                    etcd2_params {{ endpoints prefix lock_delay username password }}
                    tarantool_params {{ uri password }}
                }}
                known_roles {{ {ROLE_FIELDS} }}
                vshard_groups {{ name bucket_count bootstrapped rebalancer_mode }}
            }}
        }}"#
    )
}

fn server_stat_query() -> String {
    format!("query serverStat {{ serverStat: servers {{ {SERVER_STAT_FIELDS} }} }}")
}

const CHANGE_FAILOVER_MUTATION: &str = r#"mutation changeFailover(
    $mode: String!
    $state_provider: String
    $failover_timeout: Float
    $fencing_enabled: Boolean
    $fencing_timeout: Float
    $fencing_pause: Float
    $leader_autoreturn: Boolean
    $autoreturn_delay: Float
    $check_cookie_hash: Boolean
    $etcd2_params: FailoverStateProviderCfgInputEtcd2
    $tarantool_params: FailoverStateProviderCfgInputTarantool
) {
    cluster {
        failover_params(
            mode: $mode
            state_provider: $state_provider
            failover_timeout: $failover_timeout
            fencing_enabled: $fencing_enabled
            fencing_timeout: $fencing_timeout
            fencing_pause: $fencing_pause
            leader_autoreturn: $leader_autoreturn
            autoreturn_delay: $autoreturn_delay
            check_cookie_hash: $check_cookie_hash
            etcd2_params: $etcd2_params
            tarantool_params: $tarantool_params
        ) { mode }
    }
}"#;

const PROMOTE_LEADER_MUTATION: &str = r#"mutation promoteFailoverLeader(
    $replicaset_uuid: String!
    $instance_uuid: String!
    $force_inconsistency: Boolean
) {
    cluster {
        failover_promote(
            replicaset_uuid: $replicaset_uuid
            instance_uuid: $instance_uuid
            force_inconsistency: $force_inconsistency
        )
    }
}"#;

const EDIT_TOPOLOGY_MUTATION: &str = r#"mutation editTopology($servers: [EditServerInput!]) {
    cluster {
        edit_topology(servers: $servers) { servers { uuid } }
    }
}"#;

/// Request body of a GraphQL call
#[derive(Debug, Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

impl<T> GraphqlResponse<T> {
    fn into_data(self) -> Result<T, SyncError> {
        if !self.errors.is_empty() {
            let messages: Vec<String> = self.errors.into_iter().map(|e| e.message).collect();
            return Err(SyncError::application(messages.join("; ")));
        }
        self.data
            .ok_or_else(|| SyncError::application("Response carries no data"))
    }
}

#[derive(Debug, Deserialize)]
struct WireUuid {
    uuid: String,
}

#[derive(Debug, Deserialize)]
struct WireBoxGeneral {
    #[serde(default)]
    ro: bool,
}

#[derive(Debug, Deserialize)]
struct WireBoxInfo {
    general: WireBoxGeneral,
}

#[derive(Debug, Deserialize)]
struct WireServer {
    uuid: String,
    uri: String,
    status: String,
    alias: Option<String>,
    disabled: Option<bool>,
    electable: Option<bool>,
    zone: Option<String>,
    message: Option<String>,
    labels: Option<Vec<Option<Label>>>,
    boxinfo: Option<WireBoxInfo>,
    replicaset: Option<WireUuid>,
}

impl WireServer {
    fn into_instance(self, replicaset_uuid: Option<String>) -> Instance {
        Instance {
            read_only: self.boxinfo.is_some_and(|info| info.general.ro),
            replicaset_uuid: replicaset_uuid.or(self.replicaset.map(|rs| rs.uuid)),
            uuid: self.uuid,
            uri: self.uri,
            alias: self.alias.filter(|alias| !alias.is_empty()),
            status: self.status,
            message: self.message.filter(|message| !message.is_empty()),
            disabled: self.disabled.unwrap_or(false),
            electable: self.electable.unwrap_or(true),
            labels: self.labels.unwrap_or_default().into_iter().flatten().collect(),
            zone: self.zone.filter(|zone| !zone.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireReplicaSet {
    uuid: String,
    status: String,
    alias: Option<String>,
    all_rw: Option<bool>,
    roles: Option<Vec<String>>,
    vshard_group: Option<String>,
    weight: Option<f64>,
    master: Option<WireUuid>,
    active_master: Option<WireUuid>,
    #[serde(default)]
    servers: Vec<WireServer>,
}

impl From<WireReplicaSet> for ReplicaSet {
    fn from(wire: WireReplicaSet) -> Self {
        let servers = wire
            .servers
            .into_iter()
            .map(|server| server.into_instance(Some(wire.uuid.clone())))
            .collect();
        ReplicaSet {
            alias: wire.alias.unwrap_or_default(),
            status: wire.status,
            roles: wire.roles.unwrap_or_default(),
            master_uuid: wire.master.map(|m| m.uuid),
            active_master_uuid: wire.active_master.map(|m| m.uuid),
            weight: wire.weight,
            vshard_group: wire.vshard_group,
            all_rw: wire.all_rw.unwrap_or(false),
            servers,
            uuid: wire.uuid,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireFailoverMode {
    mode: FailoverMode,
}

#[derive(Debug, Deserialize)]
struct WireFailover {
    failover_params: WireFailoverMode,
}

#[derive(Debug, Default, Deserialize)]
struct WireSuggestions {
    refine_uri: Option<Vec<RefineUriSuggestion>>,
    force_apply: Option<Vec<ForceApplySuggestion>>,
    disable_servers: Option<Vec<WireUuid>>,
    restart_replication: Option<Vec<WireUuid>>,
}

impl From<WireSuggestions> for Suggestions {
    fn from(wire: WireSuggestions) -> Self {
        let uuids = |list: Option<Vec<WireUuid>>| {
            list.unwrap_or_default()
                .into_iter()
                .map(|item| item.uuid)
                .collect()
        };
        Suggestions {
            refine_uri: wire.refine_uri.unwrap_or_default(),
            force_apply: wire.force_apply.unwrap_or_default(),
            disable_servers: uuids(wire.disable_servers),
            restart_replication: uuids(wire.restart_replication),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireStatsCluster {
    #[serde(default)]
    known_roles: Vec<Role>,
    suggestions: Option<WireSuggestions>,
    #[serde(default)]
    issues: Vec<Issue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerListData {
    failover: Option<WireFailover>,
    #[serde(default)]
    server_list: Vec<WireServer>,
    #[serde(default)]
    replicaset_list: Vec<WireReplicaSet>,
    server_stat: Option<Vec<ServerStat>>,
    cluster: Option<WireStatsCluster>,
}

impl From<ServerListData> for SnapshotUpdate {
    fn from(data: ServerListData) -> Self {
        let (known_roles, issues, suggestions) = match data.cluster {
            Some(cluster) => (
                Some(cluster.known_roles),
                Some(cluster.issues),
                Some(cluster.suggestions.unwrap_or_default().into()),
            ),
            None => (None, None, None),
        };

        SnapshotUpdate {
            instances: Some(
                data.server_list
                    .into_iter()
                    .map(|server| server.into_instance(None))
                    .collect(),
            ),
            replica_sets: Some(data.replicaset_list.into_iter().map(ReplicaSet::from).collect()),
            failover: data
                .failover
                .map(|failover| FailoverUpdate::Mode(failover.failover_params.mode)),
            server_stat: data.server_stat,
            known_roles,
            issues,
            suggestions,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireCluster {
    cluster_self: Option<ClusterSelf>,
    failover_params: Option<FailoverParams>,
    #[serde(default)]
    known_roles: Vec<Role>,
    #[serde(default)]
    vshard_groups: Vec<VshardGroup>,
}

#[derive(Debug, Deserialize)]
struct ClusterData {
    cluster: WireCluster,
}

impl From<ClusterData> for SnapshotUpdate {
    fn from(data: ClusterData) -> Self {
        let cluster = data.cluster;
        SnapshotUpdate {
            cluster_self: cluster.cluster_self,
            failover: cluster.failover_params.map(FailoverUpdate::Full),
            known_roles: Some(cluster.known_roles),
            vshard_groups: Some(cluster.vshard_groups),
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerStatData {
    #[serde(default)]
    server_stat: Vec<ServerStat>,
}

/// GraphQL-over-HTTP client for the cluster admin API
#[derive(Debug, Clone)]
pub struct GraphqlClient {
    endpoint: String,
    client: Client,
}

impl GraphqlClient {
    pub fn new(config: &ControlPlaneConfig) -> Result<Self, SyncError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| SyncError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, SyncError> {
        debug!("POST {} variables={}", self.endpoint, variables);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&GraphqlRequest { query, variables })
            .send()
            .await
            .map_err(|e| SyncError::network(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response".to_string());
            warn!("Control plane answered {}: {}", status, text);
            return Err(SyncError::network(format!("Request failed ({}): {}", status, text)));
        }

        let body: GraphqlResponse<T> = response.json().await?;
        body.into_data()
    }
}

#[async_trait]
impl ControlPlane for GraphqlClient {
    async fn fetch(&self, query: Query) -> Result<SnapshotUpdate, SyncError> {
        match query {
            Query::ServerList { with_stats } => {
                let data: ServerListData = self
                    .call(&server_list_query(), json!({ "withStats": with_stats }))
                    .await?;
                Ok(data.into())
            }
            Query::Cluster => {
                let data: ClusterData = self.call(&cluster_query(), json!({})).await?;
                Ok(data.into())
            }
            Query::ServerStat => {
                let data: ServerStatData = self.call(&server_stat_query(), json!({})).await?;
                Ok(SnapshotUpdate {
                    server_stat: Some(data.server_stat),
                    ..Default::default()
                })
            }
        }
    }

    async fn mutate(&self, mutation: &Mutation) -> Result<(), SyncError> {
        let (query, variables) = match mutation {
            Mutation::ChangeFailover(patch) => {
                if patch.mode.is_none() {
                    return Err(SyncError::application("Failover mode is required"));
                }
                (CHANGE_FAILOVER_MUTATION, serde_json::to_value(patch)?)
            }
            Mutation::PromoteLeader {
                replicaset_uuid,
                instance_uuid,
                force,
            } => (
                PROMOTE_LEADER_MUTATION,
                json!({
                    "replicaset_uuid": replicaset_uuid,
                    "instance_uuid": instance_uuid,
                    "force_inconsistency": force,
                }),
            ),
            Mutation::EditServers(edits) => {
                (EDIT_TOPOLOGY_MUTATION, json!({ "servers": edits }))
            }
        };

        let _: serde_json::Value = self.call(query, variables).await?;
        Ok(())
    }
}
