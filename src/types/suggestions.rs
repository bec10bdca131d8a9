use serde::{Deserialize, Serialize};

/// Problem reported by the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub level: String,
    pub topic: String,
    pub message: String,
    #[serde(default)]
    pub replicaset_uuid: Option<String>,
    #[serde(default)]
    pub instance_uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefineUriSuggestion {
    pub uuid: String,
    pub uri_old: String,
    pub uri_new: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceApplySuggestion {
    pub uuid: String,
    #[serde(default)]
    pub config_mismatch: bool,
    #[serde(default)]
    pub config_locked: bool,
    #[serde(default)]
    pub operation_error: bool,
}

/// Actions the operator is advised to take. Each list holds instance uuids
/// or per-instance details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestions {
    #[serde(default)]
    pub refine_uri: Vec<RefineUriSuggestion>,
    #[serde(default)]
    pub force_apply: Vec<ForceApplySuggestion>,
    #[serde(default)]
    pub disable_servers: Vec<String>,
    #[serde(default)]
    pub restart_replication: Vec<String>,
}

impl Suggestions {
    pub fn is_empty(&self) -> bool {
        self.refine_uri.is_empty()
            && self.force_apply.is_empty()
            && self.disable_servers.is_empty()
            && self.restart_replication.is_empty()
    }
}
