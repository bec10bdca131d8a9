use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailoverMode {
    Disabled,
    Eventual,
    Stateful,
    Raft,
}

impl fmt::Display for FailoverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailoverMode::Disabled => write!(f, "disabled"),
            FailoverMode::Eventual => write!(f, "eventual"),
            FailoverMode::Stateful => write!(f, "stateful"),
            FailoverMode::Raft => write!(f, "raft"),
        }
    }
}

impl FromStr for FailoverMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(FailoverMode::Disabled),
            "eventual" => Ok(FailoverMode::Eventual),
            "stateful" => Ok(FailoverMode::Stateful),
            "raft" => Ok(FailoverMode::Raft),
            other => Err(SyncError::application(format!("unknown failover mode: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Etcd2Params {
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub lock_delay: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TarantoolParams {
    pub uri: String,
    #[serde(default)]
    pub password: String,
}

/// Cluster-wide failover configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverParams {
    pub mode: FailoverMode,
    pub failover_timeout: f64,
    pub fencing_enabled: bool,
    pub fencing_timeout: f64,
    pub fencing_pause: f64,
    #[serde(default)]
    pub leader_autoreturn: bool,
    #[serde(default)]
    pub autoreturn_delay: f64,
    #[serde(default)]
    pub check_cookie_hash: bool,
    #[serde(default)]
    pub state_provider: Option<String>,
    #[serde(default)]
    pub etcd2_params: Option<Etcd2Params>,
    #[serde(default)]
    pub tarantool_params: Option<TarantoolParams>,
}

impl Default for FailoverParams {
    fn default() -> Self {
        Self {
            mode: FailoverMode::Disabled,
            failover_timeout: 20.0,
            fencing_enabled: false,
            fencing_timeout: 10.0,
            fencing_pause: 2.0,
            leader_autoreturn: false,
            autoreturn_delay: 300.0,
            check_cookie_hash: true,
            state_provider: None,
            etcd2_params: None,
            tarantool_params: None,
        }
    }
}
