//! CLI Handler for topology-sync
//!
//! Provides command-line interface functionality for:
//! - Watching the cluster topology until interrupted
//! - Fetching a single snapshot as JSON

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::engine::{ClusterSync, SyncEvent};
use crate::error::SyncError;
use crate::query::{filter_instances, filter_snapshot, FilteredReplicaSetView, SearchIndex};
use crate::reconciler::selectors::{self, HealthCounts};
use crate::types::{Instance, ReplicaSet, TopologySnapshot};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Control plane endpoint, overrides the configuration
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Poll the cluster and log the filtered view on every change
    Watch {
        /// Search query, e.g. "role:storage status!:healthy"
        #[arg(short, long, default_value = "")]
        filter: String,
    },
    /// Fetch one snapshot and print it as JSON
    Once {
        #[arg(short, long, default_value = "")]
        filter: String,
    },
}

impl Cli {
    /// Configuration from `--config` or the default locations, with
    /// command-line overrides applied
    pub fn load_config(&self) -> Result<SyncConfig, SyncError> {
        let mut config = match &self.config {
            Some(path) => SyncConfig::load_from_file(path)?,
            None => SyncConfig::load()?,
        };
        if let Some(endpoint) = &self.endpoint {
            config.control_plane.endpoint = endpoint.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Output of `once`
#[derive(Debug, Serialize)]
pub struct SnapshotReport<'a> {
    pub health: HealthCounts,
    pub replica_sets: Vec<ReplicaSet>,
    pub unconfigured: Vec<&'a Instance>,
}

impl<'a> SnapshotReport<'a> {
    pub fn build(snapshot: &'a TopologySnapshot, filter: &str) -> Self {
        let index = SearchIndex::build(snapshot);
        let unconfigured = filter_instances(index.unconfigured(), filter)
            .iter()
            .filter_map(|view| snapshot.instance(&view.instance.uuid))
            .collect();

        Self {
            health: selectors::health_counts(snapshot),
            replica_sets: filter_snapshot(snapshot, filter)
                .into_iter()
                .map(|view| view.replica_set)
                .collect(),
            unconfigured,
        }
    }
}

/// One line per replica set
pub fn render_view(views: &[FilteredReplicaSetView]) -> String {
    views
        .iter()
        .map(|view| {
            let servers = match view.matching_servers_count {
                Some(matching) => format!("{}/{}", matching, view.total_servers_count()),
                None => view.total_servers_count().to_string(),
            };
            format!(
                "{} [{}] servers={} roles={}",
                view.replica_set.alias,
                view.replica_set.status,
                servers,
                view.replica_set.roles.join(",")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct CliHandler {
    engine: ClusterSync,
}

impl CliHandler {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        Ok(Self::with_engine(ClusterSync::from_config(config)?))
    }

    pub fn with_engine(engine: ClusterSync) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ClusterSync {
        &self.engine
    }

    /// Poll until `shutdown` resolves, logging the view on every snapshot.
    pub async fn watch(
        &self,
        filter: &str,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), SyncError> {
        let mut snapshots = self.engine.subscribe_snapshots();
        let mut events = self.engine.subscribe_events();
        self.engine.start_polling();
        info!("Watching cluster topology, filter {:?}", filter);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let views = self.engine.filtered_replica_sets(filter);
                    info!("{} replica sets match\n{}", views.len(), render_view(&views));
                }
                event = events.recv() => match event {
                    Ok(SyncEvent::ConnectivityChanged { online }) => {
                        info!("Connectivity: {}", if online { "online" } else { "offline" });
                    }
                    Ok(SyncEvent::RefreshFailed { message }) => warn!("Refresh failed: {}", message),
                    Ok(other) => debug!(?other, "Event"),
                    Err(RecvError::Lagged(skipped)) => debug!("Skipped {} events", skipped),
                    Err(RecvError::Closed) => break,
                },
            }
        }

        self.engine.stop_polling();
        info!("Stopped watching");
        Ok(())
    }

    /// Fetch once and return the report as pretty JSON.
    pub async fn once(&self, filter: &str) -> Result<String, SyncError> {
        self.engine.refresh().await?;
        let snapshot = self
            .engine
            .snapshot()
            .ok_or_else(|| SyncError::internal("No snapshot after refresh"))?;
        let report = SnapshotReport::build(&snapshot, filter);
        Ok(serde_json::to_string_pretty(&report)?)
    }
}
