//! Cluster Sync engine
//!
//! Wires the pieces together:
//! - a poller whose effect fetches from the control plane
//! - the snapshot store receiving every fetch result
//! - mutations, applied optimistically and confirmed by a delayed refresh
//! - events and a connectivity flag for whoever renders the dashboard

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{PollingConfig, SyncConfig};
use crate::control::{ControlPlane, GraphqlClient, Mutation, Query, ServerEdit};
use crate::error::SyncError;
use crate::poller::{PollInterval, Poller, Tick};
use crate::query::{
    filter_instances, filter_replica_sets, FilteredInstanceView, FilteredReplicaSetView, IndexCache,
};
use crate::reconciler::{
    FailoverPatch, SnapshotReceiver, SnapshotStore, SnapshotUpdate, ViewSession,
};
use crate::types::{FailoverParams, TopologySnapshot};

const EVENT_CAPACITY: usize = 64;

/// Notifications for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    SnapshotApplied,
    ConnectivityChanged { online: bool },
    MutationSucceeded { title: String, message: String },
    MutationFailed { title: String, message: String },
    RefreshFailed { message: String },
}

type SnapshotSource = Option<Arc<TopologySnapshot>>;

struct EngineInner {
    control: Arc<dyn ControlPlane>,
    store: SnapshotStore,
    index: IndexCache,
    events: broadcast::Sender<SyncEvent>,
    online: watch::Sender<bool>,
    polling: PollingConfig,
    /// Session that already received the cluster section
    cluster_loaded: Mutex<Option<ViewSession>>,
}

/// Some configured instance has no statistics entry yet
fn stats_missing(snapshot: &TopologySnapshot) -> bool {
    snapshot
        .instances
        .iter()
        .filter(|instance| instance.is_configured())
        .any(|instance| !snapshot.server_stat.iter().any(|stat| stat.uuid == instance.uuid))
}

impl EngineInner {
    fn emit(&self, event: SyncEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_online(&self, online: bool) {
        let changed = self.online.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            if online {
                info!("Control plane reachable again");
            } else {
                warn!("Control plane unreachable");
            }
            self.emit(SyncEvent::ConnectivityChanged { online });
        }
    }

    fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    async fn fetch(&self, query: Query) -> Result<SnapshotUpdate, SyncError> {
        match self.control.fetch(query).await {
            Ok(update) => {
                self.set_online(true);
                Ok(update)
            }
            Err(e) => {
                if e.is_network_error() {
                    self.set_online(false);
                } else {
                    self.emit(SyncEvent::RefreshFailed {
                        message: e.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    fn apply(&self, session: ViewSession, update: SnapshotUpdate) -> bool {
        let applied = self.store.apply_full_snapshot_in(session, update);
        if applied {
            self.emit(SyncEvent::SnapshotApplied);
        }
        applied
    }

    async fn poll(&self, tick: Tick<ViewSession, SnapshotSource>) -> Result<(), SyncError> {
        let with_stats = tick.counter % self.polling.stat_period.max(1) == 0;
        let mut update = self.fetch(Query::ServerList { with_stats }).await?;

        // retried on every tick until it succeeds once for this view
        let needs_cluster = *self.cluster_loaded.lock() != Some(tick.payload);
        if needs_cluster {
            update = update.overlay(self.fetch(Query::Cluster).await?);
        }
        let source_lacks_stats = tick.source.flatten().is_some_and(|s| stats_missing(&s));
        if !with_stats && source_lacks_stats {
            update = update.overlay(self.fetch(Query::ServerStat).await?);
        }

        self.apply(tick.payload, update);
        if needs_cluster {
            *self.cluster_loaded.lock() = Some(tick.payload);
        }
        Ok(())
    }

    /// Full refresh outside the poller
    async fn refresh(&self, session: ViewSession) -> Result<bool, SyncError> {
        let update = self
            .fetch(Query::ServerList { with_stats: true })
            .await?
            .overlay(self.fetch(Query::Cluster).await?);
        let applied = self.apply(session, update);
        *self.cluster_loaded.lock() = Some(session);
        Ok(applied)
    }
}

/// Engine handle owned by the dashboard
pub struct ClusterSync {
    inner: Arc<EngineInner>,
    poller: Poller<ViewSession, SnapshotSource>,
}

impl ClusterSync {
    pub fn new(control: Arc<dyn ControlPlane>, polling: PollingConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (online, _) = watch::channel(true);
        let inner = Arc::new(EngineInner {
            control,
            store: SnapshotStore::new(),
            index: IndexCache::new(),
            events,
            online,
            polling,
            cluster_loaded: Mutex::new(None),
        });

        // back off while the control plane is unreachable
        let interval = {
            let inner = Arc::downgrade(&inner);
            PollInterval::dynamic(move || match inner.upgrade() {
                Some(inner) if !inner.is_online() => inner.polling.refresh_interval() * 2,
                Some(inner) => inner.polling.refresh_interval(),
                None => Duration::ZERO,
            })
        };
        let effect_inner = inner.clone();
        let poller = Poller::with_source("cluster", interval, inner.store.subscribe(), move |tick| {
            let inner = effect_inner.clone();
            async move { inner.poll(tick).await }
        });

        Self { inner, poller }
    }

    /// Engine talking GraphQL to the configured control plane
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        let client = GraphqlClient::new(&config.control_plane)?;
        info!("Using control plane at {}", client.endpoint());
        Ok(Self::new(Arc::new(client), config.polling.clone()))
    }

    /// Open a fresh view session and start polling for it.
    pub fn start_polling(&self) -> ViewSession {
        let session = self.inner.store.open_view();
        self.inner.index.clear();
        self.poller.start(session);
        session
    }

    /// Stop polling and drop the snapshot along with its view session.
    pub fn stop_polling(&self) {
        self.poller.stop();
        self.inner.store.close_view();
        self.inner.index.clear();
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    /// Skip the rest of the current poll interval
    pub fn poll_now(&self) -> bool {
        self.poller.tick()
    }

    /// Fetch everything once and apply it to the current view
    pub async fn refresh(&self) -> Result<bool, SyncError> {
        let Some(session) = self.inner.store.current_session() else {
            debug!("Refresh requested with no open view");
            return Ok(false);
        };
        self.inner.refresh(session).await
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.inner.store
    }

    pub fn snapshot(&self) -> Option<Arc<TopologySnapshot>> {
        self.inner.store.snapshot()
    }

    pub fn subscribe_snapshots(&self) -> SnapshotReceiver {
        self.inner.store.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn connectivity(&self) -> watch::Receiver<bool> {
        self.inner.online.subscribe()
    }

    /// Replica sets of the current snapshot matching `query`
    pub fn filtered_replica_sets(&self, query: &str) -> Vec<FilteredReplicaSetView> {
        match self.snapshot() {
            Some(snapshot) => {
                let index = self.inner.index.get(&snapshot);
                filter_replica_sets(index.replica_sets(), query).into_owned()
            }
            None => Vec::new(),
        }
    }

    /// Unconfigured instances of the current snapshot matching `query`
    pub fn filtered_unconfigured(&self, query: &str) -> Vec<FilteredInstanceView> {
        match self.snapshot() {
            Some(snapshot) => {
                let index = self.inner.index.get(&snapshot);
                filter_instances(index.unconfigured(), query).into_owned()
            }
            None => Vec::new(),
        }
    }

    /// Number of search index builds so far
    pub fn index_builds(&self) -> u64 {
        self.inner.index.builds()
    }

    /// Submit a mutation. On success its patches are applied right away and
    /// a confirming refresh follows after the consistency window.
    pub async fn mutate(&self, mutation: Mutation) -> Result<(), SyncError> {
        let id = Uuid::new_v4();
        let title = mutation.title();
        let session = self.inner.store.current_session();
        info!(%id, "Submitting mutation: {}", title);

        if let Err(e) = self.inner.control.mutate(&mutation).await {
            error!(%id, "Mutation failed: {}: {}", title, e);
            if e.is_network_error() {
                self.inner.set_online(false);
            }
            self.inner.emit(SyncEvent::MutationFailed {
                title: title.to_string(),
                message: e.to_string(),
            });
            return Err(e);
        }

        self.inner.set_online(true);
        if let Some(session) = session {
            let mut patched = false;
            for patch in mutation.patches() {
                patched |= self.inner.store.apply_optimistic_patch_in(session, patch);
            }
            if patched {
                self.inner.emit(SyncEvent::SnapshotApplied);
            }
            self.schedule_refresh(session, id);
        }
        self.inner.emit(SyncEvent::MutationSucceeded {
            title: title.to_string(),
            message: "Done".to_string(),
        });
        Ok(())
    }

    fn schedule_refresh(&self, session: ViewSession, id: Uuid) {
        let inner = self.inner.clone();
        let window = inner.polling.consistency_window();
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            debug!(%id, "Refreshing after mutation");
            if let Err(e) = inner.refresh(session).await {
                warn!(%id, "Refresh after mutation failed: {}", e);
            }
        });
    }

    /// Overwrite the failover fields set in `patch`. A missing mode is taken
    /// from the current snapshot.
    pub async fn change_failover(&self, mut patch: FailoverPatch) -> Result<(), SyncError> {
        if patch.mode.is_none() {
            patch.mode = self
                .snapshot()
                .and_then(|snapshot| snapshot.failover.as_ref().map(|failover| failover.mode));
        }
        self.mutate(Mutation::ChangeFailover(patch)).await
    }

    /// Submit the fields of `params` that differ from the current ones.
    pub async fn set_failover_params(&self, params: &FailoverParams) -> Result<(), SyncError> {
        let current = self
            .snapshot()
            .and_then(|snapshot| snapshot.failover.clone())
            .unwrap_or_default();
        let mut patch = FailoverPatch::diff(&current, params);
        patch.mode = Some(params.mode);
        self.mutate(Mutation::ChangeFailover(patch)).await
    }

    pub async fn promote_leader(
        &self,
        replicaset_uuid: impl Into<String>,
        instance_uuid: impl Into<String>,
        force: bool,
    ) -> Result<(), SyncError> {
        self.mutate(Mutation::PromoteLeader {
            replicaset_uuid: replicaset_uuid.into(),
            instance_uuid: instance_uuid.into(),
            force,
        })
        .await
    }

    pub async fn edit_servers(&self, edits: Vec<ServerEdit>) -> Result<(), SyncError> {
        self.mutate(Mutation::EditServers(edits)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Instance, ServerStat};

    #[test]
    fn test_stats_missing() {
        let mut configured = Instance::new("i1", "u1", "healthy");
        configured.replicaset_uuid = Some("r1".to_string());
        let spare = Instance::new("i2", "u2", "unconfigured");

        let mut snapshot = TopologySnapshot {
            instances: vec![configured, spare],
            ..Default::default()
        };
        assert!(stats_missing(&snapshot));

        snapshot.server_stat = vec![ServerStat {
            uuid: "i1".to_string(),
            uri: "u1".to_string(),
            statistics: None,
        }];
        assert!(!stats_missing(&snapshot));
    }

    #[test]
    fn test_events_serialize_tagged() {
        let json = serde_json::to_value(SyncEvent::ConnectivityChanged { online: false }).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "connectivity_changed", "online": false }));
    }
}
