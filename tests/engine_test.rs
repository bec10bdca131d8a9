use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::info;

use topology_sync::config::PollingConfig;
use topology_sync::control::{ControlPlane, Mutation, Query, ServerEdit};
use topology_sync::reconciler::{FailoverPatch, FailoverUpdate, SnapshotUpdate};
use topology_sync::types::{
    ClusterSelf, FailoverMode, FailoverParams, Instance, ReplicaSet, ServerStat, TopologySnapshot,
};
use topology_sync::{ClusterSync, SyncError, SyncEvent};

static TRACING: Once = Once::new();

fn setup_logging() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

#[derive(Default)]
struct Backend {
    topology: TopologySnapshot,
    fetches: Vec<Query>,
    mutations: Vec<Mutation>,
    network_down: bool,
    reject_mutations: Option<String>,
    fetch_delay: Duration,
}

/// In-memory control plane applying mutations to its own topology
#[derive(Default)]
struct MockControlPlane {
    backend: Mutex<Backend>,
}

impl MockControlPlane {
    fn with_topology(topology: TopologySnapshot) -> Arc<Self> {
        Arc::new(Self {
            backend: Mutex::new(Backend {
                topology,
                ..Default::default()
            }),
        })
    }

    fn fetches(&self) -> Vec<Query> {
        self.backend.lock().fetches.clone()
    }

    fn set_network_down(&self, down: bool) {
        self.backend.lock().network_down = down;
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn fetch(&self, query: Query) -> Result<SnapshotUpdate, SyncError> {
        let (delay, topology, down) = {
            let mut backend = self.backend.lock();
            backend.fetches.push(query);
            (backend.fetch_delay, backend.topology.clone(), backend.network_down)
        };
        if !delay.is_zero() {
            sleep(delay).await;
        }
        if down {
            return Err(SyncError::network("connection refused"));
        }

        let failover = topology.failover.clone().unwrap_or_default();
        Ok(match query {
            Query::ServerList { with_stats } => SnapshotUpdate {
                instances: Some(topology.instances),
                replica_sets: Some(topology.replica_sets),
                failover: Some(FailoverUpdate::Mode(failover.mode)),
                server_stat: with_stats.then_some(topology.server_stat),
                known_roles: with_stats.then_some(topology.known_roles),
                issues: with_stats.then_some(topology.issues),
                ..Default::default()
            },
            Query::Cluster => SnapshotUpdate {
                cluster_self: topology.cluster_self,
                failover: Some(FailoverUpdate::Full(failover)),
                vshard_groups: Some(topology.vshard_groups),
                ..Default::default()
            },
            Query::ServerStat => SnapshotUpdate {
                server_stat: Some(topology.server_stat),
                ..Default::default()
            },
        })
    }

    async fn mutate(&self, mutation: &Mutation) -> Result<(), SyncError> {
        let mut backend = self.backend.lock();
        backend.mutations.push(mutation.clone());
        if backend.network_down {
            return Err(SyncError::network("connection refused"));
        }
        if let Some(message) = &backend.reject_mutations {
            return Err(SyncError::application(message.clone()));
        }

        for patch in mutation.patches() {
            if let Some(next) = patch.apply(&backend.topology) {
                backend.topology = next;
            }
        }
        Ok(())
    }
}

fn server(uuid: &str, replicaset: &str, status: &str) -> Instance {
    let mut instance = Instance::new(uuid, format!("{}:3301", uuid), status);
    instance.alias = Some(format!("{}-alias", uuid));
    instance.replicaset_uuid = Some(replicaset.to_string());
    instance
}

fn stat(uuid: &str) -> ServerStat {
    ServerStat {
        uuid: uuid.to_string(),
        uri: format!("{}:3301", uuid),
        statistics: None,
    }
}

fn topology() -> TopologySnapshot {
    let i1 = server("i1", "r1", "healthy");
    let i2 = server("i2", "r1", "healthy");
    let mut r1 = ReplicaSet::new("r1", "rs-a", "healthy");
    r1.roles = vec!["storage".to_string()];
    r1.master_uuid = Some("i1".to_string());
    r1.active_master_uuid = Some("i1".to_string());
    r1.servers = vec![i1.clone(), i2.clone()];

    let mut r2 = ReplicaSet::new("r2", "rs-b", "healthy");
    r2.roles = vec!["router".to_string()];

    TopologySnapshot {
        instances: vec![i1, i2, Instance::new("i9", "spare:3301", "unconfigured")],
        replica_sets: vec![r1, r2],
        failover: Some(FailoverParams::default()),
        server_stat: vec![stat("i1"), stat("i2")],
        cluster_self: Some(ClusterSelf {
            uuid: Some("i1".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn polling(refresh_interval_ms: u64, stat_period: u64) -> PollingConfig {
    PollingConfig {
        refresh_interval_ms,
        stat_period,
        consistency_window_ms: 2000,
    }
}

fn drain(events: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn test_polling_populates_snapshot() {
    setup_logging();
    let control = MockControlPlane::with_topology(topology());
    let engine = ClusterSync::new(control.clone(), polling(1000, 10));
    let mut events = engine.subscribe_events();

    engine.start_polling();
    sleep(Duration::from_millis(10)).await;

    let snapshot = engine.snapshot().expect("snapshot after first tick");
    assert_eq!(snapshot.replica_sets.len(), 2);
    assert!(snapshot.cluster_self.as_ref().unwrap().is_configured());
    assert_eq!(
        control.fetches(),
        vec![Query::ServerList { with_stats: true }, Query::Cluster]
    );
    assert!(drain(&mut events).contains(&SyncEvent::SnapshotApplied));

    let storage = engine.filtered_replica_sets("role:storage");
    assert_eq!(storage.len(), 1);
    assert_eq!(storage[0].uuid(), "r1");
    assert_eq!(engine.filtered_unconfigured("spare").len(), 1);

    engine.stop_polling();
}

#[tokio::test(start_paused = true)]
async fn test_stats_requested_every_nth_tick() {
    let control = MockControlPlane::with_topology(topology());
    let engine = ClusterSync::new(control.clone(), polling(100, 3));

    engine.start_polling();
    sleep(Duration::from_millis(550)).await;
    engine.stop_polling();

    let list_flags: Vec<bool> = control
        .fetches()
        .into_iter()
        .filter_map(|query| match query {
            Query::ServerList { with_stats } => Some(with_stats),
            _ => None,
        })
        .collect();
    assert_eq!(list_flags, vec![true, false, false, true, false, false]);
    assert!(!control.fetches().contains(&Query::ServerStat));
}

#[tokio::test(start_paused = true)]
async fn test_missing_stats_fetched_between_stat_ticks() {
    let mut without_stats = topology();
    without_stats.server_stat = vec![stat("i1")];
    let control = MockControlPlane::with_topology(without_stats);
    let engine = ClusterSync::new(control.clone(), polling(100, 10));

    engine.start_polling();
    sleep(Duration::from_millis(150)).await;
    engine.stop_polling();

    assert_eq!(
        control.fetches(),
        vec![
            Query::ServerList { with_stats: true },
            Query::Cluster,
            Query::ServerList { with_stats: false },
            Query::ServerStat,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_optimistic_patch_then_confirming_refresh() {
    setup_logging();
    let control = MockControlPlane::with_topology(topology());
    let engine = ClusterSync::new(control.clone(), polling(60_000, 10));
    let mut events = engine.subscribe_events();

    engine.start_polling();
    sleep(Duration::from_millis(10)).await;
    let before = engine.snapshot().unwrap();
    let fetched = control.fetches().len();
    drain(&mut events);

    engine
        .change_failover(FailoverPatch::mode(FailoverMode::Stateful))
        .await
        .unwrap();

    // visible before any refresh
    let patched = engine.snapshot().unwrap();
    assert_eq!(patched.failover.as_ref().unwrap().mode, FailoverMode::Stateful);
    assert_eq!(before.failover.as_ref().unwrap().mode, FailoverMode::Disabled);
    assert_eq!(patched.replica_sets, before.replica_sets);
    assert_eq!(control.fetches().len(), fetched);

    let seen = drain(&mut events);
    assert!(seen.contains(&SyncEvent::MutationSucceeded {
        title: "Failover change".to_string(),
        message: "Done".to_string(),
    }));

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(control.fetches().len(), fetched);

    sleep(Duration::from_millis(1500)).await;
    assert!(control.fetches().len() > fetched);
    info!("Confirming refresh done");
    assert_eq!(
        engine.snapshot().unwrap().failover.as_ref().unwrap().mode,
        FailoverMode::Stateful
    );

    engine.stop_polling();
}

#[tokio::test(start_paused = true)]
async fn test_leader_promotion_and_server_edit() {
    let control = MockControlPlane::with_topology(topology());
    let engine = ClusterSync::new(control.clone(), polling(60_000, 10));

    engine.start_polling();
    sleep(Duration::from_millis(10)).await;

    engine.promote_leader("r1", "i2", false).await.unwrap();
    let snapshot = engine.snapshot().unwrap();
    assert!(snapshot.replica_set("r1").unwrap().is_active_master("i2"));

    engine
        .edit_servers(vec![ServerEdit::disable("i2", true)])
        .await
        .unwrap();
    let snapshot = engine.snapshot().unwrap();
    assert!(snapshot.instance("i2").unwrap().disabled);
    assert!(snapshot.replica_set("r1").unwrap().server("i2").unwrap().disabled);

    engine.stop_polling();
}

#[tokio::test(start_paused = true)]
async fn test_failed_mutation_leaves_snapshot_untouched() {
    let control = MockControlPlane::with_topology(topology());
    let engine = ClusterSync::new(control.clone(), polling(60_000, 10));
    let mut events = engine.subscribe_events();

    engine.start_polling();
    sleep(Duration::from_millis(10)).await;
    let before = engine.snapshot().unwrap();
    drain(&mut events);

    control.backend.lock().reject_mutations = Some("Replicaset not found".to_string());
    let err = engine
        .promote_leader("r1", "i2", false)
        .await
        .unwrap_err();

    assert!(!err.is_network_error());
    assert_eq!(control.backend.lock().mutations.len(), 1);
    assert!(Arc::ptr_eq(&before, &engine.snapshot().unwrap()));
    assert!(*engine.connectivity().borrow());
    assert_eq!(
        drain(&mut events),
        vec![SyncEvent::MutationFailed {
            title: "Leader promotion".to_string(),
            message: "Application error: Replicaset not found".to_string(),
        }]
    );

    engine.stop_polling();
}

#[tokio::test(start_paused = true)]
async fn test_network_failure_flips_connectivity() {
    let control = MockControlPlane::with_topology(topology());
    control.set_network_down(true);
    let engine = ClusterSync::new(control.clone(), polling(1000, 10));
    let mut events = engine.subscribe_events();
    let connectivity = engine.connectivity();

    engine.start_polling();
    sleep(Duration::from_millis(10)).await;

    assert!(!*connectivity.borrow());
    assert!(engine.is_polling());
    assert!(engine.snapshot().is_none());
    assert_eq!(
        drain(&mut events),
        vec![SyncEvent::ConnectivityChanged { online: false }]
    );

    control.set_network_down(false);
    assert!(engine.poll_now());
    sleep(Duration::from_millis(10)).await;

    assert!(*connectivity.borrow());
    assert!(engine.snapshot().is_some());
    assert!(drain(&mut events).contains(&SyncEvent::ConnectivityChanged { online: true }));

    engine.stop_polling();
}

#[tokio::test(start_paused = true)]
async fn test_cluster_section_retried_after_failed_first_tick() {
    let mut backend = topology();
    backend.failover = Some(FailoverParams {
        mode: FailoverMode::Stateful,
        failover_timeout: 3.0,
        ..Default::default()
    });
    let control = MockControlPlane::with_topology(backend.clone());
    control.set_network_down(true);
    let engine = ClusterSync::new(control.clone(), polling(100, 10));

    engine.start_polling();
    sleep(Duration::from_millis(10)).await;
    assert!(engine.snapshot().is_none());

    control.set_network_down(false);
    sleep(Duration::from_secs(1)).await;
    engine.stop_polling();

    let cluster_fetches = control
        .fetches()
        .into_iter()
        .filter(|query| *query == Query::Cluster)
        .count();
    assert_eq!(cluster_fetches, 1);
}

#[tokio::test(start_paused = true)]
async fn test_mode_only_refresh_does_not_invent_failover_params() {
    let mut backend = topology();
    backend.failover = Some(FailoverParams {
        mode: FailoverMode::Stateful,
        failover_timeout: 3.0,
        ..Default::default()
    });
    let control = MockControlPlane::with_topology(backend.clone());
    control.set_network_down(true);
    let engine = ClusterSync::new(control.clone(), polling(100, 10));

    engine.start_polling();
    sleep(Duration::from_millis(10)).await;
    control.set_network_down(false);
    assert!(engine.poll_now());
    sleep(Duration::from_millis(10)).await;

    let snapshot = engine.snapshot().expect("snapshot after recovery");
    assert_eq!(snapshot.failover, backend.failover);
    assert_eq!(snapshot.cluster_self, backend.cluster_self);

    let list_only = SnapshotUpdate {
        instances: Some(backend.instances.clone()),
        failover: Some(FailoverUpdate::Mode(FailoverMode::Stateful)),
        ..Default::default()
    };
    assert_eq!(list_only.merge_into(None).failover, None);

    engine.stop_polling();
}

#[tokio::test(start_paused = true)]
async fn test_refresh_restores_default_failover_values() {
    let mut backend = topology();
    backend.failover = Some(FailoverParams {
        mode: FailoverMode::Stateful,
        fencing_enabled: true,
        failover_timeout: 5.0,
        state_provider: Some("etcd2".to_string()),
        ..Default::default()
    });
    let control = MockControlPlane::with_topology(backend);
    let engine = ClusterSync::new(control.clone(), polling(60_000, 10));

    engine.start_polling();
    sleep(Duration::from_millis(10)).await;
    assert!(engine.snapshot().unwrap().failover.as_ref().unwrap().fencing_enabled);

    // another operator resets failover to its defaults
    let reset = FailoverParams {
        mode: FailoverMode::Eventual,
        ..Default::default()
    };
    control.backend.lock().topology.failover = Some(reset.clone());

    assert!(engine.refresh().await.unwrap());
    assert_eq!(engine.snapshot().unwrap().failover, Some(reset));

    engine.stop_polling();
}

#[tokio::test(start_paused = true)]
async fn test_late_result_after_stop_is_dropped() {
    let control = MockControlPlane::with_topology(topology());
    control.backend.lock().fetch_delay = Duration::from_millis(50);
    let engine = ClusterSync::new(control.clone(), polling(100, 10));

    engine.start_polling();
    sleep(Duration::from_millis(10)).await;
    engine.stop_polling();
    sleep(Duration::from_millis(500)).await;

    assert!(engine.snapshot().is_none());
    assert!(!engine.is_polling());
    // the pending tick finished, no new one started
    assert_eq!(control.fetches().len(), 2);

    engine.start_polling();
    sleep(Duration::from_millis(200)).await;
    assert!(engine.snapshot().is_some());
    engine.stop_polling();
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_refresh_keeps_index() {
    let control = MockControlPlane::with_topology(topology());
    let engine = ClusterSync::new(control.clone(), polling(100, 10));

    engine.start_polling();
    sleep(Duration::from_millis(10)).await;
    let first = engine.snapshot().unwrap();

    for query in ["r", "rs", "rs-", "rs-a", "rs-a status:healthy"] {
        engine.filtered_replica_sets(query);
        sleep(Duration::from_millis(100)).await;
    }

    assert!(Arc::ptr_eq(&first, &engine.snapshot().unwrap()));
    assert_eq!(engine.index_builds(), 1);
    engine.stop_polling();
}
