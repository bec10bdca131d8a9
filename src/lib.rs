pub mod cli;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod logging;
pub mod poller;
pub mod query;
pub mod reconciler;
pub mod types;

// Re-export common types
pub use config::SyncConfig;
pub use control::{ControlPlane, GraphqlClient, Mutation, Query, ServerEdit};
pub use engine::{ClusterSync, SyncEvent};
pub use error::{Result, SyncError};
pub use poller::{PollInterval, Poller, Tick};
pub use query::{filter_replica_sets, filter_snapshot, FilteredReplicaSetView, SearchQuery};
pub use reconciler::{
    FailoverPatch, FailoverUpdate, InstancePatch, SnapshotPatch, SnapshotStore, SnapshotUpdate,
    ViewSession,
};
pub use types::TopologySnapshot;
