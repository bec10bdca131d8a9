use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::types::TopologySnapshot;

use super::filter::{FilteredInstanceView, FilteredReplicaSetView};

/// Search documents for every record of one snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchIndex {
    replica_sets: Vec<FilteredReplicaSetView>,
    unconfigured: Vec<FilteredInstanceView>,
}

impl SearchIndex {
    pub fn build(snapshot: &TopologySnapshot) -> Self {
        Self {
            replica_sets: snapshot
                .replica_sets
                .iter()
                .map(FilteredReplicaSetView::new)
                .collect(),
            unconfigured: snapshot
                .instances
                .iter()
                .filter(|instance| !instance.is_configured())
                .map(FilteredInstanceView::new)
                .collect(),
        }
    }

    pub fn replica_sets(&self) -> &[FilteredReplicaSetView] {
        &self.replica_sets
    }

    pub fn unconfigured(&self) -> &[FilteredInstanceView] {
        &self.unconfigured
    }
}

/// Keeps the index of the most recent snapshot.
///
/// Snapshots are compared by identity, so the index is rebuilt only when
/// the reconciler publishes a new value, never per query.
#[derive(Debug, Default)]
pub struct IndexCache {
    current: Mutex<Option<(Arc<TopologySnapshot>, Arc<SearchIndex>)>>,
    builds: AtomicU64,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, snapshot: &Arc<TopologySnapshot>) -> Arc<SearchIndex> {
        let mut current = self.current.lock();
        if let Some((cached, index)) = current.as_ref() {
            if Arc::ptr_eq(cached, snapshot) {
                return index.clone();
            }
        }

        let index = Arc::new(SearchIndex::build(snapshot));
        let builds = self.builds.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Rebuilt search index ({} replica sets, build #{})", index.replica_sets.len(), builds);
        *current = Some((snapshot.clone(), index.clone()));
        index
    }

    /// Number of index builds so far
    pub fn builds(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        *self.current.lock() = None;
    }
}
