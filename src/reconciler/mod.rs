//! Snapshot Reconciler
//!
//! Owns the single authoritative [`TopologySnapshot`] and applies two kinds
//! of updates to it:
//! - full refreshes, overlaid onto the previous snapshot section by section
//! - optimistic patches, applied right after a mutation succeeds
//!
//! Every change publishes a new `Arc`; readers holding an older snapshot are
//! never disturbed. Updates are gated by the view session that requested them.

pub mod patch;
pub mod selectors;

pub use patch::{FailoverPatch, FailoverUpdate, InstancePatch, SnapshotPatch, SnapshotUpdate};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::types::TopologySnapshot;

/// Token of one opened dashboard view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewSession(u64);

impl ViewSession {
    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct ViewState {
    open: bool,
    session: u64,
    last_applied: Option<DateTime<Utc>>,
}

impl ViewState {
    fn accepts(&self, session: Option<ViewSession>) -> bool {
        match session {
            Some(ViewSession(id)) => self.open && id == self.session,
            None => self.open,
        }
    }
}

pub type SnapshotReceiver = watch::Receiver<Option<Arc<TopologySnapshot>>>;

#[derive(Debug)]
pub struct SnapshotStore {
    view: Mutex<ViewState>,
    tx: watch::Sender<Option<Arc<TopologySnapshot>>>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    /// Store with a view already open
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            view: Mutex::new(ViewState {
                open: true,
                session: 1,
                last_applied: None,
            }),
            tx,
        }
    }

    /// Begin a new view session. Results tagged with an earlier session
    /// are dropped from now on.
    pub fn open_view(&self) -> ViewSession {
        let mut view = self.view.lock();
        view.open = true;
        view.session += 1;
        debug!("Opened view session {}", view.session);
        ViewSession(view.session)
    }

    /// Drop the snapshot. Nothing is applied until the next `open_view`.
    pub fn close_view(&self) {
        let mut view = self.view.lock();
        view.open = false;
        view.last_applied = None;
        self.tx.send_replace(None);
        info!("Closed view session {}, snapshot reset", view.session);
    }

    pub fn is_view_open(&self) -> bool {
        self.view.lock().open
    }

    pub fn current_session(&self) -> Option<ViewSession> {
        let view = self.view.lock();
        view.open.then_some(ViewSession(view.session))
    }

    pub fn snapshot(&self) -> Option<Arc<TopologySnapshot>> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> SnapshotReceiver {
        self.tx.subscribe()
    }

    /// When the last full refresh was applied
    pub fn last_applied(&self) -> Option<DateTime<Utc>> {
        self.view.lock().last_applied
    }

    /// Merge a fetch result into the snapshot. Returns `false` when the
    /// view is closed.
    pub fn apply_full_snapshot(&self, update: SnapshotUpdate) -> bool {
        self.apply_full(None, update)
    }

    pub fn apply_full_snapshot_in(&self, session: ViewSession, update: SnapshotUpdate) -> bool {
        self.apply_full(Some(session), update)
    }

    fn apply_full(&self, session: Option<ViewSession>, update: SnapshotUpdate) -> bool {
        let mut view = self.view.lock();
        if !view.accepts(session) {
            debug!(?session, "Dropping refresh for an inactive view");
            return false;
        }

        let changed = self.tx.send_if_modified(|current| {
            let next = update.merge_into(current.as_deref());
            if current.as_deref() == Some(&next) {
                return false;
            }
            *current = Some(Arc::new(next));
            true
        });
        view.last_applied = Some(Utc::now());
        debug!(changed, "Applied full refresh");
        true
    }

    /// Apply a local edit on top of the current snapshot. Returns `false`
    /// when the view is closed or there is nothing to patch.
    pub fn apply_optimistic_patch(&self, patch: SnapshotPatch) -> bool {
        self.apply_patch(None, patch)
    }

    pub fn apply_optimistic_patch_in(&self, session: ViewSession, patch: SnapshotPatch) -> bool {
        self.apply_patch(Some(session), patch)
    }

    fn apply_patch(&self, session: Option<ViewSession>, patch: SnapshotPatch) -> bool {
        let view = self.view.lock();
        if !view.accepts(session) {
            debug!(?session, "Dropping patch for an inactive view");
            return false;
        }

        let applied = self.tx.send_if_modified(|current| {
            let Some(next) = current.as_deref().and_then(|snapshot| patch.apply(snapshot)) else {
                return false;
            };
            *current = Some(Arc::new(next));
            true
        });
        drop(view);

        if !applied {
            debug!(?patch, "Optimistic patch had no base, skipped");
        }
        applied
    }
}
