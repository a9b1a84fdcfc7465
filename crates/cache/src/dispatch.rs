#[cfg(test)]
#[path = "tests/dispatch.rs"]
mod tests;

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, warn};
use xds_snapshot_config::BroadcastPolicy;
use xds_snapshot_primitives::node::Node;
use xds_snapshot_primitives::snapshot::{Snapshot, Version};

use crate::errors::CacheError;
use crate::metrics::{CacheMetrics, Outcome, REASON_ERROR};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("no snapshot found for node {node_id}")]
    NotFound { node_id: String },

    #[error("snapshot for node {node_id} was rejected: {reason}")]
    Rejected { node_id: String, reason: String },
}

/// Per-node snapshot slots and the push that follows an assignment.
///
/// Implementations own the wire side: once `set_snapshot` returns, responding
/// to the node's open watches is their concern.
pub trait SnapshotStore: Send + Sync {
    fn get_snapshot(&self, node_id: &str) -> Result<Arc<Snapshot>, StoreError>;

    fn set_snapshot(&self, node_id: &str, snapshot: Arc<Snapshot>) -> Result<(), StoreError>;
}

impl<T: SnapshotStore + ?Sized> SnapshotStore for Arc<T> {
    fn get_snapshot(&self, node_id: &str) -> Result<Arc<Snapshot>, StoreError> {
        (**self).get_snapshot(node_id)
    }

    fn set_snapshot(&self, node_id: &str, snapshot: Arc<Snapshot>) -> Result<(), StoreError> {
        (**self).set_snapshot(node_id, snapshot)
    }
}

/// In-process per-node slots, for embedders whose dispatch reads them back.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: DashMap<String, Arc<Snapshot>>,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn get_snapshot(&self, node_id: &str) -> Result<Arc<Snapshot>, StoreError> {
        self.snapshots
            .get(node_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StoreError::NotFound {
                node_id: node_id.to_owned(),
            })
    }

    fn set_snapshot(&self, node_id: &str, snapshot: Arc<Snapshot>) -> Result<(), StoreError> {
        drop(self.snapshots.insert(node_id.to_owned(), snapshot));
        Ok(())
    }
}

/// Result of making sure a node has a snapshot of its own.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Assignment {
    /// The node's group has no snapshot yet; nothing to assign.
    NoGroupSnapshot,
    /// The node already had a snapshot.
    AlreadyAssigned,
    /// The group's snapshot was assigned to the node.
    Assigned(Version),
    /// The request arrived on a stream that is not open, for instance after
    /// its close was handled. Nothing was bound or assigned.
    StreamNotRegistered,
}

/// Outcome of pushing one snapshot to the members of a group.
#[derive(Debug, Default)]
pub(crate) struct BroadcastReport {
    pub(crate) assigned: Vec<String>,
    pub(crate) failed: Vec<(String, StoreError)>,
}

impl BroadcastReport {
    /// Surfaces the first failed assignment, if any.
    pub(crate) fn into_result(self) -> Result<(), CacheError> {
        match self.failed.into_iter().next() {
            Some((node_id, source)) => Err(CacheError::SnapshotAssignment { node_id, source }),
            None => Ok(()),
        }
    }
}

/// Assigns snapshots to individual nodes through a [`SnapshotStore`].
#[derive(Debug)]
pub(crate) struct NodeSnapshotDispatcher<S> {
    store: S,
    policy: BroadcastPolicy,
}

impl<S: SnapshotStore> NodeSnapshotDispatcher<S> {
    pub(crate) const fn new(store: S, policy: BroadcastPolicy) -> Self {
        Self { store, policy }
    }

    pub(crate) const fn store(&self) -> &S {
        &self.store
    }

    /// Gives `node` the group snapshot unless it already has one.
    ///
    /// Any failure to read the node's slot is treated as "no snapshot yet".
    pub(crate) fn ensure_assigned(
        &self,
        node: &Node,
        group_snapshot: Option<&Arc<Snapshot>>,
    ) -> Result<Assignment, CacheError> {
        let Some(snapshot) = group_snapshot else {
            return Ok(Assignment::NoGroupSnapshot);
        };

        if self.store.get_snapshot(&node.id).is_ok() {
            return Ok(Assignment::AlreadyAssigned);
        }

        self.store
            .set_snapshot(&node.id, Arc::clone(snapshot))
            .map_err(|source| CacheError::SnapshotAssignment {
                node_id: node.id.clone(),
                source,
            })?;

        debug!(
            node_id = %node.id,
            group = %node.group,
            version = %snapshot.version(),
            "Assigned group snapshot to node"
        );

        Ok(Assignment::Assigned(snapshot.version().clone()))
    }

    /// Assigns `snapshot` to every node in `node_ids`, following the
    /// configured [`BroadcastPolicy`] when an assignment fails.
    pub(crate) fn broadcast<I>(
        &self,
        snapshot: &Arc<Snapshot>,
        node_ids: I,
        metrics: &dyn CacheMetrics,
    ) -> BroadcastReport
    where
        I: IntoIterator<Item = String>,
    {
        let mut report = BroadcastReport::default();

        for node_id in node_ids {
            debug!(%node_id, version = %snapshot.version(), "Generating a snapshot with node");

            match self.store.set_snapshot(&node_id, Arc::clone(snapshot)) {
                Ok(()) => {
                    metrics.record_snapshot_update(&node_id, Outcome::Success);
                    report.assigned.push(node_id);
                }
                Err(err) => {
                    warn!(
                        %node_id,
                        version = %snapshot.version(),
                        %err,
                        "Failed to assign snapshot to node"
                    );
                    metrics.record_snapshot_update(
                        &node_id,
                        Outcome::Failure {
                            reason: REASON_ERROR,
                        },
                    );
                    report.failed.push((node_id, err));

                    if self.policy == BroadcastPolicy::FailFast {
                        break;
                    }
                }
            }
        }

        report
    }
}
