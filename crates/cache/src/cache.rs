#[cfg(test)]
#[path = "tests/cache.rs"]
mod tests;

use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};
use xds_snapshot_config::{CacheConfig, ReopenPolicy};
use xds_snapshot_primitives::discovery::DiscoveryMessage;
use xds_snapshot_primitives::node::Node;
use xds_snapshot_primitives::snapshot::{ResourceTable, Snapshot, Version};
use xds_snapshot_primitives::stream::{StreamId, StreamKind};

use crate::correlator::RequestCorrelator;
use crate::dispatch::{
    Assignment, MemorySnapshotStore, NodeSnapshotDispatcher, SnapshotStore, StoreError,
};
use crate::errors::CacheError;
use crate::groups::GroupSnapshotStore;
use crate::metrics::{CacheMetrics, NoopCacheMetrics, Outcome, RequestPhase, REASON_ERROR};
use crate::registry::StreamRegistry;
use crate::version::SnapshotVersioner;

/// Snapshot cache that keeps per-node snapshots in step with the latest
/// snapshot of each node's group.
///
/// Group snapshots, the version counter and the stream registry share one
/// lock. Every mutation takes it exclusively; response hooks only read node
/// bindings and take it shared. Delta request timing lives outside that lock.
#[derive(Debug)]
pub struct SnapshotCache<S = MemorySnapshotStore> {
    state: RwLock<CacheState>,
    dispatcher: NodeSnapshotDispatcher<S>,
    pub(crate) correlator: RequestCorrelator,
    pub(crate) metrics: Arc<dyn CacheMetrics>,
    reopen: ReopenPolicy,
}

#[derive(Debug, Default)]
struct CacheState {
    versioner: SnapshotVersioner,
    groups: GroupSnapshotStore,
    streams: StreamRegistry,
}

/// What request handling learned, for the hook's summary log line.
#[derive(Debug)]
pub(crate) struct RequestSummary {
    pub(crate) node_id: String,
    pub(crate) node_version: String,
    pub(crate) assignment: Assignment,
    pub(crate) error_code: i32,
    pub(crate) error_message: String,
    pub(crate) lock_duration: Duration,
    pub(crate) finish_duration: Duration,
}

impl SnapshotCache {
    /// Cache backed by an in-memory per-node store, without metrics.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_store(config, MemorySnapshotStore::new(), Arc::new(NoopCacheMetrics))
    }
}

impl<S: SnapshotStore> SnapshotCache<S> {
    pub fn with_store(config: &CacheConfig, store: S, metrics: Arc<dyn CacheMetrics>) -> Self {
        Self {
            state: RwLock::default(),
            dispatcher: NodeSnapshotDispatcher::new(store, config.broadcast),
            correlator: RequestCorrelator::default(),
            metrics,
            reopen: config.reopen,
        }
    }

    /// Builds the next snapshot for `group` from `resources`, makes it the
    /// group's latest and pushes it to every node currently bound to the
    /// group.
    ///
    /// A snapshot that fails to build leaves the group untouched. A failed
    /// push is reported after the broadcast policy has run its course; the
    /// group snapshot is updated regardless.
    pub fn generate_snapshot(
        &self,
        group: &str,
        resources: ResourceTable,
    ) -> Result<Version, CacheError> {
        let begin = Instant::now();
        let mut state = self.state.write();

        let version = state.versioner.next();

        let snapshot = match Snapshot::new(version, resources) {
            Ok(snapshot) => Arc::new(snapshot),
            Err(source) => {
                self.metrics.record_snapshot_create(Outcome::Failure {
                    reason: REASON_ERROR,
                });
                error!(group, err = %source, "Failed to build a new snapshot");

                return Err(CacheError::SnapshotConstruction {
                    group: group.to_owned(),
                    source,
                });
            }
        };
        self.metrics.record_snapshot_create(Outcome::Success);

        state.groups.put(group, Arc::clone(&snapshot));

        let report = self.dispatcher.broadcast(
            &snapshot,
            state.streams.node_ids(group),
            &*self.metrics,
        );

        info!(
            group,
            version = %snapshot.version(),
            assigned = report.assigned.len(),
            failed = report.failed.len(),
            groups = state.groups.len(),
            duration = ?begin.elapsed(),
            "Generated a new snapshot"
        );

        report.into_result()?;

        Ok(snapshot.version().clone())
    }

    /// The snapshot individually assigned to `node_id`.
    pub fn get_snapshot(&self, node_id: &str) -> Result<Arc<Snapshot>, StoreError> {
        self.dispatcher.store().get_snapshot(node_id)
    }

    /// The latest snapshot generated for `group`.
    pub fn group_snapshot(&self, group: &str) -> Option<Arc<Snapshot>> {
        self.state.read().groups.get(group).cloned()
    }

    /// IDs of the nodes currently bound to `group` on any stream.
    pub fn node_ids(&self, group: &str) -> Vec<String> {
        self.state.read().streams.node_ids(group).into_iter().collect()
    }

    /// The node bound to a stream. Returns `None` for unknown or closed
    /// streams and for streams that have not sent a request yet.
    pub fn lookup_node(&self, kind: StreamKind, stream_id: StreamId) -> Option<Node> {
        self.state.read().streams.lookup_node(kind, stream_id).cloned()
    }

    pub fn open_streams(&self, kind: StreamKind) -> usize {
        self.state.read().streams.len(kind)
    }

    pub const fn store(&self) -> &S {
        self.dispatcher.store()
    }

    pub(crate) fn open_stream(
        &self,
        kind: StreamKind,
        stream_id: StreamId,
        type_url: &str,
    ) -> Result<(), CacheError> {
        let mut state = self.state.write();

        if state.streams.is_open(kind, stream_id) {
            if self.reopen == ReopenPolicy::Reject {
                warn!(%stream_id, %kind, "Refusing to reopen a registered stream");
                return Err(CacheError::StreamAlreadyOpen { stream_id, kind });
            }

            warn!(%stream_id, %kind, "Stream reopened, resetting its registration");
            if kind.is_delta() {
                let _ = self.correlator.forget_stream(stream_id);
            }
        }

        state.streams.open_stream(kind, stream_id, Instant::now());
        self.metrics.set_open_streams(kind, state.streams.len(kind));

        info!(%stream_id, %kind, type_url, "xDS stream opened");

        Ok(())
    }

    pub(crate) fn close_stream(&self, kind: StreamKind, stream_id: StreamId, node: Option<&Node>) {
        let mut state = self.state.write();

        let bound_id = state
            .streams
            .lookup_node(kind, stream_id)
            .map(|bound| bound.id.clone());
        let duration = state.streams.close_stream(kind, stream_id, Instant::now());
        let node_id = node
            .map(|node| node.id.as_str())
            .or(bound_id.as_deref())
            .unwrap_or_default();

        if let Some(duration) = duration {
            self.metrics
                .record_stream_duration(stream_id, node_id, kind, duration);
        }
        self.metrics.set_open_streams(kind, state.streams.len(kind));

        // Under the lock, so a reopened stream's requests are never dropped.
        let dropped = if kind.is_delta() {
            self.correlator.forget_stream(stream_id)
        } else {
            0
        };

        drop(state);

        if dropped > 0 {
            debug!(%stream_id, dropped, "Dropped delta requests that never saw a response");
        }

        info!(%stream_id, %kind, node_id, ?duration, "xDS stream closed");
    }

    /// Binds the stream's node on its first request and makes sure the node
    /// has a snapshot of its own once its group has one.
    pub(crate) fn handle_request<R: DiscoveryMessage>(
        &self,
        kind: StreamKind,
        stream_id: StreamId,
        request: &R,
        begin: Instant,
    ) -> Result<RequestSummary, CacheError> {
        let mut state = self.state.write();

        let lock_duration = begin.elapsed();
        self.metrics
            .record_request_duration(kind, RequestPhase::Lock, lock_duration);

        if !state.streams.is_open(kind, stream_id) {
            warn!(
                %stream_id,
                %kind,
                node_id = request.node_id(),
                "Discovery request on a stream that is not registered"
            );
            if kind.is_delta() {
                let _ = self.correlator.forget_stream(stream_id);
            }

            return Ok(RequestSummary {
                node_id: request.node_id().to_owned(),
                node_version: request.node().map(Node::build_version).unwrap_or_default(),
                assignment: Assignment::StreamNotRegistered,
                error_code: 0,
                error_message: String::new(),
                lock_duration,
                finish_duration: begin.elapsed(),
            });
        }

        // Only the first request on a stream is guaranteed to carry the node.
        let node = if let Some(node) = state.streams.lookup_node(kind, stream_id) {
            node.clone()
        } else {
            let Some(node) = request.node().filter(|node| !node.id.is_empty()) else {
                return Err(CacheError::MissingNodeIdentity { stream_id, kind });
            };

            debug!(
                %stream_id,
                %kind,
                node_id = %node.id,
                group = %node.group,
                "First discovery request on stream"
            );
            let _ = state.streams.bind_node(kind, stream_id, node.clone());
            node.clone()
        };

        let assignment = self
            .dispatcher
            .ensure_assigned(&node, state.groups.get(&node.group))?;

        if assignment == Assignment::NoGroupSnapshot {
            // The protocol layer answers with empty state until a snapshot exists.
            debug!(
                %stream_id,
                node_id = %node.id,
                group = %node.group,
                "No snapshot generated for group yet"
            );
        }

        let node_version = request.node().map(Node::build_version).unwrap_or_default();

        let (error_code, error_message) = match request.error_detail() {
            Some(status) => {
                warn!(
                    %stream_id,
                    %kind,
                    node_id = %node.id,
                    type_url = request.type_url(),
                    response_nonce = request.response_nonce(),
                    error_code = status.code,
                    error_message = %status.message,
                    "Node rejected the last update"
                );
                self.metrics.record_nack(&node.id, request.type_url(), kind);

                (status.code, status.message.clone())
            }
            None => (0, String::new()),
        };

        let finish_duration = begin.elapsed();
        self.metrics
            .record_request_duration(kind, RequestPhase::Finish, finish_duration);

        Ok(RequestSummary {
            node_id: node.id,
            node_version,
            assignment,
            error_code,
            error_message,
            lock_duration,
            finish_duration,
        })
    }
}
