use thiserror::Error;
use xds_snapshot_primitives::snapshot::SnapshotError;
use xds_snapshot_primitives::stream::{StreamId, StreamKind};

use crate::dispatch::StoreError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// The first request on a stream did not say which node sent it. The
    /// transport is expected to terminate the stream.
    #[error("couldn't get the node ID from the first {kind} discovery request on stream {stream_id}")]
    MissingNodeIdentity { stream_id: StreamId, kind: StreamKind },

    /// The group's previous snapshot is left in place.
    #[error("failed to build snapshot for group {group}: {source}")]
    SnapshotConstruction {
        group: String,
        #[source]
        source: SnapshotError,
    },

    #[error("failed to assign snapshot to node {node_id}: {source}")]
    SnapshotAssignment {
        node_id: String,
        #[source]
        source: StoreError,
    },

    #[error("{kind} stream {stream_id} is already open")]
    StreamAlreadyOpen { stream_id: StreamId, kind: StreamKind },
}
