use std::collections::HashSet;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use xds_snapshot_primitives::snapshot::{type_url, Resource, ResourceTable, Snapshot};

use crate::dispatch::{MemorySnapshotStore, SnapshotStore, StoreError};

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub(crate) fn clusters(names: &[&str]) -> ResourceTable {
    let mut resources = ResourceTable::new();
    let _ = resources.insert(
        type_url::CLUSTER.to_owned(),
        names
            .iter()
            .map(|name| Resource::new(*name, name.as_bytes().to_vec()))
            .collect(),
    );
    resources
}

pub(crate) fn bogus_resources() -> ResourceTable {
    let mut resources = ResourceTable::new();
    let _ = resources.insert("type.example.com/Bogus".to_owned(), vec![]);
    resources
}

pub(crate) fn snapshot(version: &str) -> Arc<Snapshot> {
    Arc::new(Snapshot::new(version.into(), clusters(&["backend"])).unwrap())
}

/// In-memory store that refuses assignments to selected nodes.
#[derive(Debug, Default)]
pub(crate) struct RejectingStore {
    pub(crate) inner: MemorySnapshotStore,
    pub(crate) rejected: HashSet<String>,
}

impl RejectingStore {
    pub(crate) fn rejecting(node_ids: &[&str]) -> Self {
        Self {
            inner: MemorySnapshotStore::new(),
            rejected: node_ids.iter().map(|id| (*id).to_owned()).collect(),
        }
    }
}

impl SnapshotStore for RejectingStore {
    fn get_snapshot(&self, node_id: &str) -> Result<Arc<Snapshot>, StoreError> {
        self.inner.get_snapshot(node_id)
    }

    fn set_snapshot(&self, node_id: &str, snapshot: Arc<Snapshot>) -> Result<(), StoreError> {
        if self.rejected.contains(node_id) {
            return Err(StoreError::Rejected {
                node_id: node_id.to_owned(),
                reason: "slot is read-only".to_owned(),
            });
        }

        self.inner.set_snapshot(node_id, snapshot)
    }
}
