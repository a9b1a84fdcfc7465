use std::collections::HashMap;
use std::sync::Arc;

use xds_snapshot_primitives::snapshot::Snapshot;

/// Latest snapshot per group. Source of truth for what any node in a group
/// should currently see.
///
/// Groups are created by their first snapshot and never removed.
#[derive(Debug, Default)]
pub(crate) struct GroupSnapshotStore {
    snapshots: HashMap<String, Arc<Snapshot>>,
}

impl GroupSnapshotStore {
    pub(crate) fn put(&mut self, group: &str, snapshot: Arc<Snapshot>) {
        drop(self.snapshots.insert(group.to_owned(), snapshot));
    }

    pub(crate) fn get(&self, group: &str) -> Option<&Arc<Snapshot>> {
        self.snapshots.get(group)
    }

    pub(crate) fn len(&self) -> usize {
        self.snapshots.len()
    }
}
