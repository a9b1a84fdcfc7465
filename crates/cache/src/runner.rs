//! Drives snapshot generation from a queue of resource updates.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{error, info};
use xds_snapshot_primitives::snapshot::ResourceTable;

use crate::cache::SnapshotCache;
use crate::dispatch::SnapshotStore;
use crate::metrics::{Outcome, REASON_ERROR};

/// Value of the `message` label on the queue metrics.
pub const XDS_MESSAGE: &str = "xds";

/// New resources for one group, as published by the generation pipeline.
#[derive(Clone, Debug)]
pub struct SnapshotUpdate {
    pub group: String,
    pub resources: ResourceTable,
}

impl SnapshotUpdate {
    #[must_use]
    pub fn new(group: impl Into<String>, resources: ResourceTable) -> Self {
        Self {
            group: group.into(),
            resources,
        }
    }
}

#[derive(Debug)]
pub struct SnapshotRunner<S> {
    name: String,
    cache: Arc<SnapshotCache<S>>,
}

impl<S: SnapshotStore> SnapshotRunner<S> {
    pub fn new(name: impl Into<String>, cache: Arc<SnapshotCache<S>>) -> Self {
        Self {
            name: name.into(),
            cache,
        }
    }

    /// Generates a snapshot for every update received, until all senders are
    /// dropped. A failed update is logged and does not stop the runner.
    pub async fn run(self, mut updates: mpsc::Receiver<SnapshotUpdate>) {
        let metrics = Arc::clone(&self.cache.metrics);

        info!(runner = %self.name, "Snapshot runner started");

        while let Some(update) = updates.recv().await {
            metrics.set_queue_depth(&self.name, XDS_MESSAGE, updates.len());

            let begin = Instant::now();
            let outcome = match self.cache.generate_snapshot(&update.group, update.resources) {
                Ok(_) => Outcome::Success,
                Err(err) => {
                    error!(
                        runner = %self.name,
                        group = %update.group,
                        %err,
                        "Failed to generate snapshot"
                    );
                    Outcome::Failure {
                        reason: REASON_ERROR,
                    }
                }
            };

            metrics.record_subscribe(&self.name, XDS_MESSAGE, outcome, begin.elapsed());
        }

        metrics.set_queue_depth(&self.name, XDS_MESSAGE, 0);

        info!(runner = %self.name, "Snapshot runner stopped");
    }
}
