#[cfg(test)]
#[path = "tests/registry.rs"]
mod tests;

use core::time::Duration;
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use xds_snapshot_primitives::node::Node;
use xds_snapshot_primitives::stream::{StreamId, StreamKind};

/// Per-stream bookkeeping, kept separately for each [`StreamKind`].
///
/// A stream's node is learned from its first request and never re-read
/// afterwards. Entries are only created by [`StreamRegistry::open_stream`];
/// once closed, a stream stays gone until it is opened again.
#[derive(Debug, Default)]
pub(crate) struct StreamRegistry {
    state_of_the_world: StreamTable,
    incremental: StreamTable,
}

#[derive(Debug, Default)]
struct StreamTable {
    streams: HashMap<StreamId, StreamEntry>,
}

#[derive(Debug)]
struct StreamEntry {
    node: Option<Node>,
    opened_at: Instant,
}

impl StreamRegistry {
    const fn table(&self, kind: StreamKind) -> &StreamTable {
        match kind {
            StreamKind::StateOfTheWorld => &self.state_of_the_world,
            StreamKind::Incremental => &self.incremental,
        }
    }

    fn table_mut(&mut self, kind: StreamKind) -> &mut StreamTable {
        match kind {
            StreamKind::StateOfTheWorld => &mut self.state_of_the_world,
            StreamKind::Incremental => &mut self.incremental,
        }
    }

    pub(crate) fn is_open(&self, kind: StreamKind, stream_id: StreamId) -> bool {
        self.table(kind).streams.contains_key(&stream_id)
    }

    /// Registers the stream with no node yet. Re-opening a registered ID
    /// replaces the entry, restarting its timer.
    pub(crate) fn open_stream(&mut self, kind: StreamKind, stream_id: StreamId, at: Instant) {
        let entry = StreamEntry {
            node: None,
            opened_at: at,
        };

        drop(self.table_mut(kind).streams.insert(stream_id, entry));
    }

    /// Sets the node of a registered stream, returning whatever node was
    /// bound before. Unregistered streams are left alone.
    pub(crate) fn bind_node(
        &mut self,
        kind: StreamKind,
        stream_id: StreamId,
        node: Node,
    ) -> Option<Node> {
        self.table_mut(kind)
            .streams
            .get_mut(&stream_id)?
            .node
            .replace(node)
    }

    pub(crate) fn lookup_node(&self, kind: StreamKind, stream_id: StreamId) -> Option<&Node> {
        self.table(kind)
            .streams
            .get(&stream_id)
            .and_then(|entry| entry.node.as_ref())
    }

    /// Removes the stream and returns how long it was open, or `None` when
    /// the stream was not registered.
    pub(crate) fn close_stream(
        &mut self,
        kind: StreamKind,
        stream_id: StreamId,
        now: Instant,
    ) -> Option<Duration> {
        let entry = self.table_mut(kind).streams.remove(&stream_id)?;

        Some(now.saturating_duration_since(entry.opened_at))
    }

    /// IDs of every node bound to `group` on a stream of either kind.
    pub(crate) fn node_ids(&self, group: &str) -> BTreeSet<String> {
        [&self.state_of_the_world, &self.incremental]
            .into_iter()
            .flat_map(|table| table.streams.values())
            .filter_map(|entry| entry.node.as_ref())
            .filter(|node| node.group == group)
            .map(|node| node.id.clone())
            .collect()
    }

    pub(crate) fn len(&self, kind: StreamKind) -> usize {
        self.table(kind).streams.len()
    }
}
