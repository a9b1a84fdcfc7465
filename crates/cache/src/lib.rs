//! Server-side state for distributing versioned xDS snapshots to proxy
//! fleets.
//!
//! [`SnapshotCache`] keeps one snapshot per group, learns which node sits on
//! the other end of each stream, hands each node its group's latest snapshot
//! and times streams and delta request/response exchanges. The transport
//! drives it through the [`Callbacks`] hooks; the resource pipeline feeds it
//! through [`SnapshotCache::generate_snapshot`] or a [`SnapshotRunner`].

pub mod cache;
pub mod callbacks;
mod correlator;
pub mod dispatch;
pub mod errors;
mod groups;
pub mod metrics;
mod registry;
pub mod runner;
mod version;

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

pub use cache::SnapshotCache;
pub use callbacks::Callbacks;
pub use dispatch::{Assignment, MemorySnapshotStore, SnapshotStore, StoreError};
pub use errors::CacheError;
pub use metrics::{CacheMetrics, NoopCacheMetrics, PrometheusCacheMetrics};
pub use runner::{SnapshotRunner, SnapshotUpdate};
